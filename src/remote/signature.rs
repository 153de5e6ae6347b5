use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, VerifyOnly};

/// Checks that a reply was produced by the configured swap service.
pub trait SignatureVerifier: Send + Sync {
    /// `false` for any mismatched or malformed signature. Never panics.
    fn verify(&self, payload: &[u8], signature: &str) -> bool;
}

/// secp256k1 ECDSA over `sha256(payload)`, signature as hex (compact or DER).
/// Both low-S and high-S forms verify.
#[derive(Debug, Clone)]
pub struct EcdsaSignatureVerifier {
    secp: Secp256k1<VerifyOnly>,
    pubkey: PublicKey,
}

impl EcdsaSignatureVerifier {
    pub fn new(pubkey: PublicKey) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            pubkey,
        }
    }

    pub fn from_hex(pubkey_hex: &str) -> Result<Self> {
        let pubkey: PublicKey = pubkey_hex
            .trim()
            .parse()
            .context("parse swap service public key")?;
        Ok(Self::new(pubkey))
    }

    pub fn pubkey(&self) -> &PublicKey {
        &self.pubkey
    }
}

impl SignatureVerifier for EcdsaSignatureVerifier {
    fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(bytes) = hex::decode(signature.trim()) else {
            return false;
        };
        let sig = match bytes.len() {
            64 => Signature::from_compact(&bytes),
            _ => Signature::from_der(&bytes),
        };
        let Ok(mut sig) = sig else {
            return false;
        };
        // signers that do not normalize produce high-S half the time
        sig.normalize_s();

        let digest = sha256::Hash::hash(payload).to_byte_array();
        let msg = Message::from_digest(digest);
        self.secp.verify_ecdsa(&msg, &sig, &self.pubkey).is_ok()
    }
}
