use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use bitcoin::hashes::{Hash as _, sha256};
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use channel_creation_swap::lightning::{ChannelInfo, LightningHost};
use channel_creation_swap::remote::client::{RawReply, RemoteTransport};
use channel_creation_swap::remote::signature::EcdsaSignatureVerifier;
use serde_json::json;

use super::invoice::build_invoice;

pub const SWAP_SERVICE_KEY: [u8; 32] = [0x11; 32];
pub const SWAP_NODE_KEY: [u8; 32] = [0x22; 32];
pub const OTHER_NODE_KEY: [u8; 32] = [0x33; 32];

pub fn pubkey_of(secret: [u8; 32]) -> PublicKey {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&secret).expect("valid secret key");
    PublicKey::from_secret_key(&secp, &sk)
}

/// Signs `payload` the way the swap service does, hex compact.
pub fn sign_payload(secret: [u8; 32], payload: &[u8]) -> String {
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&secret).expect("valid secret key");
    let msg = Message::from_digest(sha256::Hash::hash(payload).to_byte_array());
    hex::encode(secp.sign_ecdsa(&msg, &sk).serialize_compact())
}

/// In-memory host node.
#[derive(Default)]
pub struct FakeHost {
    channels: Mutex<Vec<ChannelInfo>>,
    fail_invoices: AtomicBool,
    wrong_invoice_amount: AtomicBool,
    invoices_issued: AtomicUsize,
}

impl FakeHost {
    pub fn set_channels(&self, channels: Vec<ChannelInfo>) {
        *self.channels.lock().expect("channels mutex poisoned") = channels;
    }

    pub fn set_fail_invoices(&self, fail: bool) {
        self.fail_invoices.store(fail, Ordering::SeqCst);
    }

    pub fn set_wrong_invoice_amount(&self, wrong: bool) {
        self.wrong_invoice_amount.store(wrong, Ordering::SeqCst);
    }

    pub fn invoices_issued(&self) -> usize {
        self.invoices_issued.load(Ordering::SeqCst)
    }
}

#[tonic::async_trait]
impl LightningHost for FakeHost {
    async fn create_invoice(
        &self,
        amount_msat: u64,
        payment_hash: &sha256::Hash,
        description: &str,
        _label: &str,
    ) -> Result<String> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            anyhow::bail!("host node refused to create invoice");
        }
        let amount_msat = if self.wrong_invoice_amount.load(Ordering::SeqCst) {
            amount_msat + 1
        } else {
            amount_msat
        };
        self.invoices_issued.fetch_add(1, Ordering::SeqCst);
        build_invoice(amount_msat, *payment_hash, description)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        Ok(self.channels.lock().expect("channels mutex poisoned").clone())
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    next_id: usize,
    swaps: HashMap<String, String>,
    registrations: Vec<serde_json::Value>,
    status: Option<String>,
    reject_registration: Option<String>,
    corrupt_signatures: bool,
    unreachable: bool,
    echo_wrong_hash: bool,
    requests: usize,
}

/// Swap service speaking the signed envelope format, without HTTP.
pub struct FakeSwapService {
    secp: Secp256k1<All>,
    key: SecretKey,
    state: Mutex<ServiceState>,
}

impl Default for FakeSwapService {
    fn default() -> Self {
        Self {
            secp: Secp256k1::new(),
            key: SecretKey::from_slice(&SWAP_SERVICE_KEY).expect("valid secret key"),
            state: Mutex::new(ServiceState::default()),
        }
    }
}

impl FakeSwapService {
    pub fn verifier(&self) -> EcdsaSignatureVerifier {
        EcdsaSignatureVerifier::new(PublicKey::from_secret_key(&self.secp, &self.key))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ServiceState> {
        self.state.lock().expect("service mutex poisoned")
    }

    /// Status reported for every swap from now on.
    pub fn set_status(&self, status: &str) {
        self.state().status = Some(status.to_string());
    }

    pub fn set_reject_registration(&self, reason: Option<&str>) {
        self.state().reject_registration = reason.map(str::to_string);
    }

    pub fn set_corrupt_signatures(&self, corrupt: bool) {
        self.state().corrupt_signatures = corrupt;
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    pub fn set_echo_wrong_hash(&self, wrong: bool) {
        self.state().echo_wrong_hash = wrong;
    }

    pub fn requests(&self) -> usize {
        self.state().requests
    }

    pub fn registrations(&self) -> Vec<serde_json::Value> {
        self.state().registrations.clone()
    }

    fn signed(&self, state: &ServiceState, status: u16, data: serde_json::Value) -> RawReply {
        let data = data.to_string();
        let signed_bytes = if state.corrupt_signatures {
            format!("{data} ").into_bytes()
        } else {
            data.clone().into_bytes()
        };
        let msg = Message::from_digest(sha256::Hash::hash(&signed_bytes).to_byte_array());
        let signature = hex::encode(self.secp.sign_ecdsa(&msg, &self.key).serialize_compact());

        RawReply {
            status,
            body: format!(r#"{{"data":{data},"signature":"{signature}"}}"#).into_bytes(),
        }
    }
}

#[tonic::async_trait]
impl RemoteTransport for FakeSwapService {
    async fn get(&self, path: &str) -> Result<RawReply> {
        let mut state = self.state();
        state.requests += 1;
        if state.unreachable {
            anyhow::bail!("connection refused");
        }

        if path == "v1/nodes" {
            let node = pubkey_of(SWAP_NODE_KEY);
            return Ok(self.signed(&state, 200, json!({ "node_pubkey": node.to_string() })));
        }

        let Some(id) = path.strip_prefix("v1/swaps/") else {
            return Ok(self.signed(&state, 404, json!({ "error": "not found" })));
        };
        let Some(status) = state.swaps.get(id).cloned() else {
            return Ok(self.signed(&state, 404, json!({ "error": "swap not found" })));
        };
        let status = state.status.clone().unwrap_or(status);
        Ok(self.signed(&state, 200, json!({ "id": id, "status": status })))
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawReply> {
        let mut state = self.state();
        state.requests += 1;
        if state.unreachable {
            anyhow::bail!("connection refused");
        }
        anyhow::ensure!(path == "v1/swaps", "unexpected path {path}");

        if let Some(reason) = state.reject_registration.clone() {
            return Ok(self.signed(&state, 400, json!({ "error": reason })));
        }

        state.next_id += 1;
        let id = format!("swap-{}", state.next_id);
        state.swaps.insert(id.clone(), "swap.created".to_string());
        state.registrations.push(body.clone());

        let payment_hash = if state.echo_wrong_hash {
            "00".repeat(32)
        } else {
            body["payment_hash"].as_str().unwrap_or_default().to_string()
        };
        Ok(self.signed(
            &state,
            201,
            json!({ "id": id, "payment_hash": payment_hash }),
        ))
    }
}
