use anyhow::Result;
use bitcoin::hashes::sha256;
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use lightning_invoice::{Currency, InvoiceBuilder, PaymentSecret};

/// Signs a regtest BOLT11 invoice for `payment_hash` with a fixed node key.
pub fn build_invoice(amount_msat: u64, payment_hash: sha256::Hash, description: &str) -> Result<String> {
    let secp = Secp256k1::new();
    let node_key = SecretKey::from_slice(&[0x42; 32])?;

    let invoice = InvoiceBuilder::new(Currency::Regtest)
        .description(description.to_string())
        .payment_hash(payment_hash)
        .payment_secret(PaymentSecret([0x07; 32]))
        .current_timestamp()
        .min_final_cltv_expiry_delta(144)
        .amount_milli_satoshis(amount_msat)
        .build_signed(|hash| secp.sign_ecdsa_recoverable(hash, &node_key))
        .map_err(|e| anyhow::anyhow!("build invoice: {e:?}"))?;

    Ok(invoice.to_string())
}
