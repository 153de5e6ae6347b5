use std::str::FromStr as _;
use std::sync::Arc;

use anyhow::Result;
use bitcoin::hashes::{Hash as _, sha256};
use lightning_invoice::Bolt11Invoice;

use super::LightningHost;

pub const INVOICE_DESCRIPTION: &str = "Channel Creation Swap";

pub fn payment_hash_from_bolt11(invoice: &str) -> Result<[u8; 32]> {
    let invoice = Bolt11Invoice::from_str(invoice)
        .map_err(|e| anyhow::anyhow!("parse BOLT11 invoice: {e:?}"))?;
    Ok(invoice.payment_hash().to_byte_array())
}

pub fn amount_msat_from_bolt11(invoice: &str) -> Result<Option<u64>> {
    let invoice = Bolt11Invoice::from_str(invoice)
        .map_err(|e| anyhow::anyhow!("parse BOLT11 invoice: {e:?}"))?;
    Ok(invoice.amount_milli_satoshis())
}

/// Asks the host node for an invoice and checks that it commits to what was asked.
#[derive(Clone)]
pub struct InvoiceIssuer {
    host: Arc<dyn LightningHost>,
}

impl InvoiceIssuer {
    pub fn new(host: Arc<dyn LightningHost>) -> Self {
        Self { host }
    }

    pub async fn issue(
        &self,
        amount_msat: u64,
        payment_hash: &sha256::Hash,
        label: &str,
    ) -> Result<String> {
        let invoice = self
            .host
            .create_invoice(amount_msat, payment_hash, INVOICE_DESCRIPTION, label)
            .await?;

        let invoice_hash = payment_hash_from_bolt11(&invoice)?;
        anyhow::ensure!(
            invoice_hash == payment_hash.to_byte_array(),
            "invoice payment hash {} does not match {}",
            hex::encode(invoice_hash),
            payment_hash
        );

        let invoice_amount = amount_msat_from_bolt11(&invoice)?;
        anyhow::ensure!(
            invoice_amount == Some(amount_msat),
            "invoice amount {invoice_amount:?} does not match {amount_msat} msat"
        );

        Ok(invoice)
    }
}
