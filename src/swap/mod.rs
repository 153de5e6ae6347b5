pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod service;
pub mod store;

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, sha256};
use rand::RngCore as _;
use serde::{Deserialize, Serialize};

/// 21M BTC in msat.
pub const MAX_INVOICE_AMOUNT_MSAT: u64 = 21_000_000 * 100_000_000 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Created,
    InvoiceIssued,
    RegisteredRemotely,
    AwaitingChannel,
    ChannelObserved,
    HtlcAccepted,
    Completed,
    Failed,
    Expired,
}

impl SwapStatus {
    pub const ACTIVE: [SwapStatus; 6] = [
        SwapStatus::Created,
        SwapStatus::InvoiceIssued,
        SwapStatus::RegisteredRemotely,
        SwapStatus::AwaitingChannel,
        SwapStatus::ChannelObserved,
        SwapStatus::HtlcAccepted,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SwapStatus::Completed | SwapStatus::Failed | SwapStatus::Expired
        )
    }

    /// Next state on the happy path, `None` once terminal.
    pub fn successor(self) -> Option<SwapStatus> {
        match self {
            SwapStatus::Created => Some(SwapStatus::InvoiceIssued),
            SwapStatus::InvoiceIssued => Some(SwapStatus::RegisteredRemotely),
            SwapStatus::RegisteredRemotely => Some(SwapStatus::AwaitingChannel),
            SwapStatus::AwaitingChannel => Some(SwapStatus::ChannelObserved),
            SwapStatus::ChannelObserved => Some(SwapStatus::HtlcAccepted),
            SwapStatus::HtlcAccepted => Some(SwapStatus::Completed),
            SwapStatus::Completed | SwapStatus::Failed | SwapStatus::Expired => None,
        }
    }

    pub fn can_transition_to(self, next: SwapStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SwapStatus::Failed => true,
            SwapStatus::Expired => matches!(
                self,
                SwapStatus::AwaitingChannel | SwapStatus::ChannelObserved
            ),
            next => self.successor() == Some(next),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Created => "created",
            SwapStatus::InvoiceIssued => "invoice_issued",
            SwapStatus::RegisteredRemotely => "registered_remotely",
            SwapStatus::AwaitingChannel => "awaiting_channel",
            SwapStatus::ChannelObserved => "channel_observed",
            SwapStatus::HtlcAccepted => "htlc_accepted",
            SwapStatus::Completed => "completed",
            SwapStatus::Failed => "failed",
            SwapStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<SwapStatus> {
        match s {
            "created" => Some(SwapStatus::Created),
            "invoice_issued" => Some(SwapStatus::InvoiceIssued),
            "registered_remotely" => Some(SwapStatus::RegisteredRemotely),
            "awaiting_channel" => Some(SwapStatus::AwaitingChannel),
            "channel_observed" => Some(SwapStatus::ChannelObserved),
            "htlc_accepted" => Some(SwapStatus::HtlcAccepted),
            "completed" => Some(SwapStatus::Completed),
            "failed" => Some(SwapStatus::Failed),
            "expired" => Some(SwapStatus::Expired),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SwapStatus::Created => "swap is being created",
            SwapStatus::InvoiceIssued => "invoice issued, registering with the swap service",
            SwapStatus::RegisteredRemotely => "registered, waiting for the swap service to pick it up",
            SwapStatus::AwaitingChannel => "waiting for the swap service to open the channel",
            SwapStatus::ChannelObserved => "channel verified, waiting for the invoice payment",
            SwapStatus::HtlcAccepted => "invoice payment accepted, settling",
            SwapStatus::Completed => "channel opened and invoice paid",
            SwapStatus::Failed => "swap failed",
            SwapStatus::Expired => "swap expired before the channel was delivered",
        }
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment secret of a swap. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Preimage([u8; 32]);

impl Preimage {
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).context("decode preimage hex")?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("preimage must be 32 bytes"))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn payment_hash(&self) -> sha256::Hash {
        sha256::Hash::hash(&self.0)
    }
}

impl fmt::Debug for Preimage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Preimage(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRecord {
    pub swap_id: String,

    pub invoice_amount_msat: u64,
    pub inbound_percentage: u8,
    pub private: bool,

    pub payment_hash: String,
    pub preimage: Preimage,
    pub invoice: String,
    pub invoice_label: String,

    pub expected_capacity_sat: u64,
    pub remote_node_pubkey: String,

    pub channel_id: Option<String>,
    pub failure_reason: Option<String>,

    pub status: SwapStatus,
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
}

impl SwapRecord {
    pub fn view(&self) -> SwapView {
        SwapView {
            swap_id: self.swap_id.clone(),
            status: self.status,
            status_description: self.status.description().to_string(),
            invoice_amount_msat: self.invoice_amount_msat,
            inbound_percentage: self.inbound_percentage,
            private: self.private,
            payment_hash: self.payment_hash.clone(),
            invoice: self.invoice.clone(),
            expected_capacity_sat: self.expected_capacity_sat,
            remote_node_pubkey: self.remote_node_pubkey.clone(),
            channel_id: self.channel_id.clone(),
            failure_reason: self.failure_reason.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            expires_at: self.expires_at,
        }
    }
}

/// Public fields of a swap, safe to hand to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapView {
    pub swap_id: String,
    pub status: SwapStatus,
    pub status_description: String,

    pub invoice_amount_msat: u64,
    pub inbound_percentage: u8,
    pub private: bool,

    pub payment_hash: String,
    pub invoice: String,
    pub expected_capacity_sat: u64,
    pub remote_node_pubkey: String,

    pub channel_id: Option<String>,
    pub failure_reason: Option<String>,

    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
