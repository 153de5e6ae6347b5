pub mod client;
pub mod signature;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The service answered (with a verified reply) and refused the request.
    #[error("rejected by swap service: {0}")]
    Rejected(String),

    /// Every attempt produced a reply that could not be verified.
    #[error("untrusted response: {0}")]
    Untrusted(String),

    #[error("swap service unavailable after {attempts} attempts: {reason}")]
    Unavailable { attempts: u32, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterSwapRequest {
    pub payment_hash: String,
    pub invoice: String,
    pub invoice_amount_msat: u64,
    pub inbound_percentage: u8,
    pub private: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredSwap {
    pub id: String,
    pub payment_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum RemoteSwapStatus {
    #[serde(rename = "swap.created")]
    Created,
    #[serde(rename = "invoice.set")]
    InvoiceSet,
    #[serde(rename = "channel.created")]
    ChannelCreated,
    #[serde(rename = "invoice.pending")]
    InvoicePending,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.failedToPay")]
    InvoiceFailedToPay,
    #[serde(rename = "channel.failed")]
    ChannelFailed,
    #[serde(rename = "swap.expired")]
    Expired,
    #[serde(other)]
    Unknown,
}

impl RemoteSwapStatus {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            RemoteSwapStatus::InvoiceFailedToPay | RemoteSwapStatus::ChannelFailed
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SwapStatusReply {
    pub id: String,
    pub status: RemoteSwapStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NodesReply {
    pub node_pubkey: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorReply {
    pub error: String,
}
