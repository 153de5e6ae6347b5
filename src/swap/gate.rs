use std::sync::Arc;

use super::orchestrator::SwapOrchestrator;
use super::{Preimage, SwapRecord, SwapStatus};

/// An incoming payment attempt as reported by the host node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtlcAttempt {
    /// Lowercase hex.
    pub payment_hash: String,
    pub amount_msat: u64,
    pub incoming_channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtlcDecision {
    /// Not a swap payment, let the host node handle it.
    Continue,
    /// Settle with this preimage.
    Accept { preimage: Preimage },
    Reject { reason: String },
}

impl HtlcDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, HtlcDecision::Accept { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Reject, swap stays where it is.
    Refuse(String),
    /// Reject and fail the swap.
    Violation(String),
    /// Reject, the offer ran out.
    Expired,
    Settle,
}

/// Decides what to do with a payment attempt for `swap`'s payment hash.
///
/// Only a `ChannelObserved` swap can settle. Settling never commits
/// `HtlcAccepted` on its own; a record found there settles the same way.
pub(crate) fn evaluate(swap: &SwapRecord, attempt: &HtlcAttempt, now: u64) -> Verdict {
    match swap.status {
        SwapStatus::ChannelObserved | SwapStatus::HtlcAccepted => {}
        status if status.is_terminal() => {
            return Verdict::Refuse(format!("swap is {status}"));
        }
        _ => return Verdict::Refuse("channel not yet observed".to_string()),
    }

    if swap.status == SwapStatus::ChannelObserved && now >= swap.expires_at {
        return Verdict::Expired;
    }

    if attempt.amount_msat != swap.invoice_amount_msat {
        return Verdict::Violation(format!(
            "amount mismatch: expected {}msat, got {}msat",
            swap.invoice_amount_msat, attempt.amount_msat
        ));
    }

    if let (Some(incoming), Some(observed)) = (&attempt.incoming_channel_id, &swap.channel_id)
        && incoming != observed
    {
        return Verdict::Violation(format!(
            "payment arrived over channel {incoming} instead of {observed}"
        ));
    }

    Verdict::Settle
}

/// Inbound payment interceptor. Never errors: internal faults reject.
#[derive(Clone)]
pub struct HtlcGate {
    orchestrator: Arc<SwapOrchestrator>,
}

impl HtlcGate {
    pub fn new(orchestrator: Arc<SwapOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn intercept(&self, attempt: &HtlcAttempt) -> HtlcDecision {
        match self.orchestrator.resolve_htlc(attempt) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(
                    payment_hash = %attempt.payment_hash,
                    error = %format!("{err:#}"),
                    "htlc decision failed, rejecting"
                );
                HtlcDecision::Reject {
                    reason: "internal error".to_string(),
                }
            }
        }
    }
}
