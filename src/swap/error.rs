use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("invoice amount must be > 0 and at most {max_msat} msat, got {0}", max_msat = crate::swap::MAX_INVOICE_AMOUNT_MSAT)]
    InvalidAmount(u64),

    #[error("inbound percentage must be between 0 and 100, got {0}")]
    InvalidInboundPercentage(u32),

    #[error("there is a pending channel creation already: {swap_id}")]
    Conflict { swap_id: String },

    #[error("there is a channel with the remote node already: {channel_id}")]
    ExistingChannel { channel_id: String },

    #[error("could not issue invoice: {0}")]
    Invoice(String),

    #[error("swap service rejected the swap: {0}")]
    Registration(String),

    #[error("untrusted response from swap service: {0}")]
    UntrustedResponse(String),

    #[error("swap service unavailable after {attempts} attempts: {reason}")]
    RemoteUnavailable { attempts: u32, reason: String },

    #[error("no channel creation was added")]
    NoActiveSwap,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SwapError {
    /// Stable machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            SwapError::InvalidAmount(_) | SwapError::InvalidInboundPercentage(_) => "validation",
            SwapError::Conflict { .. } => "conflict",
            SwapError::ExistingChannel { .. } => "existing_channel",
            SwapError::Invoice(_) => "invoice",
            SwapError::Registration(_) => "registration",
            SwapError::UntrustedResponse(_) => "untrusted_response",
            SwapError::RemoteUnavailable { .. } => "remote_unavailable",
            SwapError::NoActiveSwap => "no_active_swap",
            SwapError::Internal(_) => "internal",
        }
    }
}

impl From<RemoteError> for SwapError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Rejected(reason) => SwapError::Registration(reason),
            RemoteError::Untrusted(reason) => SwapError::UntrustedResponse(reason),
            RemoteError::Unavailable { attempts, reason } => {
                SwapError::RemoteUnavailable { attempts, reason }
            }
        }
    }
}
