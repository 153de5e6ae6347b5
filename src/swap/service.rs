use std::sync::Arc;

use tonic::{Request, Response, Status};

use crate::proto::v1 as pb;
use crate::proto::v1::intercept_htlc_response::Action;
use crate::swap::error::SwapError;
use crate::swap::gate::{HtlcAttempt, HtlcDecision, HtlcGate};
use crate::swap::orchestrator::{AddChannelCreation, SwapOrchestrator};
use crate::swap::{SwapStatus, SwapView};

#[derive(Clone)]
pub struct ChannelCreationServiceImpl {
    orchestrator: Arc<SwapOrchestrator>,
    gate: HtlcGate,
}

impl ChannelCreationServiceImpl {
    pub fn new(orchestrator: Arc<SwapOrchestrator>) -> Self {
        Self {
            gate: HtlcGate::new(orchestrator.clone()),
            orchestrator,
        }
    }
}

fn status_to_proto(status: SwapStatus) -> pb::SwapStatus {
    match status {
        SwapStatus::Created => pb::SwapStatus::Created,
        SwapStatus::InvoiceIssued => pb::SwapStatus::InvoiceIssued,
        SwapStatus::RegisteredRemotely => pb::SwapStatus::RegisteredRemotely,
        SwapStatus::AwaitingChannel => pb::SwapStatus::AwaitingChannel,
        SwapStatus::ChannelObserved => pb::SwapStatus::ChannelObserved,
        SwapStatus::HtlcAccepted => pb::SwapStatus::HtlcAccepted,
        SwapStatus::Completed => pb::SwapStatus::Completed,
        SwapStatus::Failed => pb::SwapStatus::Failed,
        SwapStatus::Expired => pb::SwapStatus::Expired,
    }
}

pub fn view_to_proto(view: SwapView) -> pb::ChannelCreation {
    pb::ChannelCreation {
        swap_id: view.swap_id,
        status: status_to_proto(view.status) as i32,
        status_description: view.status_description,
        invoice_amount_msat: view.invoice_amount_msat,
        inbound_percentage: u32::from(view.inbound_percentage),
        private: view.private,
        payment_hash: view.payment_hash,
        invoice: view.invoice,
        expected_channel_capacity_sat: view.expected_capacity_sat,
        remote_node_pubkey: view.remote_node_pubkey,
        channel_id: view.channel_id,
        failure_reason: view.failure_reason,
        created_at: view.created_at,
        updated_at: view.updated_at,
        expires_at: view.expires_at,
    }
}

fn error_to_status(err: SwapError) -> Status {
    let message = format!("{}: {err:#}", err.kind());
    match err {
        SwapError::InvalidAmount(_) | SwapError::InvalidInboundPercentage(_) => {
            Status::invalid_argument(message)
        }
        SwapError::Conflict { .. } | SwapError::ExistingChannel { .. } => {
            Status::already_exists(message)
        }
        SwapError::Registration(_) => Status::failed_precondition(message),
        SwapError::UntrustedResponse(_) | SwapError::RemoteUnavailable { .. } => {
            Status::unavailable(message)
        }
        SwapError::NoActiveSwap => Status::not_found(message),
        SwapError::Invoice(_) | SwapError::Internal(_) => Status::internal(message),
    }
}

#[tonic::async_trait]
impl pb::channel_creation_service_server::ChannelCreationService for ChannelCreationServiceImpl {
    async fn add_channel_creation(
        &self,
        request: Request<pb::AddChannelCreationRequest>,
    ) -> Result<Response<pb::ChannelCreation>, Status> {
        let req = request.into_inner();

        let view = self
            .orchestrator
            .create(AddChannelCreation {
                invoice_amount_msat: req.invoice_amount_msat,
                inbound_percentage: req.inbound_percentage,
                private: req.private,
            })
            .await
            .map_err(|e| {
                tracing::warn!(kind = e.kind(), error = %e, "could not add channel creation");
                error_to_status(e)
            })?;

        Ok(Response::new(view_to_proto(view)))
    }

    async fn get_channel_creation(
        &self,
        _request: Request<pb::GetChannelCreationRequest>,
    ) -> Result<Response<pb::ChannelCreation>, Status> {
        let view = self.orchestrator.query().map_err(error_to_status)?;
        Ok(Response::new(view_to_proto(view)))
    }

    async fn intercept_htlc(
        &self,
        request: Request<pb::InterceptHtlcRequest>,
    ) -> Result<Response<pb::InterceptHtlcResponse>, Status> {
        let req = request.into_inner();

        let attempt = HtlcAttempt {
            payment_hash: hex::encode(&req.payment_hash),
            amount_msat: req.amount_msat,
            incoming_channel_id: req.incoming_channel_id,
        };

        let resp = match self.gate.intercept(&attempt) {
            HtlcDecision::Continue => pb::InterceptHtlcResponse {
                action: Action::Continue as i32,
                payment_preimage: Vec::new(),
                reason: String::new(),
            },
            HtlcDecision::Accept { preimage } => pb::InterceptHtlcResponse {
                action: Action::Accept as i32,
                payment_preimage: preimage.as_bytes().to_vec(),
                reason: String::new(),
            },
            HtlcDecision::Reject { reason } => pb::InterceptHtlcResponse {
                action: Action::Reject as i32,
                payment_preimage: Vec::new(),
                reason,
            },
        };

        Ok(Response::new(resp))
    }
}
