use anyhow::{Context as _, Result};
use bitcoin::hashes::{Hash as _, sha256};
use tonic::transport::{Channel, Endpoint};

use super::{ChannelInfo, LightningHost};
use crate::proto::v1 as pb;
use crate::proto::v1::host_node_client::HostNodeClient;

/// Host node reached through the `HostNode` gRPC service.
#[derive(Clone)]
pub struct GrpcLightningHost {
    client: HostNodeClient<Channel>,
}

impl GrpcLightningHost {
    pub fn new(url: String) -> Result<Self> {
        let endpoint =
            Endpoint::from_shared(url.clone()).with_context(|| format!("parse host url {url}"))?;
        Ok(Self {
            client: HostNodeClient::new(endpoint.connect_lazy()),
        })
    }
}

#[tonic::async_trait]
impl LightningHost for GrpcLightningHost {
    async fn create_invoice(
        &self,
        amount_msat: u64,
        payment_hash: &sha256::Hash,
        description: &str,
        label: &str,
    ) -> Result<String> {
        let resp = self
            .client
            .clone()
            .create_invoice(pb::CreateInvoiceRequest {
                amount_msat,
                payment_hash: payment_hash.to_byte_array().to_vec(),
                description: description.to_string(),
                label: label.to_string(),
            })
            .await
            .context("CreateInvoice")?
            .into_inner();

        Ok(resp.invoice)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        let channels = self
            .client
            .clone()
            .list_channels(pb::ListChannelsRequest {})
            .await
            .context("ListChannels")?
            .into_inner()
            .channels;

        Ok(channels
            .into_iter()
            .map(|c| ChannelInfo {
                channel_id: c.channel_id,
                short_channel_id: c.short_channel_id,
                peer_node_id: c.peer_node_id,
                capacity_sat: c.capacity_sat,
                private: c.private,
                outbound: c.outbound,
                push_msat: c.push_msat,
            })
            .collect())
    }
}
