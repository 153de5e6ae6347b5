pub mod channel;
pub mod host;
pub mod invoice;

use anyhow::Result;
use bitcoin::hashes::sha256;

/// A channel as reported by the host node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub short_channel_id: Option<String>,
    pub peer_node_id: String,
    pub capacity_sat: u64,
    pub private: bool,
    /// Opened by the local node.
    pub outbound: bool,
    pub push_msat: u64,
}

/// What the swap needs from the host Lightning node.
#[tonic::async_trait]
pub trait LightningHost: Send + Sync {
    /// Mints a BOLT11 invoice for a payment hash whose preimage the host does not know.
    async fn create_invoice(
        &self,
        amount_msat: u64,
        payment_hash: &sha256::Hash,
        description: &str,
        label: &str,
    ) -> Result<String>;

    /// Channels currently known to the host node, from its local state.
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;
}
