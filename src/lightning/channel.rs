use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bitcoin::secp256k1::PublicKey;

use super::{ChannelInfo, LightningHost};

/// One sat above 21M BTC: no channel can ever reach it.
pub const UNSATISFIABLE_CAPACITY_SAT: u64 = 21_000_000 * 100_000_000 + 1;

/// Turns the swap parameters into the minimum channel capacity to accept.
pub trait CapacityPolicy: Send + Sync + fmt::Debug {
    fn expected_capacity_sat(&self, invoice_amount_msat: u64, inbound_percentage: u8) -> u64;
}

/// The invoice funds the outbound share, the remote funds `inbound_percentage`
/// of the total. Rounds up at every step.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundRatioPolicy;

impl CapacityPolicy for InboundRatioPolicy {
    fn expected_capacity_sat(&self, invoice_amount_msat: u64, inbound_percentage: u8) -> u64 {
        if inbound_percentage >= 100 {
            return UNSATISFIABLE_CAPACITY_SAT;
        }

        let outbound_share = u128::from(100 - inbound_percentage);
        let total_msat = (u128::from(invoice_amount_msat) * 100).div_ceil(outbound_share);
        let total_sat = total_msat.div_ceil(1000);

        u64::try_from(total_sat)
            .unwrap_or(UNSATISFIABLE_CAPACITY_SAT)
            .min(UNSATISFIABLE_CAPACITY_SAT)
    }
}

/// Negotiated terms an opened channel has to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTerms {
    pub remote_node: PublicKey,
    pub min_capacity_sat: u64,
    pub private: bool,
}

impl ChannelTerms {
    /// Why `channel` does not satisfy the terms, `None` if it does.
    pub fn mismatch(&self, channel: &ChannelInfo) -> Option<String> {
        if !is_peer(channel, &self.remote_node) {
            return Some(format!("peer {} is not the swap node", channel.peer_node_id));
        }
        if channel.outbound {
            return Some("channel was opened by the local node".to_string());
        }
        if channel.push_msat != 0 {
            return Some(format!("push amount not 0: {}msat", channel.push_msat));
        }
        if channel.capacity_sat < self.min_capacity_sat {
            return Some(format!(
                "minimum capacity requirement of {}sat not met: {}sat",
                self.min_capacity_sat, channel.capacity_sat
            ));
        }
        match (self.private, channel.private) {
            (true, false) => Some("channel is not private".to_string()),
            (false, true) => Some("channel is not public".to_string()),
            _ => None,
        }
    }

    pub fn is_satisfied_by(&self, channel: &ChannelInfo) -> bool {
        self.mismatch(channel).is_none()
    }
}

fn is_peer(channel: &ChannelInfo, node: &PublicKey) -> bool {
    channel
        .peer_node_id
        .trim()
        .parse::<PublicKey>()
        .is_ok_and(|peer| peer == *node)
}

/// First channel in `channels` satisfying `terms`.
pub fn find_matching<'a>(
    channels: &'a [ChannelInfo],
    terms: &ChannelTerms,
) -> Option<&'a ChannelInfo> {
    channels.iter().find(|c| terms.is_satisfied_by(c))
}

#[derive(Clone)]
pub struct ChannelVerifier {
    host: Arc<dyn LightningHost>,
}

impl ChannelVerifier {
    pub fn new(host: Arc<dyn LightningHost>) -> Self {
        Self { host }
    }

    /// `Ok(None)` while no channel satisfies the terms yet.
    pub async fn find_matching_channel(&self, terms: &ChannelTerms) -> Result<Option<ChannelInfo>> {
        let channels = self.host.list_channels().await?;

        if let Some(channel) = find_matching(&channels, terms) {
            return Ok(Some(channel.clone()));
        }

        for channel in channels.iter().filter(|c| is_peer(c, &terms.remote_node)) {
            if let Some(reason) = terms.mismatch(channel) {
                tracing::warn!(
                    channel_id = %channel.channel_id,
                    %reason,
                    "channel with swap node does not match the swap terms"
                );
            }
        }
        Ok(None)
    }

    /// Any channel the host already has with `node`.
    pub async fn existing_channel_with(&self, node: &PublicKey) -> Result<Option<ChannelInfo>> {
        let channels = self.host.list_channels().await?;
        Ok(channels.into_iter().find(|c| is_peer(c, node)))
    }
}
