#![allow(dead_code)]

pub mod fakes;
pub mod invoice;
pub mod port;
pub mod wait;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use channel_creation_swap::lightning::ChannelInfo;
use channel_creation_swap::lightning::channel::InboundRatioPolicy;
use channel_creation_swap::remote::client::{RemoteSwapClient, RetryPolicy};
use channel_creation_swap::swap::SwapView;
use channel_creation_swap::swap::gate::{HtlcAttempt, HtlcGate};
use channel_creation_swap::swap::orchestrator::{OrchestratorConfig, SwapOrchestrator};
use channel_creation_swap::swap::store::SqliteSwapStore;
use tempfile::TempDir;

use fakes::{FakeHost, FakeSwapService, OTHER_NODE_KEY, SWAP_NODE_KEY, pubkey_of};

pub const RETRY_ATTEMPTS: u32 = 3;

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: RETRY_ATTEMPTS,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(4),
    }
}

/// Orchestrator wired to fakes over a temporary sqlite store.
pub struct Harness {
    pub dir: TempDir,
    pub host: Arc<FakeHost>,
    pub service: Arc<FakeSwapService>,
    pub orchestrator: Arc<SwapOrchestrator>,
    pub gate: HtlcGate,
    swap_expiry: Duration,
}

impl Harness {
    pub fn new() -> Result<Self> {
        Self::with_expiry(Duration::from_secs(3600))
    }

    pub fn with_expiry(swap_expiry: Duration) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let host = Arc::new(FakeHost::default());
        let service = Arc::new(FakeSwapService::default());
        let (orchestrator, gate) = build(&dir, &host, &service, swap_expiry)?;
        Ok(Self {
            dir,
            host,
            service,
            orchestrator,
            gate,
            swap_expiry,
        })
    }

    pub fn store_path(&self) -> PathBuf {
        self.dir.path().join("channel_creation.sqlite3")
    }

    /// A fresh orchestrator and gate over the same store file, as after a restart.
    pub fn restart(&mut self) -> Result<()> {
        let (orchestrator, gate) = build(&self.dir, &self.host, &self.service, self.swap_expiry)?;
        self.orchestrator = orchestrator;
        self.gate = gate;
        Ok(())
    }

    pub fn open_store(&self) -> Result<SqliteSwapStore> {
        SqliteSwapStore::open(self.store_path())
    }
}

fn build(
    dir: &TempDir,
    host: &Arc<FakeHost>,
    service: &Arc<FakeSwapService>,
    swap_expiry: Duration,
) -> Result<(Arc<SwapOrchestrator>, HtlcGate)> {
    let store = SqliteSwapStore::open(dir.path().join("channel_creation.sqlite3"))
        .context("open sqlite store")?;
    let remote = RemoteSwapClient::new(
        service.clone(),
        Arc::new(service.verifier()),
        fast_retry(),
    );
    let orchestrator = Arc::new(SwapOrchestrator::new(
        OrchestratorConfig {
            remote_node_pubkey: pubkey_of(SWAP_NODE_KEY),
            swap_expiry,
        },
        Arc::new(Mutex::new(store)),
        host.clone(),
        remote,
        Arc::new(InboundRatioPolicy),
    ));
    let gate = HtlcGate::new(orchestrator.clone());
    Ok((orchestrator, gate))
}

/// Channel opened by the swap node towards us.
pub fn swap_channel(capacity_sat: u64, private: bool) -> ChannelInfo {
    ChannelInfo {
        channel_id: format!("chan-{capacity_sat}"),
        short_channel_id: Some("101x1x0".to_string()),
        peer_node_id: pubkey_of(SWAP_NODE_KEY).to_string(),
        capacity_sat,
        private,
        outbound: false,
        push_msat: 0,
    }
}

pub fn other_channel(capacity_sat: u64) -> ChannelInfo {
    ChannelInfo {
        channel_id: "chan-other".to_string(),
        short_channel_id: Some("102x1x0".to_string()),
        peer_node_id: pubkey_of(OTHER_NODE_KEY).to_string(),
        capacity_sat,
        private: false,
        outbound: false,
        push_msat: 0,
    }
}

pub fn payment_for(view: &SwapView, amount_msat: u64) -> HtlcAttempt {
    HtlcAttempt {
        payment_hash: view.payment_hash.clone(),
        amount_msat,
        incoming_channel_id: None,
    }
}
