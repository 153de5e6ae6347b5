use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, Result};
use bitcoin::secp256k1::PublicKey;
use channel_creation_swap::lightning::channel::InboundRatioPolicy;
use channel_creation_swap::lightning::host::GrpcLightningHost;
use channel_creation_swap::proto::v1::channel_creation_service_server::ChannelCreationServiceServer;
use channel_creation_swap::remote::client::{HttpTransport, RemoteSwapClient, RetryPolicy};
use channel_creation_swap::remote::signature::EcdsaSignatureVerifier;
use channel_creation_swap::swap::orchestrator::{OrchestratorConfig, SwapOrchestrator};
use channel_creation_swap::swap::service::ChannelCreationServiceImpl;
use channel_creation_swap::swap::store::SqliteSwapStore;
use clap::Parser as _;
use tokio::time::MissedTickBehavior;
use tonic::transport::Server;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:50061")]
    listen_addr: String,

    /// gRPC endpoint of the host node's `HostNode` service.
    #[arg(long)]
    host_node_url: String,

    /// Base URL of the swap service API.
    #[arg(long)]
    swap_api_url: String,

    /// Key the swap service signs its replies with (hex, compressed).
    #[arg(long)]
    swap_service_pubkey: String,

    /// Lightning node the swap service opens channels from. Fetched from the
    /// swap service when omitted.
    #[arg(long)]
    swap_node_pubkey: Option<String>,

    #[arg(long)]
    store_path: PathBuf,

    #[arg(long, default_value_t = 86_400)]
    swap_expiry_secs: u64,

    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    poll_interval_secs: u64,

    #[arg(long, default_value_t = 5)]
    remote_max_attempts: u32,

    #[arg(long, default_value_t = 500)]
    remote_initial_backoff_ms: u64,

    #[arg(long, default_value_t = 8_000)]
    remote_max_backoff_ms: u64,

    #[arg(long, default_value_t = 30)]
    remote_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    channel_creation_swap::logging::init().ok();

    let args = Args::parse();
    let listen_addr: SocketAddr = args.listen_addr.parse().context("parse listen_addr")?;

    let verifier = EcdsaSignatureVerifier::from_hex(&args.swap_service_pubkey)
        .context("parse swap_service_pubkey")?;
    let transport = HttpTransport::new(
        &args.swap_api_url,
        Duration::from_secs(args.remote_timeout_secs),
    )
    .context("create swap api transport")?;
    let remote = RemoteSwapClient::new(
        Arc::new(transport),
        Arc::new(verifier),
        RetryPolicy {
            max_attempts: args.remote_max_attempts,
            initial_backoff: Duration::from_millis(args.remote_initial_backoff_ms),
            max_backoff: Duration::from_millis(args.remote_max_backoff_ms),
        },
    );

    let remote_node_pubkey: PublicKey = match &args.swap_node_pubkey {
        Some(pubkey) => pubkey.parse().context("parse swap_node_pubkey")?,
        None => {
            let pubkey = remote
                .node_pubkey()
                .await
                .context("fetch swap node public key")?;
            tracing::info!(swap_node_pubkey = %pubkey, "fetched swap node public key");
            pubkey
        }
    };

    let store = SqliteSwapStore::open(args.store_path).context("open sqlite store")?;
    tracing::info!(store_path = %store.path().display(), "swap store ready");
    let store = Arc::new(Mutex::new(store));

    let host = GrpcLightningHost::new(args.host_node_url).context("create host node client")?;

    let orchestrator = Arc::new(SwapOrchestrator::new(
        OrchestratorConfig {
            remote_node_pubkey,
            swap_expiry: Duration::from_secs(args.swap_expiry_secs),
        },
        store,
        Arc::new(host),
        remote,
        Arc::new(InboundRatioPolicy),
    ));

    spawn_swap_worker(
        orchestrator.clone(),
        Duration::from_secs(args.poll_interval_secs),
    );

    let svc = ChannelCreationServiceImpl::new(orchestrator);

    tracing::info!(
        %listen_addr,
        swap_api_url = %args.swap_api_url,
        swap_node_pubkey = %remote_node_pubkey,
        "starting channel creation gRPC server"
    );

    Server::builder()
        .add_service(ChannelCreationServiceServer::new(svc))
        .serve(listen_addr)
        .await
        .context("serve gRPC")?;

    Ok(())
}

fn spawn_swap_worker(orchestrator: Arc<SwapOrchestrator>, poll_interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = orchestrator.tick().await {
                tracing::warn!(error = %format!("{err:#}"), "swap worker error");
            }
        }
    });
}
