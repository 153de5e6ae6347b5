use anyhow::{Context as _, Result};
use channel_creation_swap::proto::v1::channel_creation_service_client::ChannelCreationServiceClient;
use channel_creation_swap::proto::v1::{
    AddChannelCreationRequest, ChannelCreation, GetChannelCreationRequest, SwapStatus,
};
use clap::{ArgAction, Parser as _, Subcommand};
use serde_json::json;

#[derive(Debug, clap::Parser)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:50061")]
    grpc_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Asks the swap service to open a channel funded partly by an invoice payment.
    AddChannelCreation {
        invoice_amount_msat: u64,

        inbound_percentage: u32,

        #[arg(default_value_t = false, action = ArgAction::Set)]
        private: bool,
    },
    /// Shows the current or most recent channel creation swap.
    GetChannelCreation,
}

#[tokio::main]
async fn main() -> Result<()> {
    channel_creation_swap::logging::init().ok();
    let args = Args::parse();

    let mut client = ChannelCreationServiceClient::connect(args.grpc_url)
        .await
        .context("connect gRPC")?;

    let swap = match args.command {
        Command::AddChannelCreation {
            invoice_amount_msat,
            inbound_percentage,
            private,
        } => client
            .add_channel_creation(AddChannelCreationRequest {
                invoice_amount_msat,
                inbound_percentage,
                private,
            })
            .await
            .context("AddChannelCreation")?
            .into_inner(),
        Command::GetChannelCreation => client
            .get_channel_creation(GetChannelCreationRequest {})
            .await
            .context("GetChannelCreation")?
            .into_inner(),
    };

    println!("{}", serde_json::to_string_pretty(&swap_json(swap))?);
    Ok(())
}

fn swap_json(swap: ChannelCreation) -> serde_json::Value {
    let status_str = SwapStatus::try_from(swap.status)
        .ok()
        .map(|s| format!("{s:?}"))
        .unwrap_or_else(|| format!("UNKNOWN({})", swap.status));

    json!({
      "swap_id": swap.swap_id,
      "status": status_str,
      "status_description": swap.status_description,
      "invoice_amount_msat": swap.invoice_amount_msat,
      "inbound_percentage": swap.inbound_percentage,
      "private": swap.private,
      "payment_hash": swap.payment_hash,
      "invoice": swap.invoice,
      "expected_channel_capacity_sat": swap.expected_channel_capacity_sat,
      "remote_node_pubkey": swap.remote_node_pubkey,
      "channel_id": swap.channel_id,
      "failure_reason": swap.failure_reason,
      "created_at": swap.created_at,
      "updated_at": swap.updated_at,
      "expires_at": swap.expires_at,
    })
}
