use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context as _, Result};
use bitcoin::hashes::Hash as _;
use bitcoin::secp256k1::PublicKey;
use uuid::Uuid;

use super::error::SwapError;
use super::gate::{self, HtlcAttempt, HtlcDecision, Verdict};
use super::store::{SqliteSwapStore, TransitionUpdate};
use super::{MAX_INVOICE_AMOUNT_MSAT, Preimage, SwapRecord, SwapStatus, SwapView, unix_now};
use crate::lightning::LightningHost;
use crate::lightning::channel::{CapacityPolicy, ChannelTerms, ChannelVerifier};
use crate::lightning::invoice::InvoiceIssuer;
use crate::remote::client::RemoteSwapClient;
use crate::remote::{RegisterSwapRequest, RemoteSwapStatus};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub remote_node_pubkey: PublicKey,
    /// How long the swap service has to deliver the channel.
    pub swap_expiry: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddChannelCreation {
    pub invoice_amount_msat: u64,
    pub inbound_percentage: u32,
    pub private: bool,
}

/// Drives swaps through their lifecycle. The only writer of swap records.
pub struct SwapOrchestrator {
    cfg: OrchestratorConfig,
    store: Arc<Mutex<SqliteSwapStore>>,
    invoices: InvoiceIssuer,
    channels: ChannelVerifier,
    remote: RemoteSwapClient,
    capacity: Arc<dyn CapacityPolicy>,
    creating: tokio::sync::Mutex<()>,
}

impl SwapOrchestrator {
    pub fn new(
        cfg: OrchestratorConfig,
        store: Arc<Mutex<SqliteSwapStore>>,
        host: Arc<dyn LightningHost>,
        remote: RemoteSwapClient,
        capacity: Arc<dyn CapacityPolicy>,
    ) -> Self {
        Self {
            cfg,
            store,
            invoices: InvoiceIssuer::new(host.clone()),
            channels: ChannelVerifier::new(host),
            remote,
            capacity,
            creating: tokio::sync::Mutex::new(()),
        }
    }

    fn store(&self) -> Result<MutexGuard<'_, SqliteSwapStore>> {
        self.store
            .lock()
            .map_err(|_| anyhow::anyhow!("store mutex poisoned"))
    }

    pub async fn create(&self, req: AddChannelCreation) -> Result<SwapView, SwapError> {
        if req.invoice_amount_msat == 0 || req.invoice_amount_msat > MAX_INVOICE_AMOUNT_MSAT {
            return Err(SwapError::InvalidAmount(req.invoice_amount_msat));
        }
        let inbound_percentage = u8::try_from(req.inbound_percentage)
            .ok()
            .filter(|pct| *pct <= 100)
            .ok_or(SwapError::InvalidInboundPercentage(req.inbound_percentage))?;

        let _creating = self.creating.lock().await;

        let active = self.store()?.active_swap()?;
        if let Some(active) = active {
            return Err(SwapError::Conflict {
                swap_id: active.swap_id,
            });
        }

        let existing = self
            .channels
            .existing_channel_with(&self.cfg.remote_node_pubkey)
            .await
            .context("list host channels")?;
        if let Some(channel) = existing {
            return Err(SwapError::ExistingChannel {
                channel_id: channel.channel_id,
            });
        }

        let preimage = Preimage::random();
        let payment_hash = preimage.payment_hash();
        let payment_hash_hex = hex::encode(payment_hash.to_byte_array());
        let expected_capacity_sat = self
            .capacity
            .expected_capacity_sat(req.invoice_amount_msat, inbound_percentage);
        let invoice_label = format!("channel-creation-{}", Uuid::new_v4());

        tracing::debug!(
            status = %SwapStatus::Created,
            payment_hash = %payment_hash_hex,
            invoice_amount_msat = req.invoice_amount_msat,
            inbound_percentage,
            private = req.private,
            expected_capacity_sat,
            "creating channel creation swap"
        );

        let invoice = self
            .invoices
            .issue(req.invoice_amount_msat, &payment_hash, &invoice_label)
            .await
            .map_err(|e| SwapError::Invoice(format!("{e:#}")))?;
        tracing::debug!(
            status = %SwapStatus::InvoiceIssued,
            payment_hash = %payment_hash_hex,
            %invoice_label,
            "invoice issued"
        );

        let registered = self
            .remote
            .register_swap(&RegisterSwapRequest {
                payment_hash: payment_hash_hex.clone(),
                invoice: invoice.clone(),
                invoice_amount_msat: req.invoice_amount_msat,
                inbound_percentage,
                private: req.private,
            })
            .await?;

        let now = unix_now();
        let record = SwapRecord {
            swap_id: registered.id,
            invoice_amount_msat: req.invoice_amount_msat,
            inbound_percentage,
            private: req.private,
            payment_hash: payment_hash_hex,
            preimage,
            invoice,
            invoice_label,
            expected_capacity_sat,
            remote_node_pubkey: self.cfg.remote_node_pubkey.to_string(),
            channel_id: None,
            failure_reason: None,
            status: SwapStatus::RegisteredRemotely,
            created_at: now,
            updated_at: now,
            expires_at: now.saturating_add(self.cfg.swap_expiry.as_secs()),
        };

        self.store()?
            .insert_swap(&record)
            .context("persist swap")?;

        tracing::info!(
            swap_id = %record.swap_id,
            payment_hash = %record.payment_hash,
            expected_capacity_sat,
            expires_at = record.expires_at,
            "added channel creation"
        );
        Ok(record.view())
    }

    /// Current or most recent swap.
    pub fn query(&self) -> Result<SwapView, SwapError> {
        let latest = self.store()?.latest_swap()?;
        latest.map(|r| r.view()).ok_or(SwapError::NoActiveSwap)
    }

    pub async fn tick(&self) -> Result<()> {
        self.tick_at(unix_now()).await
    }

    /// One round of background work on the active swap: expiry, remote
    /// status, channel detection.
    pub async fn tick_at(&self, now: u64) -> Result<()> {
        let active = self.store()?.active_swap()?;
        let Some(swap) = active else {
            return Ok(());
        };

        if swap.status == SwapStatus::HtlcAccepted {
            // only the gate settles, on the next payment attempt
            tracing::warn!(
                swap_id = %swap.swap_id,
                "swap stuck in htlc_accepted, waiting for the payment to be retried"
            );
            return Ok(());
        }

        if now >= swap.expires_at {
            self.expire(&swap, now)?;
            return Ok(());
        }

        match self.remote.poll_status(&swap.swap_id).await {
            Ok(status) if status.is_failure() => {
                self.fail(&swap, format!("swap service reported {status:?}"), now)?;
                return Ok(());
            }
            Ok(RemoteSwapStatus::Expired) => {
                if swap.status.can_transition_to(SwapStatus::Expired) {
                    self.transition(
                        &swap,
                        SwapStatus::Expired,
                        TransitionUpdate::failure("swap service expired the swap"),
                        now,
                    )?;
                } else {
                    self.fail(&swap, "swap service expired the swap".to_string(), now)?;
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(err) => {
                self.fail(&swap, format!("swap service status: {err}"), now)?;
                return Ok(());
            }
        }

        let mut status = swap.status;
        if status == SwapStatus::RegisteredRemotely {
            if !self.transition(
                &swap,
                SwapStatus::AwaitingChannel,
                TransitionUpdate::default(),
                now,
            )? {
                return Ok(());
            }
            status = SwapStatus::AwaitingChannel;
        }

        if status == SwapStatus::AwaitingChannel {
            let terms = self.terms(&swap)?;
            match self.channels.find_matching_channel(&terms).await {
                Ok(Some(channel)) => {
                    let channel_id = channel
                        .short_channel_id
                        .clone()
                        .unwrap_or_else(|| channel.channel_id.clone());
                    tracing::info!(
                        swap_id = %swap.swap_id,
                        %channel_id,
                        capacity_sat = channel.capacity_sat,
                        "observed channel matching the swap terms"
                    );
                    let observed = SwapRecord {
                        status: SwapStatus::AwaitingChannel,
                        ..swap
                    };
                    self.transition(
                        &observed,
                        SwapStatus::ChannelObserved,
                        TransitionUpdate::channel(channel_id),
                        now,
                    )?;
                }
                Ok(None) => {
                    tracing::debug!(swap_id = %swap.swap_id, "no matching channel yet");
                }
                Err(err) => {
                    tracing::warn!(
                        swap_id = %swap.swap_id,
                        error = %format!("{err:#}"),
                        "list host channels failed"
                    );
                }
            }
        }

        Ok(())
    }

    /// Applies the gate's verdict for an incoming payment attempt. Reading the
    /// record and writing the outcome happen under one store lock.
    pub(crate) fn resolve_htlc(&self, attempt: &HtlcAttempt) -> Result<HtlcDecision> {
        let payment_hash = attempt.payment_hash.to_ascii_lowercase();
        let mut store = self.store()?;

        let Some(swap) = store.swap_by_payment_hash(&payment_hash)? else {
            return Ok(HtlcDecision::Continue);
        };

        let now = unix_now();
        match gate::evaluate(&swap, attempt, now) {
            Verdict::Settle => {
                let completed = store.complete(&swap.swap_id, swap.status, now)?;
                anyhow::ensure!(completed, "swap {} changed while settling", swap.swap_id);

                tracing::info!(
                    swap_id = %swap.swap_id,
                    amount_msat = attempt.amount_msat,
                    "accepted invoice payment, releasing preimage"
                );
                Ok(HtlcDecision::Accept {
                    preimage: swap.preimage,
                })
            }
            Verdict::Refuse(reason) => {
                tracing::info!(swap_id = %swap.swap_id, %reason, "rejected invoice payment");
                Ok(HtlcDecision::Reject { reason })
            }
            Verdict::Expired => {
                store.transition(
                    &swap.swap_id,
                    swap.status,
                    SwapStatus::Expired,
                    &TransitionUpdate::failure("expired before settlement"),
                    now,
                )?;
                tracing::info!(swap_id = %swap.swap_id, "rejected invoice payment for expired swap");
                Ok(HtlcDecision::Reject {
                    reason: "swap expired".to_string(),
                })
            }
            Verdict::Violation(reason) => {
                store.transition(
                    &swap.swap_id,
                    swap.status,
                    SwapStatus::Failed,
                    &TransitionUpdate::failure(reason.clone()),
                    now,
                )?;
                tracing::warn!(swap_id = %swap.swap_id, %reason, "rejected invoice payment, swap failed");
                Ok(HtlcDecision::Reject { reason })
            }
        }
    }

    fn terms(&self, swap: &SwapRecord) -> Result<ChannelTerms> {
        let remote_node: PublicKey = swap
            .remote_node_pubkey
            .parse()
            .with_context(|| format!("parse remote node pubkey of swap {}", swap.swap_id))?;
        Ok(ChannelTerms {
            remote_node,
            min_capacity_sat: swap.expected_capacity_sat,
            private: swap.private,
        })
    }

    fn expire(&self, swap: &SwapRecord, now: u64) -> Result<bool> {
        if swap.status.can_transition_to(SwapStatus::Expired) {
            tracing::info!(swap_id = %swap.swap_id, status = %swap.status, "swap expired");
            self.transition(
                swap,
                SwapStatus::Expired,
                TransitionUpdate::failure("no matching channel before expiry"),
                now,
            )
        } else {
            self.fail(
                swap,
                "swap service did not pick up the swap before expiry".to_string(),
                now,
            )
        }
    }

    fn fail(&self, swap: &SwapRecord, reason: String, now: u64) -> Result<bool> {
        tracing::warn!(swap_id = %swap.swap_id, status = %swap.status, %reason, "swap failed");
        self.transition(swap, SwapStatus::Failed, TransitionUpdate::failure(reason), now)
    }

    fn transition(
        &self,
        swap: &SwapRecord,
        to: SwapStatus,
        update: TransitionUpdate,
        now: u64,
    ) -> Result<bool> {
        let applied = self
            .store()?
            .transition(&swap.swap_id, swap.status, to, &update, now)?;
        if applied {
            tracing::info!(swap_id = %swap.swap_id, from = %swap.status, %to, "swap status changed");
        } else {
            tracing::debug!(
                swap_id = %swap.swap_id,
                from = %swap.status,
                %to,
                "swap status changed concurrently, skipping"
            );
        }
        Ok(applied)
    }
}
