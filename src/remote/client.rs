use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use bitcoin::secp256k1::PublicKey;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use url::Url;

use super::signature::SignatureVerifier;
use super::{
    ErrorReply, NodesReply, RegisterSwapRequest, RegisteredSwap, RemoteError, RemoteSwapStatus,
    SwapStatusReply,
};

/// Raw reply from the swap service before any verification.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Moves bytes to and from the swap service. Errors are treated as transient.
#[tonic::async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn get(&self, path: &str) -> Result<RawReply>;
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawReply>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("parse api url {base_url}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { base_url, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("join api path {path}"))
    }

    async fn read(resp: reqwest::Response) -> Result<RawReply> {
        let status = resp.status().as_u16();
        let body = resp.bytes().await.context("read response body")?;
        Ok(RawReply {
            status,
            body: body.to_vec(),
        })
    }
}

#[tonic::async_trait]
impl RemoteTransport for HttpTransport {
    async fn get(&self, path: &str) -> Result<RawReply> {
        let url = self.endpoint(path)?;
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        Self::read(resp).await
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<RawReply> {
        let url = self.endpoint(path)?;
        let resp = self
            .client
            .post(url.clone())
            .json(&body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        Self::read(resp).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignedEnvelope<'a> {
    #[serde(borrow)]
    data: &'a RawValue,
    signature: String,
}

/// Outcome of a single request attempt.
enum Attempt<T> {
    Done(T),
    Rejected(String),
    Untrusted(String),
    Transient(String),
}

#[derive(Clone)]
pub struct RemoteSwapClient {
    transport: Arc<dyn RemoteTransport>,
    verifier: Arc<dyn SignatureVerifier>,
    retry: RetryPolicy,
}

impl RemoteSwapClient {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        verifier: Arc<dyn SignatureVerifier>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            verifier,
            retry,
        }
    }

    pub async fn register_swap(
        &self,
        req: &RegisterSwapRequest,
    ) -> Result<RegisteredSwap, RemoteError> {
        let body = serde_json::to_value(req).map_err(|e| {
            RemoteError::Rejected(format!("encode swap registration: {e}"))
        })?;

        let registered: RegisteredSwap = self
            .call("register swap", || self.transport.post("v1/swaps", body.clone()))
            .await?;

        if !registered
            .payment_hash
            .eq_ignore_ascii_case(&req.payment_hash)
        {
            return Err(RemoteError::Rejected(format!(
                "swap service registered payment hash {} instead of {}",
                registered.payment_hash, req.payment_hash
            )));
        }

        tracing::info!(
            swap_id = %registered.id,
            payment_hash = %req.payment_hash,
            "swap registered with swap service"
        );
        Ok(registered)
    }

    pub async fn poll_status(&self, swap_id: &str) -> Result<RemoteSwapStatus, RemoteError> {
        let path = format!("v1/swaps/{swap_id}");
        let expected = swap_id.to_string();

        let reply: SwapStatusReply = self
            .call_checked(
                "poll swap status",
                || self.transport.get(&path),
                |reply: &SwapStatusReply| {
                    (reply.id == expected)
                        .then_some(())
                        .ok_or_else(|| format!("status reply for swap {}", reply.id))
                },
            )
            .await?;

        tracing::debug!(swap_id, status = ?reply.status, "polled swap status");
        Ok(reply.status)
    }

    /// Lightning node the swap service opens channels from.
    pub async fn node_pubkey(&self) -> Result<PublicKey, RemoteError> {
        self.call_checked(
            "get nodes",
            || self.transport.get("v1/nodes"),
            |reply: &NodesReply| {
                reply
                    .node_pubkey
                    .parse::<PublicKey>()
                    .map(|_| ())
                    .map_err(|e| format!("invalid node_pubkey: {e}"))
            },
        )
        .await
        .and_then(|reply: NodesReply| {
            reply
                .node_pubkey
                .parse()
                .map_err(|e| RemoteError::Untrusted(format!("invalid node_pubkey: {e}")))
        })
    }

    async fn call<T, F, Fut>(&self, what: &str, send: F) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<RawReply>>,
    {
        self.call_checked(what, send, |_: &T| Ok(())).await
    }

    async fn call_checked<T, F, Fut, C>(
        &self,
        what: &str,
        send: F,
        check: C,
    ) -> Result<T, RemoteError>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<RawReply>>,
        C: Fn(&T) -> Result<(), String>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut all_untrusted = true;
        let mut last_reason = String::new();

        for attempt in 1..=max_attempts {
            let outcome = match send().await {
                Ok(reply) => self.interpret(reply, &check),
                Err(err) => Attempt::Transient(format!("{err:#}")),
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Rejected(reason) => return Err(RemoteError::Rejected(reason)),
                Attempt::Untrusted(reason) => {
                    tracing::warn!(what, attempt, max_attempts, %reason, "unverifiable swap service reply");
                    last_reason = reason;
                }
                Attempt::Transient(reason) => {
                    tracing::warn!(what, attempt, max_attempts, %reason, "swap service request failed");
                    all_untrusted = false;
                    last_reason = reason;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.retry.max_backoff);
            }
        }

        if all_untrusted {
            Err(RemoteError::Untrusted(format!(
                "{what}: {last_reason} (after {max_attempts} attempts)"
            )))
        } else {
            Err(RemoteError::Unavailable {
                attempts: max_attempts,
                reason: format!("{what}: {last_reason}"),
            })
        }
    }

    fn interpret<T, C>(&self, reply: RawReply, check: &C) -> Attempt<T>
    where
        T: DeserializeOwned,
        C: Fn(&T) -> Result<(), String>,
    {
        if reply.status >= 500 {
            return Attempt::Transient(format!("http status {}", reply.status));
        }

        let envelope: SignedEnvelope<'_> = match serde_json::from_slice(&reply.body) {
            Ok(envelope) => envelope,
            Err(e) => return Attempt::Untrusted(format!("malformed reply: {e}")),
        };
        let data = envelope.data.get();
        if !self.verifier.verify(data.as_bytes(), &envelope.signature) {
            return Attempt::Untrusted("signature verification failed".to_string());
        }

        if reply.status >= 400 {
            return match serde_json::from_str::<ErrorReply>(data) {
                Ok(err) => Attempt::Rejected(err.error),
                Err(_) => Attempt::Rejected(format!("http status {}", reply.status)),
            };
        }

        let value: T = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(e) => return Attempt::Untrusted(format!("malformed reply data: {e}")),
        };
        match check(&value) {
            Ok(()) => Attempt::Done(value),
            Err(reason) => Attempt::Untrusted(reason),
        }
    }
}
