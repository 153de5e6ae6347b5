use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};

/// Polls `f` with growing pauses until it yields a value or `timeout` passes.
pub async fn wait_for<T, F, Fut>(description: &str, timeout: Duration, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    let mut sleep_for = Duration::from_millis(20);

    loop {
        if let Some(value) = f().await.with_context(|| format!("poll {description}"))? {
            return Ok(value);
        }
        if Instant::now() >= deadline {
            anyhow::bail!("timeout waiting for {description}");
        }

        tokio::time::sleep(sleep_for).await;
        sleep_for = (sleep_for * 2).min(Duration::from_millis(500));
    }
}
