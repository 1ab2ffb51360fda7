//! Bounded retry with exponential backoff

use std::future::Future;
use std::time::Duration;

use agent_core::error::Result;

const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Run `op`, retrying retryable failures up to `max_retries` more times.
///
/// Backoff doubles from 500ms. Non-retryable errors return immediately.
pub async fn with_retry<T, F, Fut>(max_retries: u32, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let backoff = BASE_BACKOFF * 2u32.saturating_pow(attempt);
                tracing::warn!(attempt = attempt + 1, ?backoff, error = %e, "retrying provider call");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
