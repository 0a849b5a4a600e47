//! Transport-level retry for total write failures

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::SinkError;

/// Base delay for exponential backoff (doubles each retry)
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Delay before retry number `attempt` (zero-based), capped at 64x
pub fn retry_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY * (1 << attempt.min(6))
}

/// Run `operation`, retrying retryable errors up to `max_retries` times
///
/// Only for calls that are all-or-nothing; partial outcomes are returned
/// as `Ok` and never repeated.
pub(crate) async fn with_retry<T, F, Fut>(
    operation_name: &str,
    max_retries: u32,
    mut operation: F,
) -> Result<T, SinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SinkError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                let delay = retry_delay(attempt);
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "warehouse call failed, will retry"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
