//! Bounded exponential backoff for idempotent requests.
//!
//! Only errors that [`SyncError::is_retryable`] classifies as transient are
//! retried; permanent failures surface on the first attempt.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use notionsync_shared::{Result, RetryConfig};

/// Run `operation` until it succeeds, fails permanently, or the retry budget is spent.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay();

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(what, attempts = attempt + 1, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                warn!(
                    what,
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis() as u64,
                    "request failed, retrying"
                );

                tokio::time::sleep(wait).await;

                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .map_or(config.max_delay(), |next| next.min(config.max_delay()));
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scale a delay by a random factor in `[0.5, 1.5)`.
fn add_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
