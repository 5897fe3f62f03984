use std::future::Future;
use std::time::Duration;

use tracing::warn;

use scia_core::config::RetryConfig;
use scia_core::error::{Result, SciaError};
use scia_core::event::EventBus;
use scia_core::types::RunEvent;

/// Whether an error looks like a provider rate limit (HTTP 429).
pub fn is_rate_limited(e: &SciaError) -> bool {
    let msg = e.to_string().to_lowercase();
    msg.contains("429") || msg.contains("rate_limit")
}

/// Backoff before retry number `attempt` (0-based): `base * 2^attempt`.
pub fn backoff_for(attempt: u32, config: &RetryConfig) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_secs(config.backoff_base_secs.saturating_mul(factor))
}

/// Call an external capability, retrying rate-limit failures with exponential backoff.
///
/// Retries only when `policy.free_tier` is set and the error is a rate limit.
/// Any other error, or the last allowed attempt failing, is returned unchanged.
/// The sleep suspends only the calling task.
pub async fn invoke_with_retry<T, F, Fut>(
    policy: &RetryConfig,
    events: Option<&EventBus>,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let retryable = policy.free_tier && is_rate_limited(&e);
                if !retryable || attempt + 1 >= max_attempts {
                    return Err(e);
                }

                let backoff = backoff_for(attempt, policy);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    backoff_secs = backoff.as_secs(),
                    error = %e,
                    "Rate limited, retrying"
                );
                if let Some(bus) = events {
                    bus.publish(RunEvent::RetryScheduled {
                        attempt: attempt + 1,
                        backoff_secs: backoff.as_secs(),
                    });
                }
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}
