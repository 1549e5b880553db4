//! Retry loop for fetch operations that report failure as `None`.
//!
//! Page fetches swallow their errors at the fetch boundary and surface
//! `None`; this helper re-drives them with a growing backoff. Errors the
//! caller wants to propagate (parse failures, bad configuration) should not
//! go through here.

use std::future::Future;
use std::time::Duration;

/// Runs `attempt_fn` up to `max_attempts` times, returning the first
/// `Some` result.
///
/// The backoff before retry `n` (1-based) is `base_delay * n`. No sleep
/// happens after the final failed attempt. `max_attempts` is clamped to at
/// least 1.
pub async fn fetch_with_retry<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    mut attempt_fn: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if let Some(value) = attempt_fn().await {
            return Some(value);
        }

        if attempt < max_attempts {
            let delay = base_delay * attempt;
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "fetch attempt failed; backing off before retry"
            );
            tokio::time::sleep(delay).await;
        }
    }

    None
}
