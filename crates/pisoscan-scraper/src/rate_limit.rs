//! Inter-request rate limiting shared by every source.
//!
//! One limiter instance serializes all outbound fetches system-wide: the
//! mutex guard is held across the wait, so concurrent callers queue up and
//! each grant is spaced at least one minimum interval after the previous
//! one, regardless of which source is asking.

use std::time::Duration;

use tokio::time::Instant;

/// Enforces a minimum interval between consecutive granted acquisitions.
///
/// The interval is `60s / requests_per_minute`. The only observable effect
/// is delay; `acquire` cannot fail, and the guard is released on every exit
/// path.
pub struct RateLimiter {
    min_interval: Duration,
    cooldown: Duration,
    last_grant: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(requests_per_minute: u32, cooldown: Duration) -> Self {
        let per_minute = u64::from(requests_per_minute.max(1));
        Self {
            min_interval: Duration::from_millis(60_000 / per_minute),
            cooldown,
            last_grant: tokio::sync::Mutex::new(None),
        }
    }

    /// Waits until at least one minimum interval has elapsed since the
    /// previous grant, then returns.
    pub async fn acquire(&self) {
        let mut last_grant = self.last_grant.lock().await;

        if let Some(previous) = *last_grant {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let wait = self.min_interval - elapsed;
                tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limiting");
                tokio::time::sleep(wait).await;
            }
        }

        *last_grant = Some(Instant::now());
    }

    /// Like [`RateLimiter::acquire`], then sleeps the configured cooldown
    /// before returning.
    pub async fn acquire_with_cooldown(&self) {
        self.acquire().await;
        tokio::time::sleep(self.cooldown).await;
    }

    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn sequential_acquires_are_spaced_by_min_interval() {
        // 6 requests per minute -> 10s between grants.
        let limiter = RateLimiter::new(6, Duration::ZERO);
        let mut grants = Vec::new();

        for _ in 0..4 {
            limiter.acquire().await;
            grants.push(Instant::now());
        }

        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_acquire_does_not_wait() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_serialize() {
        let limiter = Arc::new(RateLimiter::new(6, Duration::ZERO));
        let start = Instant::now();

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire().await;
                    Instant::now()
                })
            })
            .collect();

        let mut grants = Vec::new();
        for task in tasks {
            grants.push(task.await.unwrap());
        }
        grants.sort();

        // Three grants over a 10s interval: the last one lands at least 20s
        // after the start.
        assert!(grants[2] - start >= Duration::from_secs(20));
        for pair in grants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_adds_a_fixed_sleep_after_the_grant() {
        let limiter = RateLimiter::new(60, Duration::from_secs(5));
        let before = Instant::now();
        limiter.acquire_with_cooldown().await;
        assert!(Instant::now() - before >= Duration::from_secs(5));
    }
}
