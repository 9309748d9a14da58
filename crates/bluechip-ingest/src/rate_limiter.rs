//! Sliding-window rate limiter shared by every call site of one provider.

use crate::error::{IngestError, Result};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SECONDS_PER_DAY: u32 = 24 * 60 * 60;

/// Admits at most `limit` requests in any trailing `interval`.
///
/// Callers are delayed, never rejected. One instance is shared (behind an
/// `Arc`) by all calls against the same provider; separate providers get
/// separate instances so their windows never interact.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    limit: usize,
    interval: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `interval`.
    ///
    /// A `limit` of zero is treated as one so that callers can always make progress.
    pub fn new(name: impl Into<String>, limit: usize, interval: Duration) -> Self {
        Self {
            name: name.into(),
            limit: limit.max(1),
            interval,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a one-second window limiter from a daily request quota.
    ///
    /// The per-second ceiling is `floor(quota / 86400)`, but never below one.
    pub fn per_second_from_daily_quota(name: impl Into<String>, daily_quota: u32) -> Self {
        let per_second = (daily_quota / SECONDS_PER_DAY).max(1) as usize;
        Self::new(name, per_second, Duration::from_secs(1))
    }

    /// Wait until one more request fits in the window, then record it as admitted.
    ///
    /// # Errors
    /// Returns `IngestError::Cancelled` if `cancel` fires while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }

            let wait = {
                let mut admitted = self.admitted.lock().await;
                let now = Instant::now();
                self.prune(&mut admitted, now);

                match admitted.front() {
                    Some(&oldest) if admitted.len() >= self.limit => {
                        self.interval.saturating_sub(now.duration_since(oldest))
                    }
                    _ => {
                        admitted.push_back(now);
                        return Ok(());
                    }
                }
            };

            tracing::debug!(
                "Rate limit hit for {} ({} per {:?}), waiting {:?}",
                self.name,
                self.limit,
                self.interval,
                wait
            );

            // Re-check after the wait; other waiters may have taken the slot.
            tokio::select! {
                () = cancel.cancelled() => return Err(IngestError::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Number of admissions still inside the trailing window.
    pub async fn in_flight_window(&self) -> usize {
        let mut admitted = self.admitted.lock().await;
        self.prune(&mut admitted, Instant::now());
        admitted.len()
    }

    /// Maximum admissions per window.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn prune(&self, admitted: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = admitted.front() {
            if now.duration_since(oldest) >= self.interval {
                admitted.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn assert_window_respected(times: &[Instant], limit: usize, interval: Duration) {
        for (i, &at) in times.iter().enumerate() {
            let in_window = times[..=i]
                .iter()
                .filter(|&&earlier| at.duration_since(earlier) < interval)
                .count();
            assert!(
                in_window <= limit,
                "{in_window} admissions inside {interval:?} ending at admission {i}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_spread_over_windows() {
        let limiter = RateLimiter::new("test", 3, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let mut times = Vec::new();
        for _ in 0..7 {
            limiter.acquire(&cancel).await.expect("acquire");
            times.push(Instant::now());
        }

        assert_window_respected(&times, 3, Duration::from_secs(10));
        // Three immediately, three after one window, the last after two.
        assert_eq!(times[2].duration_since(start), Duration::ZERO);
        assert_eq!(times[3].duration_since(start), Duration::from_secs(10));
        assert_eq!(times[6].duration_since(start), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_irregular_timing_respects_window() {
        let limiter = RateLimiter::new("test", 2, Duration::from_millis(1000));
        let cancel = CancellationToken::new();

        let mut times = Vec::new();
        for gap_ms in [0u64, 100, 50, 900, 10, 10, 2000, 0, 0, 300] {
            tokio::time::sleep(Duration::from_millis(gap_ms)).await;
            limiter.acquire(&cancel).await.expect("acquire");
            times.push(Instant::now());
        }

        assert_window_respected(&times, 2, Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_waiters_never_over_admit() {
        let limiter = Arc::new(RateLimiter::new("test", 2, Duration::from_secs(1)));
        let cancel = CancellationToken::new();

        let mut handles = Vec::new();
        for _ in 0..9 {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&cancel).await.expect("acquire");
                Instant::now()
            }));
        }

        let mut times = Vec::new();
        for handle in handles {
            times.push(handle.await.expect("task"));
        }
        times.sort();

        assert_window_respected(&times, 2, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_limiters_do_not_share_state() {
        let api = RateLimiter::new("api", 1, Duration::from_secs(300));
        let geo = RateLimiter::new("geo", 1, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        api.acquire(&cancel).await.expect("api acquire");
        geo.acquire(&cancel).await.expect("geo acquire");
        geo.acquire(&cancel).await.expect("geo acquire");

        assert_eq!(Instant::now().duration_since(start), Duration::from_secs(1));
        assert_eq!(api.in_flight_window().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let limiter = RateLimiter::new("test", 1, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        limiter.acquire(&cancel).await.expect("first acquire");

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let result = limiter.acquire(&cancel).await;
        assert!(matches!(result, Err(IngestError::Cancelled)));
        assert_eq!(limiter.in_flight_window().await, 1);
    }

    #[test]
    fn test_daily_quota_derivation() {
        let free_tier = RateLimiter::per_second_from_daily_quota("geo", 2500);
        assert_eq!(free_tier.limit(), 1);
        assert_eq!(free_tier.interval(), Duration::from_secs(1));

        let large = RateLimiter::per_second_from_daily_quota("geo", 864_000);
        assert_eq!(large.limit(), 10);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        assert_eq!(RateLimiter::new("test", 0, Duration::from_secs(1)).limit(), 1);
    }
}
