//! Per-key sliding-window rate limiting.
//!
//! Each upstream key gets a trailing window of request timestamps. The check
//! and the recording are one operation under the key's map shard, so two
//! concurrent requests on the same key can never both slip past the limit.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    /// The request may proceed; its timestamp has been recorded.
    Allowed,
    /// The key is at capacity; retry after the given duration.
    Limited { retry_after: Duration },
}

/// Sliding-window request limiter, keyed by upstream key secret.
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            max_requests,
            window,
        }
    }

    /// Prune stale timestamps, then either record the request and allow it,
    /// or report how long until the oldest in-window request ages out.
    pub fn check_and_record(&self, secret: &str) -> RateDecision {
        let now = Instant::now();
        let mut window = self.windows.entry(secret.to_string()).or_default();

        while window
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            window.pop_front();
        }

        if window.len() < self.max_requests {
            window.push_back(now);
            return RateDecision::Allowed;
        }

        // Non-empty here: max_requests >= 1 and nothing was admitted.
        let oldest = *window.front().expect("window at capacity");
        let retry_after = (oldest + self.window).saturating_duration_since(now);
        RateDecision::Limited { retry_after }
    }

    /// Number of in-window requests currently recorded for a key.
    pub fn in_window(&self, secret: &str) -> usize {
        let now = Instant::now();
        self.windows
            .get(secret)
            .map(|window| {
                window
                    .iter()
                    .filter(|&&t| now.duration_since(t) < self.window)
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test(start_paused = true)]
    async fn test_two_allowed_then_limited_within_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);

        assert_matches!(
            limiter.check_and_record("key-a"),
            RateDecision::Limited { retry_after } if retry_after > Duration::ZERO
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_tracks_oldest_request() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_matches!(
            limiter.check_and_record("key-a"),
            RateDecision::Limited { retry_after } if retry_after == Duration::from_secs(40)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));

        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);

        // first request ages out, freeing one slot
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);
        assert_matches!(
            limiter.check_and_record("key-a"),
            RateDecision::Limited { .. }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));

        assert_eq!(limiter.check_and_record("key-a"), RateDecision::Allowed);
        assert_eq!(limiter.check_and_record("key-b"), RateDecision::Allowed);
        assert_matches!(
            limiter.check_and_record("key-a"),
            RateDecision::Limited { .. }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_window_counts_only_fresh_entries() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));

        limiter.check_and_record("key-a");
        limiter.check_and_record("key-a");
        assert_eq!(limiter.in_window("key-a"), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.in_window("key-a"), 0);
        assert_eq!(limiter.in_window("unknown"), 0);
    }
}
