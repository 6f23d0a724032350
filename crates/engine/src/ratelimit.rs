//! Per-source request rate limiting.
//!
//! Fixed one-minute windows keyed by source key. The first request in a new
//! window starts the counter; once the count reaches the source's limit,
//! further requests in that window are rejected. State lives in a sharded
//! in-process map, which is sufficient for a single-instance deployment;
//! the contract is identical for a distributed backing store.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Window length. Limits are expressed as requests per minute.
const WINDOW_SECONDS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, for the `Retry-After` header.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.reset_at - now).num_seconds().max(0)
    }
}

#[derive(Debug)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against the source's window.
    pub fn check(&self, source_key: &str, limit_per_minute: u32) -> RateLimitDecision {
        self.check_at(source_key, limit_per_minute, Utc::now())
    }

    /// Time-injected variant of [`check`](Self::check). The entry guard
    /// makes the read-modify-write of a source's counter atomic; an expired
    /// window is reclaimed in place.
    pub fn check_at(
        &self,
        source_key: &str,
        limit_per_minute: u32,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let mut entry = self
            .windows
            .entry(source_key.to_string())
            .or_insert_with(|| Window {
                started_at: now,
                count: 0,
            });

        if now >= entry.started_at + Duration::seconds(WINDOW_SECONDS) {
            entry.started_at = now;
            entry.count = 0;
        }

        let reset_at = entry.started_at + Duration::seconds(WINDOW_SECONDS);

        if entry.count >= limit_per_minute {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at,
            };
        }

        entry.count += 1;

        RateLimitDecision {
            allowed: true,
            remaining: limit_per_minute.saturating_sub(entry.count),
            reset_at,
        }
    }

    /// Drop windows that have already ended. Invoked periodically so keys
    /// from sources gone quiet do not accumulate forever.
    pub fn sweep(&self) {
        self.sweep_at(Utc::now());
    }

    pub fn sweep_at(&self, now: DateTime<Utc>) {
        self.windows
            .retain(|_, window| now < window.started_at + Duration::seconds(WINDOW_SECONDS));
    }

    /// Forget all windows. For tests.
    pub fn clear(&self) {
        self.windows.clear();
    }

    pub fn tracked_sources(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new();
        let now = t0();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("vpn", 3, now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let rejected = limiter.check_at("vpn", 3, now + Duration::seconds(5));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_at, t0() + Duration::seconds(60));
        assert!(rejected.retry_after_seconds(now + Duration::seconds(5)) <= 60);
    }

    #[test]
    fn window_resets_after_a_minute() {
        let limiter = RateLimiter::new();
        let now = t0();

        for _ in 0..3 {
            limiter.check_at("vpn", 3, now);
        }
        assert!(!limiter.check_at("vpn", 3, now + Duration::seconds(59)).allowed);

        let fresh = limiter.check_at("vpn", 3, now + Duration::seconds(60));
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 2);
        assert_eq!(fresh.reset_at, now + Duration::seconds(120));
    }

    #[test]
    fn sources_are_limited_independently() {
        let limiter = RateLimiter::new();
        let now = t0();

        assert!(limiter.check_at("vpn", 1, now).allowed);
        assert!(!limiter.check_at("vpn", 1, now).allowed);
        assert!(limiter.check_at("iam", 1, now).allowed);
    }

    #[test]
    fn sweep_reclaims_expired_windows() {
        let limiter = RateLimiter::new();
        let now = t0();

        limiter.check_at("vpn", 10, now);
        limiter.check_at("iam", 10, now + Duration::seconds(30));
        assert_eq!(limiter.tracked_sources(), 2);

        limiter.sweep_at(now + Duration::seconds(61));
        assert_eq!(limiter.tracked_sources(), 1);

        limiter.clear();
        assert_eq!(limiter.tracked_sources(), 0);
    }

    #[test]
    fn remaining_never_negative() {
        let limiter = RateLimiter::new();
        let now = t0();

        for _ in 0..10 {
            let decision = limiter.check_at("vpn", 3, now);
            assert!(decision.remaining <= 3);
        }
    }
}
