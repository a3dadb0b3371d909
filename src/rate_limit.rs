// Outbound rate limiting.
// Fixed-window call quota that every upstream request must pass before it is sent.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

/// Call accounting for the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    /// When the current window was opened.
    pub window_start: DateTime<Utc>,
    /// Calls admitted so far in this window.
    pub count: u32,
    /// Length of a window.
    pub window_length: Duration,
    /// Maximum calls admitted per window.
    pub quota: u32,
}

impl RateLimitWindow {
    pub fn new(quota: u32, window_length: Duration, window_start: DateTime<Utc>) -> Self {
        Self {
            window_start,
            count: 0,
            window_length,
            quota,
        }
    }

    fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        // A clock that moved backwards counts as no time elapsed.
        now.signed_duration_since(self.window_start)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether `now` lies past the end of this window.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) >= self.window_length
    }

    /// Time left until this window closes.
    pub fn reset_in(&self, now: DateTime<Utc>) -> Duration {
        self.window_length.saturating_sub(self.elapsed(now))
    }

    /// Wall-clock time at which this window closes.
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.closing_time(self.window_start)
    }

    /// Close of a window of this length opened at `start`.
    fn closing_time(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.window_length)
            .ok()
            .and_then(|length| start.checked_add_signed(length))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn remaining(&self) -> u32 {
        self.quota.saturating_sub(self.count)
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in: Duration,
}

/// Read-only view of the limiter for telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub used: u32,
    pub reset_in: Duration,
    pub reset_at: DateTime<Utc>,
}

/// Shared fixed-window rate limiter.
///
/// A single mutex guards the window; it is only held for the check-and-increment
/// and never across an `.await`.
#[derive(Debug)]
pub struct RateLimiter {
    window: Mutex<RateLimitWindow>,
}

impl RateLimiter {
    /// Create a limiter whose first window opens now.
    pub fn new(quota: u32, window_length: Duration) -> Self {
        Self::starting_at(quota, window_length, Utc::now())
    }

    /// Create a limiter whose first window opens at `start`.
    pub fn starting_at(quota: u32, window_length: Duration, start: DateTime<Utc>) -> Self {
        Self {
            window: Mutex::new(RateLimitWindow::new(quota, window_length, start)),
        }
    }

    /// Check and count one outbound call against the quota.
    pub fn try_consume(&self) -> RateLimitDecision {
        self.try_consume_at(Utc::now())
    }

    /// Check and count one outbound call at the given instant.
    ///
    /// The first call observed after the window has elapsed opens a new window
    /// anchored at `now`, not at the theoretical boundary.
    pub fn try_consume_at(&self, now: DateTime<Utc>) -> RateLimitDecision {
        let mut window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if window.has_expired(now) {
            debug!(
                previous_count = window.count,
                quota = window.quota,
                "rate limit window rolled over"
            );
            window.count = 0;
            window.window_start = now;
        }

        if window.count >= window.quota {
            let reset_in = window.reset_in(now);
            warn!(
                quota = window.quota,
                reset_in_secs = reset_in.as_secs(),
                "outbound rate limit exhausted"
            );
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_in,
            };
        }

        window.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: window.remaining(),
            reset_in: window.reset_in(now),
        }
    }

    /// Current usage, without rolling the window over.
    pub fn status(&self) -> RateLimitStatus {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> RateLimitStatus {
        let window = self.window.lock().unwrap_or_else(PoisonError::into_inner);

        if window.has_expired(now) {
            // The next call will open a fresh window; report it as such.
            return RateLimitStatus {
                limit: window.quota,
                used: 0,
                reset_in: window.window_length,
                reset_at: window.closing_time(now),
            };
        }

        RateLimitStatus {
            limit: window.quota,
            used: window.count,
            reset_in: window.reset_in(now),
            reset_at: window.reset_at(),
        }
    }

    /// Copy of the current window state.
    pub fn window(&self) -> RateLimitWindow {
        self.window
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const HOUR: Duration = Duration::from_secs(3600);

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_quota_exhaustion_and_rollover() {
        let limiter = RateLimiter::starting_at(60, HOUR, t0());

        for i in 0..60 {
            let decision = limiter.try_consume_at(t0());
            assert!(decision.allowed, "call {} should be admitted", i + 1);
            assert_eq!(decision.remaining, 59 - i);
        }

        let rejected = limiter.try_consume_at(at(10));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_in, Duration::from_secs(3590));
        assert_eq!(limiter.window().count, 60);

        let admitted = limiter.try_consume_at(at(3601));
        assert!(admitted.allowed);

        let window = limiter.window();
        assert_eq!(window.count, 1);
        assert_eq!(window.window_start, at(3601));
        assert_eq!(admitted.reset_in, HOUR);
    }

    #[test]
    fn test_count_never_exceeds_quota() {
        let limiter = RateLimiter::starting_at(5, HOUR, t0());

        let admitted = (0..50)
            .map(|i| limiter.try_consume_at(at(i)))
            .filter(|d| d.allowed)
            .count();

        assert_eq!(admitted, 5);
        assert_eq!(limiter.window().count, 5);
    }

    #[test]
    fn test_window_anchored_at_first_call_after_expiry() {
        let limiter = RateLimiter::starting_at(2, Duration::from_secs(100), t0());
        limiter.try_consume_at(t0());

        // Nothing happens for a while; the next window starts at the call, not at t=100.
        limiter.try_consume_at(at(250));
        assert_eq!(limiter.window().window_start, at(250));

        // Still inside the window opened at t=250.
        let decision = limiter.try_consume_at(at(349));
        assert!(decision.allowed);
        assert_eq!(limiter.window().count, 2);
        assert_eq!(limiter.window().window_start, at(250));
    }

    #[test]
    fn test_clock_going_backwards_does_not_reset() {
        let limiter = RateLimiter::starting_at(1, HOUR, t0());
        assert!(limiter.try_consume_at(t0()).allowed);
        assert!(!limiter.try_consume_at(at(-30)).allowed);
    }

    #[test]
    fn test_status_does_not_mutate() {
        let limiter = RateLimiter::starting_at(10, HOUR, t0());
        limiter.try_consume_at(t0());
        limiter.try_consume_at(t0());

        let status = limiter.status_at(at(600));
        assert_eq!(status.limit, 10);
        assert_eq!(status.used, 2);
        assert_eq!(status.reset_in, Duration::from_secs(3000));
        assert_eq!(status.reset_at, at(3600));

        let expired = limiter.status_at(at(4000));
        assert_eq!(expired.used, 0);
        // Reading status after expiry leaves the old window in place.
        assert_eq!(limiter.window().window_start, t0());
        assert_eq!(limiter.window().count, 2);
    }

    #[test]
    fn test_expired_status_reset_fields_agree() {
        let limiter = RateLimiter::starting_at(60, HOUR, t0());
        limiter.try_consume_at(t0());

        let now = at(4000);
        let status = limiter.status_at(now);

        assert_eq!(status.reset_in, HOUR);
        assert_eq!(status.reset_at, at(4000 + 3600));
        assert_eq!(
            (status.reset_at - now).to_std().unwrap(),
            status.reset_in
        );
    }

    #[test]
    fn test_concurrent_consumers_respect_quota() {
        let limiter = Arc::new(RateLimiter::new(100, HOUR));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.try_consume().allowed).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 100);
        assert_eq!(limiter.window().count, 100);
    }
}
