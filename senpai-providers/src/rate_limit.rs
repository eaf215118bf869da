//! Per-host minimum request interval
//!
//! Each logical upstream host (e.g. `catalog`, `anilist`) gets its own
//! GCRA bucket with a burst of one, so consecutive calls to the same host are
//! spaced at least `min_interval` apart. Waiting is an async suspension, never
//! a thread block; calls to different hosts never wait on each other.

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorRateLimiter};
use nonzero_ext::nonzero;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Type alias for the limiter map to avoid clippy::type_complexity
type LimiterMap = dashmap::DashMap<u64, Arc<DefaultKeyedRateLimiter<String>>>;

/// Keyed minimum-interval limiter.
///
/// Governor uses a fixed quota per limiter instance, so one keyed limiter is
/// kept per distinct interval; hosts sharing an interval share an instance
/// but still get independent buckets.
#[derive(Clone)]
pub struct HostRateLimiter {
    default_interval: Duration,
    overrides: Arc<HashMap<String, Duration>>,
    limiters: Arc<LimiterMap>,
}

impl HostRateLimiter {
    #[must_use]
    pub fn new(default_interval: Duration, overrides: HashMap<String, Duration>) -> Self {
        Self {
            default_interval,
            overrides: Arc::new(overrides),
            limiters: Arc::new(dashmap::DashMap::new()),
        }
    }

    /// Limiter that never waits (useful for tests and local mocks).
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, HashMap::new())
    }

    /// Configured minimum interval for `host`.
    #[must_use]
    pub fn interval_for(&self, host: &str) -> Duration {
        self.overrides
            .get(host)
            .copied()
            .unwrap_or(self.default_interval)
    }

    fn limiter_for(&self, interval: Duration) -> Option<Arc<DefaultKeyedRateLimiter<String>>> {
        let key = u64::try_from(interval.as_micros()).unwrap_or(u64::MAX);
        if let Some(limiter) = self.limiters.get(&key) {
            return Some(Arc::clone(limiter.value()));
        }

        // Zero interval means "no limit"
        let quota = Quota::with_period(interval)?.allow_burst(nonzero!(1u32));
        let limiter = self
            .limiters
            .entry(key)
            .or_insert_with(|| Arc::new(GovernorRateLimiter::keyed(quota)));
        Some(Arc::clone(limiter.value()))
    }

    /// Suspend the caller until `host` may be called again.
    pub async fn until_ready(&self, host: &str) {
        let interval = self.interval_for(host);
        let Some(limiter) = self.limiter_for(interval) else {
            return;
        };

        let key = host.to_string();
        if let Err(not_until) = limiter.check_key(&key) {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            tracing::debug!(
                host,
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                "Waiting for upstream request slot"
            );
            limiter.until_key_ready(&key).await;
        }
    }
}

impl std::fmt::Debug for HostRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostRateLimiter")
            .field("default_interval", &self.default_interval)
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let limiter = HostRateLimiter::new(Duration::from_millis(500), HashMap::new());
        let start = Instant::now();
        limiter.until_ready("catalog").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_second_call_waits_for_interval() {
        let limiter = HostRateLimiter::new(Duration::from_millis(200), HashMap::new());
        limiter.until_ready("catalog").await;

        let start = Instant::now();
        limiter.until_ready("catalog").await;
        // Allow some slack for clock granularity
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_hosts_are_independent() {
        let limiter = HostRateLimiter::new(Duration::from_millis(500), HashMap::new());
        limiter.until_ready("catalog").await;

        let start = Instant::now();
        limiter.until_ready("anilist").await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_overrides_and_disabled() {
        let mut overrides = HashMap::new();
        overrides.insert("anilist".to_string(), Duration::from_millis(700));
        let limiter = HostRateLimiter::new(Duration::from_millis(250), overrides);
        assert_eq!(limiter.interval_for("anilist"), Duration::from_millis(700));
        assert_eq!(limiter.interval_for("catalog"), Duration::from_millis(250));

        let disabled = HostRateLimiter::disabled();
        let start = Instant::now();
        for _ in 0..5 {
            disabled.until_ready("catalog").await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
