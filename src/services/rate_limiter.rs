use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;
use crate::error::ApiError;

#[derive(Debug, Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_update: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens = f64::min(
            self.capacity as f64,
            self.tokens + elapsed * self.refill_rate,
        );
        self.last_update = now;
    }

    fn allow_request(&mut self, tokens: u32) -> bool {
        self.refill(Instant::now());

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }

    /// Seconds until one token is available again
    fn retry_after(&self) -> u64 {
        if self.refill_rate <= 0.0 {
            return 60;
        }
        let missing = (1.0 - self.tokens).max(0.0);
        (missing / self.refill_rate).ceil().max(1.0) as u64
    }

    fn is_full(&self, now: Instant) -> bool {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.tokens + elapsed * self.refill_rate >= self.capacity as f64
    }
}

/// Per-user token bucket guarding bid bursts
#[derive(Clone)]
pub struct BidRateLimiter {
    buckets: Arc<DashMap<i64, Bucket>>,
    config: RateLimitConfig,
}

impl BidRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn check(&self, user_id: i64) -> Result<(), ApiError> {
        let mut bucket = self
            .buckets
            .entry(user_id)
            .or_insert_with(|| Bucket::new(self.config.bid_capacity, self.config.bid_refill_per_sec));

        if bucket.allow_request(1) {
            Ok(())
        } else {
            tracing::warn!(user_id = user_id, "Bid rate limit exceeded");
            crate::middleware::metrics::track_rate_limit_hit("bid");
            Err(ApiError::RateLimitExceeded {
                retry_after_seconds: bucket.retry_after(),
            })
        }
    }

    /// Drop buckets that have refilled completely and been idle for `idle`
    pub fn prune(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, b| !(b.is_full(now) && now.duration_since(b.last_update) >= idle));
        before.saturating_sub(self.buckets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_burst_then_limited() {
        let limiter = BidRateLimiter::new(RateLimitConfig {
            bid_capacity: 3,
            bid_refill_per_sec: 0.5,
        });
        for _ in 0..3 {
            assert_ok!(limiter.check(1));
        }
        let err = assert_err!(limiter.check(1));
        assert_eq!(err.error_code(), ErrorCode::RateLimitExceeded);

        // separate users have separate buckets
        assert_ok!(limiter.check(2));
    }

    #[test]
    fn test_prune_keeps_recent_buckets() {
        let limiter = BidRateLimiter::new(RateLimitConfig::default());
        limiter.check(1).unwrap();
        assert_eq!(limiter.prune(Duration::from_secs(300)), 0);
        assert_eq!(limiter.buckets.len(), 1);
    }
}
