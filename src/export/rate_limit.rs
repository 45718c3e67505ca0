use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

/// Outcome of a rate-limit check. `ms_before_next` is 0 when allowed,
/// otherwise the wait until one token will be available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateDecision {
    pub allowed: bool,
    pub ms_before_next: u64,
}

impl RateDecision {
    fn allow() -> Self {
        RateDecision {
            allowed: true,
            ms_before_next: 0,
        }
    }

    fn deny(ms_before_next: u64) -> Self {
        RateDecision {
            allowed: false,
            ms_before_next,
        }
    }
}

/// Rate limiting seam. The in-process implementation below is per-instance
/// state; a deployment spanning multiple instances would swap in a shared
/// backend here without touching the pipeline.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Try to consume one token for `key`.
    async fn check(&self, key: &str) -> RateDecision;
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket limiter over an in-memory map. Buckets start full, refill
/// continuously, and are created on first use per key.
pub struct TokenBucketLimiter {
    capacity: f64,
    refill_per_sec: f64,
    buckets: DashMap<String, Bucket>,
}

impl TokenBucketLimiter {
    pub fn per_hour(max_per_hour: u32) -> Self {
        TokenBucketLimiter {
            capacity: max_per_hour as f64,
            refill_per_sec: max_per_hour as f64 / 3600.0,
            buckets: DashMap::new(),
        }
    }

    /// Drop buckets that have not been touched within `max_idle`. An idle
    /// bucket has refilled to capacity, so recreating it later is lossless.
    pub fn prune_idle(&self, max_idle: Duration) {
        self.buckets
            .retain(|_, bucket| bucket.last_refill.elapsed() < max_idle);
    }

    #[cfg(test)]
    fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[async_trait]
impl RateLimiter for TokenBucketLimiter {
    async fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                tokens: self.capacity,
                last_refill: now,
            });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            RateDecision::allow()
        } else {
            let deficit = 1.0 - bucket.tokens;
            let ms = (deficit / self.refill_per_sec * 1000.0).ceil() as u64;
            RateDecision::deny(ms.max(1))
        }
    }
}
