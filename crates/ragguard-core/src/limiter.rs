//! Per-client fixed-window admission control
//!
//! Buckets live in process memory, so the limits hold per instance only.
//! Horizontally scaled deployments need a shared store behind the same
//! [`RateLimiter::admit`] contract.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `remaining` tokens are left in the current window
    Allowed { remaining: u32 },
    /// Bucket exhausted; the window resets after `retry_after`
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allowed { remaining } => *remaining,
            Self::Denied { .. } => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitBucket {
    remaining_tokens: u32,
    window_start: Instant,
}

/// Fixed-window counter keyed by client id
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, RateLimitBucket>>,
    capacity: u32,
    window: Duration,
}

impl RateLimiter {
    /// `capacity` requests per `window` for every client
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity,
            window,
        }
    }

    pub fn admit(&self, client_id: &str) -> Admission {
        self.admit_at(client_id, Instant::now())
    }

    /// Check-and-decrement for `client_id` as of `now`, in one critical section
    pub fn admit_at(&self, client_id: &str, now: Instant) -> Admission {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());

        let bucket = buckets
            .entry(client_id.to_string())
            .or_insert_with(|| RateLimitBucket {
                remaining_tokens: self.capacity,
                window_start: now,
            });

        if now.saturating_duration_since(bucket.window_start) >= self.window {
            bucket.remaining_tokens = self.capacity;
            bucket.window_start = now;
        }

        if bucket.remaining_tokens == 0 {
            let elapsed = now.saturating_duration_since(bucket.window_start);
            return Admission::Denied {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        bucket.remaining_tokens -= 1;
        Admission::Allowed {
            remaining: bucket.remaining_tokens,
        }
    }

    /// Tokens left for `client_id` without consuming one
    pub fn remaining(&self, client_id: &str) -> u32 {
        self.remaining_at(client_id, Instant::now())
    }

    pub fn remaining_at(&self, client_id: &str, now: Instant) -> u32 {
        let buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        match buckets.get(client_id) {
            Some(bucket) if now.saturating_duration_since(bucket.window_start) < self.window => {
                bucket.remaining_tokens
            }
            _ => self.capacity,
        }
    }

    /// Drop buckets whose window ended more than `idle` ago. Returns how many were removed.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        self.evict_idle_at(idle, Instant::now())
    }

    pub fn evict_idle_at(&self, idle: Duration, now: Instant) -> usize {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let before = buckets.len();
        let horizon = self.window + idle;
        buckets.retain(|_, b| now.saturating_duration_since(b.window_start) < horizon);
        before - buckets.len()
    }

    /// Number of tracked clients
    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_admits_exactly_capacity() {
        let limiter = RateLimiter::new(10, Duration::from_secs(60));
        let t0 = Instant::now();

        for i in 0..10 {
            let admission = limiter.admit_at("10.0.0.1", t0 + Duration::from_secs(i));
            assert_eq!(admission, Admission::Allowed { remaining: 9 - i as u32 });
        }

        let denied = limiter.admit_at("10.0.0.1", t0 + Duration::from_secs(20));
        assert_eq!(
            denied,
            Admission::Denied {
                retry_after: Duration::from_secs(40)
            }
        );
        assert_eq!(denied.remaining(), 0);
    }

    #[test]
    fn test_denial_consumes_nothing_and_window_resets() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.admit_at("c", t0);
        limiter.admit_at("c", t0);
        for _ in 0..5 {
            assert!(!limiter.admit_at("c", t0 + Duration::from_secs(1)).is_allowed());
        }

        let after = t0 + Duration::from_secs(60);
        assert_eq!(limiter.remaining_at("c", after), 2);
        assert_eq!(limiter.admit_at("c", after), Admission::Allowed { remaining: 1 });
    }

    #[test]
    fn test_clients_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(limiter.admit_at("a", t0).is_allowed());
        assert!(!limiter.admit_at("a", t0).is_allowed());
        assert!(limiter.admit_at("b", t0).is_allowed());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_evict_idle() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();
        limiter.admit_at("old", t0);
        limiter.admit_at("fresh", t0 + Duration::from_secs(600));

        let removed = limiter.evict_idle_at(Duration::from_secs(300), t0 + Duration::from_secs(620));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);
        assert_eq!(limiter.remaining_at("fresh", t0 + Duration::from_secs(620)), 2);
    }

    #[test]
    fn test_concurrent_admission_never_overshoots() {
        let limiter = Arc::new(RateLimiter::new(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.admit("shared").is_allowed()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }

    proptest! {
        #[test]
        fn prop_admits_min_of_requests_and_capacity(capacity in 1u32..40, requests in 0usize..100) {
            let limiter = RateLimiter::new(capacity, Duration::from_secs(60));
            let t0 = Instant::now();
            let admitted = (0..requests)
                .filter(|_| limiter.admit_at("client", t0).is_allowed())
                .count();
            prop_assert_eq!(admitted, requests.min(capacity as usize));
        }
    }
}
