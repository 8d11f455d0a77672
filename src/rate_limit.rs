use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Fixed-window request counter keyed by caller address.
///
/// Owned by `AppState` and injected into the public-API handler; there is no
/// process-global state. Expired buckets are replaced on access, and
/// `max_entries` is a hard cap: a new caller first sweeps expired buckets
/// and then, if the table is still full, evicts the one closest to expiry.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    max_entries: usize,
    buckets: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    count: u32,
    expires_at: Instant,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            max_entries: 10_000,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Records one request from `key` and reports whether it is within quota.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");

        if let Some(bucket) = buckets.get_mut(key) {
            if bucket.expires_at > now {
                if bucket.count >= self.limit {
                    return false;
                }
                bucket.count += 1;
                return true;
            }
            // Window over: start a fresh one in place.
            bucket.count = 1;
            bucket.expires_at = now + self.window;
            return true;
        }

        if buckets.len() >= self.max_entries {
            buckets.retain(|_, bucket| bucket.expires_at > now);
        }
        if buckets.len() >= self.max_entries {
            // Still full of live buckets: the soonest to expire makes room.
            let evict = buckets
                .iter()
                .min_by_key(|(_, bucket)| bucket.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(evict) = evict {
                buckets.remove(&evict);
            }
        }

        buckets.insert(
            key.to_string(),
            Bucket {
                count: 1,
                expires_at: now + self.window,
            },
        );
        true
    }
}
