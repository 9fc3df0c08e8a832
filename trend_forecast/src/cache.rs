//! Time-boxed memoization of forecast responses
//!
//! Entries are evicted lazily on lookup; there is no background sweeper.

use crate::payload::ForecastResponse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default time-to-live of a cached response
pub const DEFAULT_TTL: Duration = Duration::from_millis(120_000);

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Clock that only moves when told to
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Cached server response
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: ForecastResponse,
    pub cached_at: u64,
}

/// In-memory cache keyed by topic and period
pub struct ForecastCache {
    ttl: Duration,
    fold_case: bool,
    clock: Arc<dyn Clock>,
    entries: HashMap<String, CacheEntry>,
}

impl std::fmt::Debug for ForecastCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastCache")
            .field("ttl", &self.ttl)
            .field("fold_case", &self.fold_case)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl ForecastCache {
    /// Create a cache using the system clock
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create a cache with an explicit clock
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            fold_case: true,
            clock,
            entries: HashMap::new(),
        }
    }

    /// Whether topics differing only in case share an entry
    pub fn with_case_folding(mut self, fold_case: bool) -> Self {
        self.fold_case = fold_case;
        self
    }

    /// Composite key for `topic` and `period`
    pub fn key(&self, topic: &str, period: &str) -> String {
        let topic = topic.trim();
        if self.fold_case {
            format!("{}::{}", topic.to_lowercase(), period)
        } else {
            format!("{}::{}", topic, period)
        }
    }

    /// Cached payload for `key`, evicting it if older than the TTL
    pub fn get(&mut self, key: &str) -> Option<ForecastResponse> {
        let now = self.clock.now_millis();
        let ttl = self.ttl.as_millis() as u64;

        let expired = match self.entries.get(key) {
            Some(entry) => now.saturating_sub(entry.cached_at) > ttl,
            None => {
                debug!(key, "Cache miss");
                return None;
            }
        };

        if expired {
            debug!(key, "Cache entry expired, evicting");
            self.entries.remove(key);
            return None;
        }

        debug!(key, "Cache hit");
        self.entries.get(key).map(|entry| entry.payload.clone())
    }

    /// Store `payload` under `key`, replacing any previous entry
    pub fn set(&mut self, key: &str, payload: ForecastResponse) {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            cached_at: self.clock.now_millis(),
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(text: &str) -> ForecastResponse {
        ForecastResponse {
            previsao: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_ttl_expiry() {
        let clock = ManualClock::new(1_000);
        let mut cache = ForecastCache::with_clock(DEFAULT_TTL, Arc::new(clock.clone()));
        let key = cache.key("energia", "7d");

        cache.set(&key, payload("a"));

        clock.advance(Duration::from_millis(119_999));
        assert_eq!(cache.get(&key), Some(payload("a")));

        clock.advance(Duration::from_millis(2));
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let clock = ManualClock::new(0);
        let mut cache = ForecastCache::with_clock(DEFAULT_TTL, Arc::new(clock.clone()));

        cache.set("k", payload("old"));
        clock.advance(Duration::from_millis(100_000));
        cache.set("k", payload("new"));
        clock.advance(Duration::from_millis(100_000));

        // The overwrite reset the timestamp
        assert_eq!(cache.get("k"), Some(payload("new")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_key_case_folding() {
        let cache = ForecastCache::new(DEFAULT_TTL);
        assert_eq!(cache.key(" Energia ", "7d"), cache.key("energia", "7d"));
        assert_ne!(cache.key("energia", "7d"), cache.key("energia", "30d"));

        let cache = ForecastCache::new(DEFAULT_TTL).with_case_folding(false);
        assert_ne!(cache.key("Energia", "7d"), cache.key("energia", "7d"));
    }
}
