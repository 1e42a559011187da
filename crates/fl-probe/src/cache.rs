//! TTL cache for probe outcomes.
//!
//! Entries are keyed by the sorted candidate list plus the probe flags and
//! expire after a fixed time-to-live measured on an injected [`Clock`]. An
//! entry may record that every candidate failed (`None`); that outcome is
//! reused for the full TTL too.
//!
//! [`Clock`]: fl_core::Clock

use std::time::{Duration, Instant};

use fl_core::{ConnectionResult, FxHashMap, SharedClock, fx_hash_map};
use parking_lot::Mutex;

/// Identifies one probe request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hosts: Vec<String>,
    filter_out_bad: bool,
    use_ipv6: bool,
}

impl CacheKey {
    /// Builds a key; candidate order does not matter.
    #[must_use]
    pub fn new<S: AsRef<str>>(hosts: &[S], filter_out_bad: bool, use_ipv6: bool) -> Self {
        let mut hosts: Vec<String> = hosts.iter().map(|h| h.as_ref().to_owned()).collect();
        hosts.sort_unstable();
        Self {
            hosts,
            filter_out_bad,
            use_ipv6,
        }
    }
}

/// A probe outcome as stored in the cache.
pub type CachedProbe = Option<ConnectionResult>;

#[derive(Debug)]
struct Entry {
    result: CachedProbe,
    inserted_at: Instant,
}

/// Probe results with a fixed time-to-live.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use fl_core::{ConnectionResult, ManualClock, SharedClock};
/// use fl_probe::{CacheKey, ConnectionCache};
///
/// let clock = Arc::new(ManualClock::new());
/// let cache = ConnectionCache::new(Duration::from_secs(60), Arc::clone(&clock) as SharedClock);
/// let key = CacheKey::new(&["https://a.example"], true, true);
///
/// cache.insert(key.clone(), None);
/// assert_eq!(cache.get(&key), Some(None));
///
/// clock.advance(Duration::from_secs(60));
/// assert_eq!(cache.get(&key), None);
/// ```
#[derive(Debug)]
pub struct ConnectionCache {
    entries: Mutex<FxHashMap<CacheKey, Entry>>,
    ttl: Duration,
    clock: SharedClock,
}

impl ConnectionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(ttl: Duration, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(fx_hash_map()),
            ttl,
            clock,
        }
    }

    /// Returns the cached outcome for `key`, if still fresh.
    ///
    /// The outer `Option` is the hit/miss; the inner one is the outcome,
    /// which may itself be "all candidates failed". Expired entries are
    /// evicted.
    pub fn get(&self, key: &CacheKey) -> Option<CachedProbe> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let fresh = entries
            .get(key)
            .map(|entry| now.saturating_duration_since(entry.inserted_at) < self.ttl)?;

        if fresh {
            entries.get(key).map(|entry| entry.result.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    /// Stores `result` for `key`, replacing any previous entry.
    pub fn insert(&self, key: CacheKey, result: CachedProbe) {
        let inserted_at = self.clock.now();
        self.entries.lock().insert(
            key,
            Entry {
                result,
                inserted_at,
            },
        );
    }

    /// Returns the number of stored entries, fresh or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
