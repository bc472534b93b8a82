//! Result cache for device calls.
//!
//! The device is slow and easily overloaded, so every raw call result is kept
//! per logical call signature for at least the descriptor's TTL. Each protocol
//! family gets its own `ResultCache` instance (its namespace) with its own
//! pair of hit/miss counters.

use ahash::AHashMap as HashMap;
use prometheus::IntCounter;
use std::fmt;
use std::sync::Arc;

use crate::clock::Clock;

/// Protocol family owning a cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// UPnP/TR-064 action calls.
    Upnp,
    /// Authenticated Lua page fetches.
    Lua,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Upnp => "UPNP",
            Namespace::Lua => "LUA",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a result came from the cache or was fetched from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Cached,
    Loaded,
}

/// A single cached call result with the time it was fetched.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub timestamp: i64,
    pub result: Option<Arc<V>>,
}

impl<V> Default for CacheEntry<V> {
    fn default() -> Self {
        Self {
            timestamp: 0,
            result: None,
        }
    }
}

/// Hit/miss counters for one namespace.
#[derive(Clone)]
pub struct CacheCounters {
    pub cached: IntCounter,
    pub loaded: IntCounter,
}

/// Fetch-or-return cache keyed by call signature.
pub struct ResultCache<V> {
    namespace: Namespace,
    entries: HashMap<String, CacheEntry<V>>,
    clock: Arc<dyn Clock>,
    counters: CacheCounters,
}

impl<V> ResultCache<V> {
    pub fn new(namespace: Namespace, clock: Arc<dyn Clock>, counters: CacheCounters) -> Self {
        Self {
            namespace,
            entries: HashMap::new(),
            clock,
            counters,
        }
    }

    /// Returns the cached result for `key` if it is at most `ttl_secs` old,
    /// otherwise calls `fetch` and stores its result.
    ///
    /// A failed fetch stores nothing and leaves the timestamp untouched, so
    /// the next call for the same key fetches again.
    pub fn fetch_or_return<E, F>(
        &mut self,
        key: &str,
        ttl_secs: i64,
        fetch: F,
    ) -> Result<(Arc<V>, CacheOutcome), E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let now = self.clock.now_secs();
        let entry = self.entries.entry(key.to_string()).or_default();

        if now - entry.timestamp > ttl_secs {
            entry.result = None;
        }

        if let Some(result) = &entry.result {
            self.counters.cached.inc();
            tracing::trace!(namespace = %self.namespace, key, "result served from cache");
            return Ok((Arc::clone(result), CacheOutcome::Cached));
        }

        let data = Arc::new(fetch()?);
        entry.timestamp = now;
        entry.result = Some(Arc::clone(&data));
        self.counters.loaded.inc();
        tracing::debug!(namespace = %self.namespace, key, "result loaded from device");

        Ok((data, CacheOutcome::Loaded))
    }

    /// Drops the stored result for `key`; the entry itself stays.
    pub fn invalidate(&mut self, key: &str) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.result = None;
        }
    }

    pub fn entry(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::cell::Cell;

    fn counters() -> CacheCounters {
        CacheCounters {
            cached: IntCounter::new("test_cached", "cached").unwrap(),
            loaded: IntCounter::new("test_loaded", "loaded").unwrap(),
        }
    }

    fn cache(clock: Arc<ManualClock>) -> ResultCache<u64> {
        ResultCache::new(Namespace::Upnp, clock, counters())
    }

    #[test]
    fn test_fresh_entry_is_not_refetched() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut cache = cache(clock.clone());
        let calls = Cell::new(0);
        let fetch = || -> Result<u64, String> {
            calls.set(calls.get() + 1);
            Ok(7)
        };

        let (v, outcome) = cache.fetch_or_return("svc|act", 30, fetch).unwrap();
        assert_eq!((*v, outcome), (7, CacheOutcome::Loaded));

        // exactly at the TTL boundary the entry is still fresh
        clock.advance(30);
        let (v, outcome) = cache.fetch_or_return("svc|act", 30, fetch).unwrap();
        assert_eq!((*v, outcome), (7, CacheOutcome::Cached));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.counters.cached.get(), 1);
        assert_eq!(cache.counters.loaded.get(), 1);
    }

    #[test]
    fn test_stale_entry_is_refetched_once() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut cache = cache(clock.clone());
        cache
            .fetch_or_return("k", 30, || Ok::<_, String>(1))
            .unwrap();

        clock.advance(31);
        let calls = Cell::new(0);
        let (v, outcome) = cache
            .fetch_or_return("k", 30, || {
                calls.set(calls.get() + 1);
                Ok::<_, String>(2)
            })
            .unwrap();
        assert_eq!((*v, outcome), (2, CacheOutcome::Loaded));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.entry("k").unwrap().timestamp, 1_031);
    }

    #[test]
    fn test_failed_fetch_is_not_cached() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut cache = cache(clock.clone());
        cache
            .fetch_or_return("k", 30, || Ok::<_, String>(1))
            .unwrap();
        clock.advance(60);

        let err = cache
            .fetch_or_return("k", 30, || Err::<u64, _>("boom".to_string()))
            .unwrap_err();
        assert_eq!(err, "boom");
        let entry = cache.entry("k").unwrap();
        assert_eq!(entry.timestamp, 1_000);
        assert!(entry.result.is_none());

        // no negative caching: the very next call fetches again
        let (v, outcome) = cache
            .fetch_or_return("k", 30, || Ok::<_, String>(3))
            .unwrap();
        assert_eq!((*v, outcome), (3, CacheOutcome::Loaded));
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut cache = cache(clock);
        cache
            .fetch_or_return("k", 30, || Ok::<_, String>(1))
            .unwrap();
        cache.invalidate("k");
        let (_, outcome) = cache
            .fetch_or_return("k", 30, || Ok::<_, String>(1))
            .unwrap();
        assert_eq!(outcome, CacheOutcome::Loaded);
        assert_eq!(cache.len(), 1);
    }
}
