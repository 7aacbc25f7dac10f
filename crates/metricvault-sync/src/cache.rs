//! Query cache with TTL expiration and LRU eviction.
//!
//! Caches the result of a multi-project fetch keyed by the request shape.
//! The cache is owned by its caller and **not internally synchronized**;
//! wrap it in a `Mutex` for shared use. Statistics (hits, misses,
//! evictions) are emitted as `tracing::info` fields.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use metricvault_core::CacheConfig;

/// Configuration for the query cache.
#[derive(Clone, Debug)]
pub struct QueryCacheConfig {
    /// Time-to-live for cache entries (default: 300 seconds).
    pub ttl: Duration,
    /// Maximum number of entries in the cache (default: 256).
    pub max_entries: usize,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for QueryCacheConfig {
    fn from(config: &CacheConfig) -> Self {
        Self {
            ttl: config.ttl(),
            max_entries: config.max_entries(),
        }
    }
}

/// The shape of a fetch request. Project order and duplicates do not matter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QueryKey {
    projects: Vec<String>,
    days: u32,
    branch: Option<String>,
}

impl QueryKey {
    pub fn new<S: AsRef<str>>(projects: &[S], days: u32, branch: Option<&str>) -> Self {
        let mut projects: Vec<String> = projects.iter().map(|p| p.as_ref().to_string()).collect();
        projects.sort();
        projects.dedup();
        Self {
            projects,
            days,
            branch: branch.filter(|b| !b.is_empty()).map(str::to_string),
        }
    }
}

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    last_accessed: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V) -> Self {
        let now = Instant::now();
        Self {
            value,
            inserted_at: now,
            last_accessed: now,
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }
}

/// Accumulated cache statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct QueryCache<V> {
    entries: HashMap<QueryKey, CacheEntry<V>>,
    config: QueryCacheConfig,
    stats: CacheStats,
}

impl<V> QueryCache<V> {
    pub fn new(config: QueryCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Look up a request. Expired entries are removed and count as misses.
    pub fn get(&mut self, key: &QueryKey) -> Option<&V> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(self.config.ttl),
            None => {
                self.stats.misses += 1;
                self.log("query cache miss");
                return None;
            }
        };
        if expired {
            self.entries.remove(key);
            self.stats.misses += 1;
            self.log("query cache miss (expired)");
            return None;
        }

        self.stats.hits += 1;
        self.log("query cache hit");
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = Instant::now();
        Some(&entry.value)
    }

    /// Insert or replace an entry, evicting the least recently used one
    /// when full.
    pub fn insert(&mut self, key: QueryKey, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.evict_lru();
        }
        self.entries.insert(key, CacheEntry::new(value));
    }

    /// Drop every entry. Statistics are kept.
    pub fn invalidate_all(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        tracing::info!(dropped, "query cache invalidated");
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            tracing::info!(
                evicted_projects = ?key.projects,
                cache_evictions = self.stats.evictions,
                "query cache LRU eviction"
            );
        }
    }

    fn log(&self, message: &'static str) {
        tracing::info!(
            cache_hits = self.stats.hits,
            cache_misses = self.stats.misses,
            cache_evictions = self.stats.evictions,
            "{message}"
        );
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
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
    use std::thread;

    fn key(projects: &[&str]) -> QueryKey {
        QueryKey::new(projects, 30, None)
    }

    // ── Keys ─────────────────────────────────────────────────────────

    #[test]
    fn project_order_does_not_matter() {
        assert_eq!(key(&["b", "a"]), key(&["a", "b", "a"]));
        assert_ne!(key(&["a"]), QueryKey::new(&["a"], 7, None));
        assert_ne!(key(&["a"]), QueryKey::new(&["a"], 30, Some("dev")));
        assert_eq!(key(&["a"]), QueryKey::new(&["a"], 30, Some("")));
    }

    #[test]
    fn default_config_values() {
        let config = QueryCacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.max_entries, 256);
    }

    // ── Insert and Get ───────────────────────────────────────────────

    #[test]
    fn insert_and_get() {
        let mut cache = QueryCache::new(QueryCacheConfig::default());
        cache.insert(key(&["a"]), 1);

        assert_eq!(cache.get(&key(&["a"])), Some(&1));
        assert_eq!(cache.get(&key(&["b"])), None);
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut cache = QueryCache::new(QueryCacheConfig::default());
        cache.insert(key(&["a"]), 1);
        cache.insert(key(&["a"]), 2);
        assert_eq!(cache.get(&key(&["a"])), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    // ── TTL Expiration ───────────────────────────────────────────────

    #[test]
    fn entry_expires_after_ttl() {
        let mut cache = QueryCache::new(QueryCacheConfig {
            ttl: Duration::from_millis(50),
            max_entries: 8,
        });
        cache.insert(key(&["a"]), 1);
        assert!(cache.get(&key(&["a"])).is_some());

        thread::sleep(Duration::from_millis(80));

        assert!(cache.get(&key(&["a"])).is_none());
        assert!(cache.is_empty());
    }

    // ── LRU Eviction ─────────────────────────────────────────────────

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mut cache = QueryCache::new(QueryCacheConfig {
            ttl: Duration::from_secs(30),
            max_entries: 2,
        });
        cache.insert(key(&["a"]), 1);
        thread::sleep(Duration::from_millis(2));
        cache.insert(key(&["b"]), 2);
        thread::sleep(Duration::from_millis(2));
        // Touch "a" so "b" becomes the eviction candidate.
        cache.get(&key(&["a"]));
        thread::sleep(Duration::from_millis(2));

        cache.insert(key(&["c"]), 3);

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(&["a"])).is_some());
        assert!(cache.get(&key(&["b"])).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    // ── Invalidation ─────────────────────────────────────────────────

    #[test]
    fn invalidate_all_empties_the_cache() {
        let mut cache = QueryCache::new(QueryCacheConfig::default());
        cache.insert(key(&["a"]), 1);
        cache.insert(key(&["b"]), 2);

        cache.invalidate_all();

        assert!(cache.is_empty());
        assert!(cache.get(&key(&["a"])).is_none());
    }
}
