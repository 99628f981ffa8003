//! Caches injected into the query engine.
//!
//! Both caches tolerate races: two queries may compute the same entry and the
//! last write wins. Swapping in the no-op variants never changes results.
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use termdb_core::types::{ShardKey, ShardRef};
use termdb_shard::layout::stable_hash;

pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Entry count at which an insert first sweeps expired entries.
pub const SWEEP_THRESHOLD: usize = 1024;

/// Best distance from a token to a title's words, plus the derived similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenDistance {
    /// `None` when no title word was close enough in length to compare.
    pub distance: Option<usize>,
    pub similarity: f64,
}

pub trait TokenCache: Send + Sync {
    /// Cached distance for `(token, title)`, computing and storing it on a miss.
    fn get(&self, token: &str, title: &str, compute: &mut dyn FnMut() -> TokenDistance) -> TokenDistance;
    fn forget(&self, token: &str, title: &str);
    fn flush(&self);
}

/// Always misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTokenCache;

impl TokenCache for NoopTokenCache {
    fn get(&self, _token: &str, _title: &str, compute: &mut dyn FnMut() -> TokenDistance) -> TokenDistance { compute() }
    fn forget(&self, _token: &str, _title: &str) {}
    fn flush(&self) {}
}

struct Expiring<T> {
    at: Instant,
    value: T,
}

impl<T> Expiring<T> {
    fn new(value: T) -> Self { Self { at: Instant::now(), value } }
    fn fresh(&self, ttl: Duration) -> bool { self.at.elapsed() < ttl }
}

/// TTL map that drops expired entries whenever it doubles past its last sweep.
struct ExpiringMap<K, V> {
    entries: HashMap<K, Expiring<V>>,
    sweep_at: usize,
}

impl<K: Eq + Hash, V> ExpiringMap<K, V> {
    fn new() -> Self { Self { entries: HashMap::new(), sweep_at: SWEEP_THRESHOLD } }

    fn get(&self, key: &K, ttl: Duration) -> Option<&V> {
        self.entries.get(key).filter(|e| e.fresh(ttl)).map(|e| &e.value)
    }

    fn insert(&mut self, key: K, value: V, ttl: Duration) {
        if self.entries.len() >= self.sweep_at {
            let before = self.entries.len();
            self.entries.retain(|_, e| e.fresh(ttl));
            self.sweep_at = (self.entries.len() * 2).max(SWEEP_THRESHOLD);
            tracing::debug!(before, after = self.entries.len(), "swept expired cache entries");
        }
        self.entries.insert(key, Expiring::new(value));
    }
}

/// In-process token cache with a fixed time to live.
pub struct MemoryTokenCache {
    ttl: Duration,
    entries: Mutex<ExpiringMap<(String, String), TokenDistance>>,
}

impl Default for MemoryTokenCache {
    fn default() -> Self { Self::new(DEFAULT_TTL) }
}

impl MemoryTokenCache {
    pub fn new(ttl: Duration) -> Self { Self { ttl, entries: Mutex::new(ExpiringMap::new()) } }

    pub fn len(&self) -> usize { self.entries.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, token: &str, title: &str, compute: &mut dyn FnMut() -> TokenDistance) -> TokenDistance {
        let key = (token.to_string(), title.to_string());
        if let Some(hit) = self.entries.lock().get(&key, self.ttl) {
            return *hit;
        }
        let value = compute();
        self.entries.lock().insert(key, value, self.ttl);
        value
    }

    fn forget(&self, token: &str, title: &str) {
        self.entries.lock().entries.remove(&(token.to_string(), title.to_string()));
    }

    fn flush(&self) { self.entries.lock().entries.clear(); }
}

/// Minimal contract of an external key-value store (Redis, memcached, ...).
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
    fn flush(&self) -> anyhow::Result<()>;
}

/// Token cache backed by a [`KvStore`]. Store failures degrade to misses.
pub struct KvTokenCache<S> {
    store: S,
    ttl: Duration,
}

impl<S: KvStore> KvTokenCache<S> {
    pub fn new(store: S, ttl: Duration) -> Self { Self { store, ttl } }

    pub fn store(&self) -> &S { &self.store }

    pub fn key(token: &str, title: &str) -> String {
        format!("token_cache|{:016x}", stable_hash(format!("{token}|{title}").as_bytes()))
    }
}

impl<S: KvStore> TokenCache for KvTokenCache<S> {
    fn get(&self, token: &str, title: &str, compute: &mut dyn FnMut() -> TokenDistance) -> TokenDistance {
        let key = Self::key(token, title);
        match self.store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => return value,
                Err(e) => tracing::debug!(key = %key, error = %e, "discarding undecodable cache entry"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(key = %key, error = %e, "token cache read failed"),
        }
        let value = compute();
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&key, raw, self.ttl) {
                    tracing::warn!(key = %key, error = %e, "token cache write failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "token distance not serializable"),
        }
        value
    }

    fn forget(&self, token: &str, title: &str) {
        if let Err(e) = self.store.delete(&Self::key(token, title)) {
            tracing::warn!(error = %e, "token cache delete failed");
        }
    }

    fn flush(&self) {
        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "token cache flush failed");
        }
    }
}

/// Complete (unsampled) reference lists per partition and shard key.
pub trait ShardCache: Send + Sync {
    fn get(&self, partition: &str, key: &ShardKey) -> Option<Arc<Vec<ShardRef>>>;
    fn put(&self, partition: &str, key: &ShardKey, refs: Arc<Vec<ShardRef>>);
    /// Drops the given keys, typically the set a rebuild reported.
    fn invalidate(&self, partition: &str, keys: &BTreeSet<ShardKey>);
    /// Drops every entry of a partition.
    fn invalidate_partition(&self, partition: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopShardCache;

impl ShardCache for NoopShardCache {
    fn get(&self, _partition: &str, _key: &ShardKey) -> Option<Arc<Vec<ShardRef>>> { None }
    fn put(&self, _partition: &str, _key: &ShardKey, _refs: Arc<Vec<ShardRef>>) {}
    fn invalidate(&self, _partition: &str, _keys: &BTreeSet<ShardKey>) {}
    fn invalidate_partition(&self, _partition: &str) {}
}

pub struct MemoryShardCache {
    ttl: Duration,
    entries: Mutex<ExpiringMap<(String, ShardKey), Arc<Vec<ShardRef>>>>,
}

impl Default for MemoryShardCache {
    fn default() -> Self { Self::new(DEFAULT_TTL) }
}

impl MemoryShardCache {
    pub fn new(ttl: Duration) -> Self { Self { ttl, entries: Mutex::new(ExpiringMap::new()) } }

    pub fn len(&self) -> usize { self.entries.lock().entries.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl ShardCache for MemoryShardCache {
    fn get(&self, partition: &str, key: &ShardKey) -> Option<Arc<Vec<ShardRef>>> {
        let mut map = self.entries.lock();
        let k = (partition.to_string(), key.clone());
        if let Some(refs) = map.get(&k, self.ttl) {
            return Some(Arc::clone(refs));
        }
        map.entries.remove(&k);
        None
    }

    fn put(&self, partition: &str, key: &ShardKey, refs: Arc<Vec<ShardRef>>) {
        self.entries.lock().insert((partition.to_string(), key.clone()), refs, self.ttl);
    }

    fn invalidate(&self, partition: &str, keys: &BTreeSet<ShardKey>) {
        let mut map = self.entries.lock();
        for key in keys {
            map.entries.remove(&(partition.to_string(), key.clone()));
        }
    }

    fn invalidate_partition(&self, partition: &str) {
        self.entries.lock().entries.retain(|(p, _), _| p != partition);
    }
}
