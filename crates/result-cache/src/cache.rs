//! TTL Cache Implementation

use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds (default: 10)
    pub ttl_secs: u64,
    /// Entry count above which expired entries are swept on insert
    pub sweep_threshold: usize,
    /// Hard bound on entries; least recently used are evicted beyond it
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10,
            sweep_threshold: 256,
            capacity: 4096,
        }
    }
}

/// How a `get_or_try_fetch` call was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Served from an unexpired entry
    Hit,
    /// Fetched by this caller
    Miss,
    /// Waited on another caller's fetch for the same key
    Coalesced,
}

impl Lookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Hit => "hit",
            Lookup::Miss => "miss",
            Lookup::Coalesced => "coalesced",
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Bounded TTL cache shared by concurrent request handlers
pub struct ResultCache<K, V> {
    entries: Mutex<LruCache<K, Entry<V>>>,
    inflight: Mutex<HashMap<K, Gate>>,
    ttl: Duration,
    sweep_threshold: usize,
}

impl<K, V> ResultCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(config.ttl_secs),
            sweep_threshold: config.sweep_threshold,
        }
    }

    /// Default TTL applied by `get_or_try_fetch`
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Unexpired value for the key
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries();
        let now = Instant::now();
        entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone())
    }

    /// Store a value, sweeping expired entries once the cache grows past its threshold
    pub fn put(&self, key: K, value: V, ttl: Duration) {
        let mut entries = self.entries();
        entries.put(
            key,
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        if entries.len() > self.sweep_threshold {
            let swept = Self::sweep(&mut entries);
            debug!("Swept {} expired cache entries", swept);
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        Self::sweep(&mut self.entries())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached value, or the result of `fetch` stored under the default TTL.
    ///
    /// Concurrent misses for one key run `fetch` once; the other callers wait
    /// and read the stored value. Errors are returned but never cached.
    pub async fn get_or_try_fetch<F, Fut, E>(&self, key: &K, fetch: F) -> Result<(V, Lookup), E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok((value, Lookup::Hit));
        }

        let flight = Flight::join(&self.inflight, key);
        let _turn = flight.gate.lock().await;
        if let Some(value) = self.get(key) {
            return Ok((value, Lookup::Coalesced));
        }

        let value = fetch().await?;
        self.put(key.clone(), value.clone(), self.ttl);
        Ok((value, Lookup::Miss))
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sweep(entries: &mut LruCache<K, Entry<V>>) -> usize {
        let now = Instant::now();
        let expired: Vec<K> = entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }
}

/// Membership in a key's in-flight group; the last member out removes the gate
struct Flight<'a, K: Hash + Eq + Clone> {
    inflight: &'a Mutex<HashMap<K, Gate>>,
    key: K,
    gate: Gate,
}

impl<'a, K: Hash + Eq + Clone> Flight<'a, K> {
    fn join(inflight: &'a Mutex<HashMap<K, Gate>>, key: &K) -> Self {
        let gate = inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.clone())
            .or_default()
            .clone();
        Self {
            inflight,
            key: key.clone(),
            gate,
        }
    }
}

impl<K: Hash + Eq + Clone> Drop for Flight<'_, K> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // map + this member
        if Arc::strong_count(&self.gate) <= 2 {
            inflight.remove(&self.key);
        }
    }
}
