//! Shared query-result cache
//!
//! Holds the last fetched result for each query key and tracks whether it is
//! still fresh. Invalidation only flips entries to stale; the next read through
//! `get_or_fetch` goes back to the source.

use crate::{QueryKey, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Capacity of the invalidation notification channel
const NOTIFY_CAPACITY: usize = 256;

/// The single write operation the realtime layer performs on a cache
pub trait CacheClient: Send + Sync {
    /// Mark every entry under `key` stale.
    ///
    /// Returns how many entries went from fresh to stale. Invalidating an
    /// already-stale key returns 0 and changes nothing, unless a fetch for it
    /// is running; that fetch's result is then stored stale.
    fn invalidate(&self, key: &QueryKey) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// One cached result set
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<Value>,
    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
    /// Fresh -> stale transitions applied since the entry was created
    pub invalidations: u64,
}

impl CacheEntry {
    fn fresh(value: Value) -> Self {
        Self {
            value: Arc::new(value),
            freshness: Freshness::Fresh,
            fetched_at: Utc::now(),
            invalidations: 0,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Fetches running for one key
#[derive(Debug, Default)]
struct InFlight {
    fetches: usize,
    /// Bumped by every invalidation that lands while a fetch runs
    generation: u64,
}

/// Process-wide query cache, shared behind an `Arc`
pub struct QueryCache {
    entries: DashMap<QueryKey, CacheEntry, ahash::RandomState>,
    in_flight: DashMap<QueryKey, InFlight, ahash::RandomState>,
    notify: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(NOTIFY_CAPACITY);
        Self {
            entries: DashMap::with_hasher(ahash::RandomState::new()),
            in_flight: DashMap::with_hasher(ahash::RandomState::new()),
            notify,
        }
    }

    /// Store a freshly fetched value, replacing any previous entry
    pub fn insert(&self, key: QueryKey, value: Value) -> Arc<Value> {
        self.store(key, value, Freshness::Fresh)
    }

    fn store(&self, key: QueryKey, value: Value, freshness: Freshness) -> Arc<Value> {
        let invalidations = self.entries.get(&key).map(|e| e.invalidations).unwrap_or(0);
        let mut entry = CacheEntry::fresh(value);
        entry.freshness = freshness;
        entry.invalidations = invalidations;
        let value = entry.value.clone();
        self.entries.insert(key, entry);
        value
    }

    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Missing entries count as stale
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries.get(key).map(|e| e.is_stale()).unwrap_or(true)
    }

    /// Return the cached value, calling `fetch` when it is missing or stale.
    ///
    /// If the key is invalidated while `fetch` runs, the result is still
    /// returned but stored stale, so the next read fetches again.
    pub async fn get_or_fetch<F, Fut>(&self, key: &QueryKey, fetch: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_stale() {
                return Ok(entry.value.clone());
            }
        }

        let pending = PendingFetch::begin(self, key);
        tracing::debug!(key = %key, "Fetching query result");
        let value = fetch().await?;
        Ok(pending.complete(value))
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Receive the key prefix of every invalidation that staled an entry or
    /// interrupted a running fetch
    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.notify.subscribe()
    }
}

/// Registration of one running fetch, released on drop
struct PendingFetch<'a> {
    cache: &'a QueryCache,
    key: &'a QueryKey,
    generation: u64,
}

impl<'a> PendingFetch<'a> {
    fn begin(cache: &'a QueryCache, key: &'a QueryKey) -> Self {
        let mut slot = cache.in_flight.entry(key.clone()).or_default();
        slot.fetches += 1;
        let generation = slot.generation;
        drop(slot);

        Self { cache, key, generation }
    }

    fn complete(self, value: Value) -> Arc<Value> {
        // The slot stays locked while storing: an invalidation either bumped
        // the generation already or will find the stored entry fresh.
        let slot = self.cache.in_flight.get(self.key);
        let superseded = slot.as_ref().is_some_and(|s| s.generation != self.generation);
        let freshness = if superseded {
            tracing::debug!(key = %self.key, "Invalidated during fetch, storing as stale");
            Freshness::Stale
        } else {
            Freshness::Fresh
        };
        let value = self.cache.store(self.key.clone(), value, freshness);
        drop(slot);
        value
    }
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        if let Some(mut slot) = self.cache.in_flight.get_mut(self.key) {
            slot.fetches = slot.fetches.saturating_sub(1);
        }
        self.cache.in_flight.remove_if(self.key, |_, slot| slot.fetches == 0);
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheClient for QueryCache {
    fn invalidate(&self, key: &QueryKey) -> usize {
        let mut interrupted = 0;
        for mut slot in self.in_flight.iter_mut() {
            if key.is_prefix_of(slot.key()) {
                slot.value_mut().generation += 1;
                interrupted += 1;
            }
        }

        let mut staled = 0;

        for mut entry in self.entries.iter_mut() {
            if !key.is_prefix_of(entry.key()) || entry.is_stale() {
                continue;
            }
            let entry = entry.value_mut();
            entry.freshness = Freshness::Stale;
            entry.invalidations += 1;
            staled += 1;
        }

        if staled > 0 || interrupted > 0 {
            tracing::debug!(key = %key, staled, interrupted, "Cache entries invalidated");
            // No receivers is fine: nobody is waiting to refetch.
            let _ = self.notify.send(key.clone());
        }

        staled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot;

    fn key(s: &str) -> QueryKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_invalidate_marks_prefix_stale() {
        let cache = QueryCache::new();
        cache.insert(key("unidades"), json!([1, 2]));
        cache.insert(key("unidades/1"), json!({"id": 1}));
        cache.insert(key("franqueados"), json!([]));

        assert_eq!(cache.invalidate(&key("unidades")), 2);

        assert!(cache.is_stale(&key("unidades")));
        assert!(cache.is_stale(&key("unidades/1")));
        assert!(!cache.is_stale(&key("franqueados")));
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let cache = QueryCache::new();
        cache.insert(key("webhooks"), json!([]));

        assert_eq!(cache.invalidate(&key("webhooks")), 1);
        let after_first = cache.get(&key("webhooks")).unwrap();

        assert_eq!(cache.invalidate(&key("webhooks")), 0);
        let after_second = cache.get(&key("webhooks")).unwrap();

        assert_eq!(after_first.invalidations, 1);
        assert_eq!(after_second.invalidations, 1);
        assert_eq!(after_first.fetched_at, after_second.fetched_at);
    }

    #[test]
    fn test_invalidate_unknown_key_is_noop() {
        let cache = QueryCache::new();
        let mut rx = cache.subscribe_invalidations();

        assert_eq!(cache.invalidate(&key("usuarios")), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notifies_once_per_effective_invalidation() {
        let cache = QueryCache::new();
        let mut rx = cache.subscribe_invalidations();
        cache.insert(key("unidades"), json!([]));

        cache.invalidate(&key("unidades"));
        cache.invalidate(&key("unidades"));

        assert_eq!(rx.try_recv().unwrap(), key("unidades"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_or_fetch_refetches_only_when_stale() {
        let cache = QueryCache::new();
        let k = key("franqueados");

        let first = cache.get_or_fetch(&k, || async { Ok(json!(["a"])) }).await.unwrap();
        assert_eq!(*first, json!(["a"]));

        // Fresh: a failing fetch must not run
        let cached = cache
            .get_or_fetch(&k, || async {
                Err(crate::CoreError::Fetch { key: "franqueados".into(), reason: "ran".into() })
            })
            .await
            .unwrap();
        assert_eq!(*cached, json!(["a"]));

        cache.invalidate(&k);
        let refreshed = cache.get_or_fetch(&k, || async { Ok(json!(["a", "b"])) }).await.unwrap();
        assert_eq!(*refreshed, json!(["a", "b"]));
        assert!(!cache.is_stale(&k));
        assert_eq!(cache.get(&k).unwrap().invalidations, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_keeps_stale_entry() {
        let cache = QueryCache::new();
        let k = key("unidades");
        cache.insert(k.clone(), json!([1]));
        cache.invalidate(&k);

        let result = cache
            .get_or_fetch(&k, || async {
                Err(crate::CoreError::Fetch { key: "unidades".into(), reason: "offline".into() })
            })
            .await;

        assert!(result.is_err());
        assert!(cache.is_stale(&k));
        assert_eq!(*cache.get(&k).unwrap().value, json!([1]));
        assert!(cache.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_invalidation_during_fetch_is_not_lost() {
        let cache = Arc::new(QueryCache::new());
        let k = key("unidades");
        cache.insert(k.clone(), json!([1]));
        cache.invalidate(&k);
        let mut rx = cache.subscribe_invalidations();

        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let fetching = {
            let cache = cache.clone();
            let k = k.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(&k, || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(json!([1, 2]))
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        // Already stale, so nothing flips, but the running fetch is superseded
        assert_eq!(cache.invalidate(&k), 0);
        assert_eq!(rx.try_recv().unwrap(), k);

        release_tx.send(()).unwrap();
        let fetched = fetching.await.unwrap().unwrap();
        assert_eq!(*fetched, json!([1, 2]));
        assert!(cache.is_stale(&k));
        assert!(cache.in_flight.is_empty());

        let refreshed = cache.get_or_fetch(&k, || async { Ok(json!([1, 2, 3])) }).await.unwrap();
        assert_eq!(*refreshed, json!([1, 2, 3]));
        assert!(!cache.is_stale(&k));
    }

    #[tokio::test]
    async fn test_unrelated_invalidation_keeps_fetch_fresh() {
        let cache = Arc::new(QueryCache::new());
        let k = key("franqueados");

        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();
        let fetching = {
            let cache = cache.clone();
            let k = k.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch(&k, || async move {
                        let _ = started_tx.send(());
                        let _ = release_rx.await;
                        Ok(json!([]))
                    })
                    .await
            })
        };

        started_rx.await.unwrap();
        cache.invalidate(&key("unidades"));
        release_tx.send(()).unwrap();
        fetching.await.unwrap().unwrap();

        assert!(!cache.is_stale(&k));
    }
}
