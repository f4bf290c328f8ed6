use moka::future::Cache;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config;

/// Identity of one memoizable query: the operation name plus its arguments.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct QueryKey {
    op: &'static str,
    file: Option<String>,
    cycle: Option<i64>,
}

impl QueryKey {
    pub fn op(op: &'static str) -> Self {
        Self {
            op,
            file: None,
            cycle: None,
        }
    }

    pub fn with_args(op: &'static str, file: &str, cycle: i64) -> Self {
        Self {
            op,
            file: Some(file.to_string()),
            cycle: Some(cycle),
        }
    }
}

/// Time-bounded memoization of derived chart tables.
///
/// A cached entry younger than the TTL is returned without re-executing the
/// query; otherwise the compute future runs, its result is stored with the
/// current timestamp, and errors are never cached. Capacity 0 disables the
/// cache so every call computes.
pub struct QueryCache {
    cache: Option<Cache<QueryKey, Arc<Vec<Value>>>>,
    ttl: Duration,
    capacity: u64,
    stats: Counters,
}

impl QueryCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = if capacity == 0 {
            None
        } else {
            Some(
                Cache::builder()
                    .max_capacity(capacity)
                    .time_to_live(ttl)
                    .build(),
            )
        };
        Self {
            cache,
            ttl,
            capacity,
            stats: Counters::default(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(config::cache_capacity(), config::cache_ttl())
    }

    pub fn enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub async fn get_or_compute<F, Fut>(
        &self,
        key: QueryKey,
        compute: F,
    ) -> anyhow::Result<Arc<Vec<Value>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Vec<Value>>>,
    {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(hit);
            }
        }
        let value = match compute().await {
            Ok(rows) => Arc::new(rows),
            Err(err) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        };
        if let Some(cache) = &self.cache {
            cache.insert(key, value.clone()).await;
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.bypass.fetch_add(1, Ordering::Relaxed);
        }
        Ok(value)
    }

    pub fn stats(&self) -> QueryCacheStats {
        QueryCacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            bypass: self.stats.bypass.load(Ordering::Relaxed),
            entries: self.cache.as_ref().map(|c| c.entry_count()).unwrap_or(0),
            capacity: self.capacity,
            ttl_secs: self.ttl.as_secs(),
            enabled: self.enabled(),
        }
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks().await;
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct QueryCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub bypass: u64,
    pub entries: u64,
    pub capacity: u64,
    pub ttl_secs: u64,
    pub enabled: bool,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    bypass: AtomicU64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows() -> Vec<Value> {
        vec![json!({"file_name": "a.csv", "voltage": 3.0})]
    }

    #[tokio::test]
    async fn second_call_within_ttl_computes_once() {
        let cache = QueryCache::new(16, Duration::from_secs(60));
        let calls = AtomicU64::new(0);
        for _ in 0..2 {
            let out = cache
                .get_or_compute(QueryKey::with_args("time_series", "a.csv", 1), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
            assert_eq!(out.len(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn expired_entry_computes_again() {
        let cache = QueryCache::new(16, Duration::from_millis(100));
        let calls = AtomicU64::new(0);
        let key = QueryKey::op("known_files");
        for _ in 0..2 {
            cache
                .get_or_compute(key.clone(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(150)).await;
        cache.run_pending_tasks().await;
        cache
            .get_or_compute(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(rows())
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn distinct_arguments_are_distinct_entries() {
        let cache = QueryCache::new(16, Duration::from_secs(60));
        let calls = AtomicU64::new(0);
        for cycle in [1, 2] {
            cache
                .get_or_compute(QueryKey::with_args("time_series", "a.csv", cycle), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = QueryCache::new(16, Duration::from_secs(60));
        let key = QueryKey::op("discharge_over_cycle");
        let err = cache
            .get_or_compute(key.clone(), || async { Err(anyhow::anyhow!("query failed")) })
            .await;
        assert!(err.is_err());
        let out = cache
            .get_or_compute(key, || async { Ok(rows()) })
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn zero_capacity_disables_cache() {
        let cache = QueryCache::new(0, Duration::from_secs(60));
        assert!(!cache.enabled());
        let calls = AtomicU64::new(0);
        for _ in 0..2 {
            cache
                .get_or_compute(QueryKey::op("known_files"), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(rows())
                })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().bypass, 2);
    }
}
