//! Integration tests for the definition cache write path and bootstrap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use metadex::durable::{DurableStore, MemoryStore, Page};
use metadex::error::{DurableStoreError, Result};
use metadex::{CacheConfig, DefCache, MatchKind, MetricData, MetricDefinition, SHARED_ORG};

/// Wraps a [`MemoryStore`], counting calls and optionally failing.
struct InstrumentedStore {
    inner: MemoryStore,
    index_calls: AtomicUsize,
    index_delay: Duration,
    fail_index: bool,
    fail_fetch_after: Option<usize>,
    fetch_calls: AtomicUsize,
}

impl InstrumentedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            index_calls: AtomicUsize::new(0),
            index_delay: Duration::ZERO,
            fail_index: false,
            fail_fetch_after: None,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }
}

impl DurableStore for InstrumentedStore {
    fn fetch_page(&self, cursor: &str) -> Result<Page> {
        let call = self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch_after.is_some_and(|n| call >= n) {
            return Err(DurableStoreError::Unavailable {
                reason: "scroll expired".to_string(),
            }
            .into());
        }
        self.inner.fetch_page(cursor)
    }

    fn index_one(&self, definition: &MetricDefinition) -> Result<()> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if !self.index_delay.is_zero() {
            thread::sleep(self.index_delay);
        }
        if self.fail_index {
            return Err(DurableStoreError::Unavailable {
                reason: "bulk buffer full".to_string(),
            }
            .into());
        }
        self.inner.index_one(definition)
    }
}

fn point(id: &str, org: i32, name: &str, time: i64) -> MetricData {
    MetricData {
        id: id.to_string(),
        org_id: org,
        name: name.to_string(),
        metric: name.to_string(),
        interval: 10,
        unit: "ms".to_string(),
        target_type: "gauge".to_string(),
        tags: Vec::new(),
        time,
        value: 0.5,
    }
}

fn defs(n: usize) -> Vec<MetricDefinition> {
    (0..n)
        .map(|i| MetricDefinition::new(format!("1.{i:04}"), 1, format!("servers.s{i}.load"), 1000))
        .collect()
}

const T: i64 = 1_700_000_000;

#[test]
fn test_bootstrap_loads_all_pages() -> Result<()> {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::with_definitions(defs(25), 10)));
    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;

    assert_eq!(cache.len(), 25);
    assert_eq!(cache.stats().bootstrapped, 25);
    assert_eq!(store.fetch_calls.load(Ordering::SeqCst), 3);
    // bootstrap never writes back
    assert_eq!(store.index_calls(), 0);

    let def = cache.get("1.0007").unwrap();
    assert_eq!(def.name, "servers.s7.load");
    Ok(())
}

#[test]
fn test_bootstrap_error_keeps_partial_state() -> Result<()> {
    let mut store = InstrumentedStore::new(MemoryStore::with_definitions(defs(25), 10));
    store.fail_fetch_after = Some(2);
    let store = Arc::new(store);

    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;
    assert_eq!(cache.len(), 20);
    assert!(cache.get("1.0024").is_none());

    // the missing series is relearned from ingest traffic
    cache.add(&point("1.0024", 1, "servers.s24.load", T));
    assert_eq!(cache.len(), 21);
    assert_eq!(store.index_calls(), 1);
    Ok(())
}

#[test]
fn test_concurrent_creation_writes_through_once() -> Result<()> {
    let mut store = InstrumentedStore::new(MemoryStore::default());
    store.index_delay = Duration::from_millis(2);
    let store = Arc::new(store);
    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;

    thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                for _ in 0..50 {
                    cache.add(&point("1.new", 1, "servers.web1.cpu", T));
                }
            });
        }
    });

    assert_eq!(store.index_calls(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().write_through_ok, 1);
    Ok(())
}

#[test]
fn test_concurrent_fresh_points_never_write_through() -> Result<()> {
    let store = Arc::new(InstrumentedStore::new(MemoryStore::default()));
    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;
    cache.add(&point("1.a", 1, "a.b", T));

    thread::scope(|s| {
        for worker in 0..8_i64 {
            let cache = &cache;
            s.spawn(move || {
                for i in 0..100_i64 {
                    cache.add(&point("1.a", 1, "a.b", T + worker * 100 + i));
                }
            });
        }
    });

    assert_eq!(store.index_calls(), 1);
    assert_eq!(cache.get("1.a").unwrap().last_update, T);
    Ok(())
}

#[test]
fn test_concurrent_refresh_writes_through_once() -> Result<()> {
    let mut store = InstrumentedStore::new(MemoryStore::default());
    store.index_delay = Duration::from_millis(2);
    let store = Arc::new(store);
    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;
    cache.add(&point("1.a", 1, "a.b", T));
    assert_eq!(store.index_calls(), 1);

    let stale = T + 30_000;
    thread::scope(|s| {
        for worker in 0..8_i64 {
            let cache = &cache;
            s.spawn(move || cache.add(&point("1.a", 1, "a.b", stale + worker)));
        }
    });

    assert_eq!(store.index_calls(), 2);
    // callers that saw the refresh already done return early, so the
    // result is the newest among the callers that took the write lock
    let last_update = cache.get("1.a").unwrap().last_update;
    assert!((stale..=stale + 7).contains(&last_update));
    Ok(())
}

#[test]
fn test_write_through_failure_is_counted_not_fatal() -> Result<()> {
    let mut store = InstrumentedStore::new(MemoryStore::default());
    store.fail_index = true;
    let store = Arc::new(store);
    let cache = DefCache::new(Arc::clone(&store) as Arc<dyn DurableStore>, CacheConfig::default())?;

    cache.add(&point("1.a", 1, "a.b", T));
    cache.add(&point("1.a", 1, "a.b", T + 10));

    // in-memory state is kept and the failed write is not retried
    assert!(cache.get("1.a").is_some());
    assert_eq!(store.index_calls(), 1);
    let stats = cache.stats();
    assert_eq!(stats.write_through_fail, 1);
    assert_eq!(stats.write_through_ok, 0);
    assert_eq!(stats.write_through.count, 1);
    Ok(())
}

#[test]
fn test_readers_run_alongside_writers() -> Result<()> {
    let store = Arc::new(MemoryStore::default());
    let cache = DefCache::new(store, CacheConfig::default())?;

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..500 {
                cache.add(&point(&format!("1.{i}"), 1, &format!("hosts.h{i}.cpu"), T));
            }
        });
        s.spawn(|| {
            for _ in 0..200 {
                let (kind, found) = cache.find(1, "hosts.*.cpu");
                assert_eq!(kind, MatchKind::Trigram);
                for m in &found {
                    assert_eq!(m.path, m.definition.name);
                }
                let _ = cache.list(1);
            }
        });
    });

    assert_eq!(cache.find(1, "hosts.*.cpu").1.len(), 500);
    Ok(())
}

#[test]
fn test_tenant_visibility() -> Result<()> {
    let cache = DefCache::new(Arc::new(MemoryStore::default()), CacheConfig::default())?;
    cache.add(&point("1.a", 1, "app.requests", T));
    cache.add(&point("2.a", 2, "app.requests", T));
    cache.add(&point("s.a", SHARED_ORG, "app.shared", T));

    let names = |defs: Vec<Arc<MetricDefinition>>| -> Vec<String> {
        defs.iter().map(|d| d.id.clone()).collect()
    };
    assert_eq!(names(cache.list(1)), vec!["1.a", "s.a"]);
    assert_eq!(names(cache.list(2)), vec!["2.a", "s.a"]);
    assert_eq!(names(cache.list(SHARED_ORG)), vec!["1.a", "2.a", "s.a"]);

    let (kind, found) = cache.find(2, "app.*");
    assert_eq!(kind, MatchKind::Prefix);
    let ids: Vec<&str> = found.iter().map(|m| m.definition.id.as_str()).collect();
    assert_eq!(ids, vec!["2.a", "s.a"]);
    Ok(())
}

#[test]
fn test_background_prune_runs() -> Result<()> {
    let config = CacheConfig {
        prune_interval: Duration::from_millis(5),
        ..CacheConfig::default()
    };
    let cache = DefCache::new(Arc::new(MemoryStore::with_definitions(defs(20), 100)), config)?;

    let mut waited = Duration::ZERO;
    while cache.stats().prune.count == 0 && waited < Duration::from_secs(10) {
        thread::sleep(Duration::from_millis(5));
        waited += Duration::from_millis(5);
    }
    cache.shutdown();

    let stats = cache.stats();
    assert!(stats.prune.count > 0);
    assert!(stats.pruned_fragments > 0);

    // pruning never loses a match
    let (_, found) = cache.find(1, "servers.s1?.load");
    assert_eq!(found.len(), 10);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = CacheConfig {
        prune_threshold: 0.0,
        ..CacheConfig::default()
    };
    assert!(DefCache::new(Arc::new(MemoryStore::default()), config).is_err());
}
