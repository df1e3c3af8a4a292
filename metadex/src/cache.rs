//! The definition cache: the top-level index of every known series.
//!
//! [`DefCache`] owns three structures that move together under a single
//! reader/writer lock:
//!
//! - the definition table, where position `i` holds the definition for
//!   [`MetricId`] `i`
//! - the identity map, from external id to [`MetricId`]
//! - the [`PatternIndex`], from `(org, name)` to [`MetricId`]
//!
//! # Lifecycle
//!
//! ```text
//! new() ──► bootstrap from durable store ──► prune task started ──► serving
//!                                                                     │
//!                                       shutdown() / drop ◄───────────┘
//! ```
//!
//! # Write path
//!
//! [`DefCache::add`] runs once per ingested point. Known series that are
//! still fresh only take the read lock. Everything that mutates takes the
//! write lock and re-checks the condition that sent it there: another
//! caller may have created or refreshed the definition in the meantime. A
//! refresh only moves `last_update`; the rest of the stored definition is
//! never replaced. This keeps the durable store write-through
//! to exactly one call per created series and per refresh.
//!
//! The write-through itself happens under the write lock. Adapters are
//! expected to buffer (e.g. a bulk indexer) and return quickly.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use metadex::{CacheConfig, DefCache, MemoryStore, MetricData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::default());
//! let cache = DefCache::new(store, CacheConfig::default())?;
//!
//! cache.add(&MetricData {
//!     id: "1.a1b2".to_string(),
//!     org_id: 1,
//!     name: "servers.web1.cpu.idle".to_string(),
//!     metric: "cpu.idle".to_string(),
//!     interval: 10,
//!     unit: "percent".to_string(),
//!     target_type: "gauge".to_string(),
//!     tags: Vec::new(),
//!     time: 1_700_000_000,
//!     value: 97.5,
//! });
//!
//! let (_kind, found) = cache.find(1, "servers.*.cpu.idle");
//! assert_eq!(found.len(), 1);
//! assert_eq!(found[0].definition.id, "1.a1b2");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::config::CacheConfig;
use crate::definition::{MetricData, MetricDefinition, OrgId};
use crate::durable::{self, DurableStore};
use crate::error::Result;
use crate::glob::MatchKind;
use crate::index::{MetricId, PatternIndex};
use crate::prune::PruneTask;
use crate::stats::{CacheStats, StatsSnapshot};

/// A series matched by [`DefCache::find`].
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMatch {
    /// The name that matched the pattern.
    pub path: String,
    /// The stored definition. Shared with the cache; refreshes replace it
    /// rather than mutate it.
    pub definition: Arc<MetricDefinition>,
}

#[derive(Debug, Default)]
struct State {
    defs: Vec<Arc<MetricDefinition>>,
    by_id: HashMap<String, MetricId>,
    by_key: PatternIndex,
}

impl State {
    fn def(&self, id: MetricId) -> &Arc<MetricDefinition> {
        &self.defs[id.index()]
    }

    /// Registers a definition whose external id is not yet known.
    fn insert(&mut self, def: MetricDefinition) -> MetricId {
        let id = self.by_key.get_or_add(def.org_id, &def.name);
        self.by_key.add_ref(def.org_id, id);
        self.by_id.insert(def.id.clone(), id);

        if id.index() == self.defs.len() {
            self.defs.push(Arc::new(def));
        } else {
            // another external id already owns this (org, name)
            tracing::debug!(
                id = %def.id,
                org = def.org_id,
                name = %def.name,
                slot = %id,
                "aliasing definition"
            );
        }
        id
    }

    /// Loads a definition read from the durable store. Repeated external
    /// ids keep the most recently updated copy.
    fn load(&mut self, def: MetricDefinition) {
        match self.by_id.get(&def.id) {
            Some(&id) => {
                let slot = &mut self.defs[id.index()];
                if slot.id == def.id && slot.last_update < def.last_update {
                    *slot = Arc::new(def);
                }
            }
            None => {
                self.insert(def);
            }
        }
    }
}

struct Shared {
    state: RwLock<State>,
    store: Arc<dyn DurableStore>,
    config: CacheConfig,
    stats: CacheStats,
}

impl Shared {
    fn write_through(&self, def: &MetricDefinition) {
        let start = Instant::now();
        match self.store.index_one(def) {
            Ok(()) => {
                self.stats.write_through_ok.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!(
                    id = %def.id,
                    error = %e,
                    "couldn't index definition to durable store"
                );
                self.stats.write_through_fail.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.stats.write_through.record_since(start);
    }

    fn prune(&self) -> usize {
        let start = Instant::now();
        let pruned = self.state.write().by_key.prune(self.config.prune_threshold);
        self.stats.prune.record_since(start);
        self.stats
            .pruned_fragments
            .fetch_add(pruned as u64, Ordering::Relaxed);
        tracing::debug!(pruned, elapsed = ?start.elapsed(), "pruned pattern index");
        pruned
    }
}

/// Concurrent cache of metric definitions, mirrored to a durable store.
///
/// All methods take `&self`; share the cache between threads with an
/// [`Arc`].
pub struct DefCache {
    shared: Arc<Shared>,
    pruner: Mutex<Option<PruneTask>>,
}

impl DefCache {
    /// Creates a cache, bootstraps it from `store`, and starts the
    /// background prune task.
    ///
    /// Bootstrap failures are logged, not returned: the cache starts with
    /// whatever pages were read and relearns the rest from ingest traffic.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the prune thread cannot
    /// be started.
    pub fn new(store: Arc<dyn DurableStore>, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let interval = config.prune_interval;
        let cache = Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::default()),
                store,
                config,
                stats: CacheStats::default(),
            }),
            pruner: Mutex::new(None),
        };

        cache.bootstrap();

        let shared = Arc::clone(&cache.shared);
        let task = PruneTask::spawn(interval, move || {
            shared.prune();
        })?;
        *cache.pruner.lock() = Some(task);
        Ok(cache)
    }

    /// Reads every page from the durable store into the cache, one write
    /// lock per page. Stops at the first fetch error.
    fn bootstrap(&self) {
        let start = Instant::now();
        let result = durable::scan(self.shared.store.as_ref(), |page| {
            let count = page.len() as u64;
            let mut state = self.shared.state.write();
            for def in page {
                state.load(def);
            }
            drop(state);
            self.shared.stats.bootstrapped.fetch_add(count, Ordering::Relaxed);
        });

        match result {
            Ok(total) => {
                tracing::info!(
                    total,
                    elapsed = ?start.elapsed(),
                    "bootstrapped metric definitions"
                );
            }
            Err(e) => {
                let loaded = self.shared.stats.bootstrapped.load(Ordering::Relaxed);
                tracing::error!(error = %e, loaded, "could not bootstrap from durable store");
            }
        }
    }

    /// Records that a data point for `data.id` was seen.
    ///
    /// Creates the definition the first time the external id is seen and
    /// refreshes it when the point is more than the freshness window newer
    /// than the stored `last_update`. Both cases write through to the
    /// durable store exactly once, however many callers race on the same id.
    pub fn add(&self, data: &MetricData) {
        let window = self.shared.config.freshness_secs();
        let known = {
            let state = self.shared.state.read();
            state
                .by_id
                .get(&data.id)
                .map(|&id| (id, Arc::clone(state.def(id))))
        };

        match known {
            Some((id, current)) => {
                if current.is_stale(data.time, window) {
                    self.refresh(id, data.time, window);
                }
            }
            None => {
                let candidate = MetricDefinition::from(data);

                let mut state = self.shared.state.write();
                if state.by_id.contains_key(&candidate.id) {
                    return;
                }
                self.shared.write_through(&candidate);
                state.insert(candidate);
            }
        }
    }

    /// Moves the `last_update` of slot `id` to `time` after a caller saw it
    /// stale under the read lock. Everything else in the stored definition
    /// is kept: the slot stays owned by the external id and name it was
    /// created with, whichever alias reported the point.
    fn refresh(&self, id: MetricId, time: i64, window: i64) {
        let mut state = self.shared.state.write();
        let slot = &mut state.defs[id.index()];
        if slot.is_stale(time, window) {
            let mut next = (**slot).clone();
            next.last_update = time;
            self.shared.write_through(&next);
            *slot = Arc::new(next);
        } else if slot.last_update < time {
            // refreshed by someone else; keep the newest timestamp
            Arc::make_mut(slot).last_update = time;
        }
    }

    /// Returns the definition for an external id.
    ///
    /// The definition is shared with the cache, not copied.
    pub fn get(&self, id: &str) -> Option<Arc<MetricDefinition>> {
        let start = Instant::now();
        let def = {
            let state = self.shared.state.read();
            state.by_id.get(id).map(|&i| Arc::clone(state.def(i)))
        };
        self.shared.stats.get.record_since(start);
        def
    }

    /// Resolves a name pattern for `org` into definitions.
    pub fn find(&self, org: OrgId, pattern: &str) -> (MatchKind, Vec<SeriesMatch>) {
        let start = Instant::now();
        let (kind, matches) = {
            let state = self.shared.state.read();
            let (kind, globs) = state.by_key.find(org, pattern);
            let matches = globs
                .into_iter()
                .map(|glob| SeriesMatch {
                    definition: Arc::clone(state.def(glob.id)),
                    path: glob.path,
                })
                .collect();
            (kind, matches)
        };
        self.shared.stats.match_timer(kind).record_since(start);
        (kind, matches)
    }

    /// Returns every definition visible to `org`: its own plus the shared
    /// scope's, or all of them for the shared scope itself.
    pub fn list(&self, org: OrgId) -> Vec<Arc<MetricDefinition>> {
        let start = Instant::now();
        let defs = {
            let state = self.shared.state.read();
            state
                .by_key
                .list(org)
                .into_iter()
                .map(|id| Arc::clone(state.def(id)))
                .collect()
        };
        self.shared.stats.list.record_since(start);
        defs
    }

    /// Runs one prune pass now. Returns the number of posting lists dropped.
    pub fn prune_now(&self) -> usize {
        self.shared.prune()
    }

    /// Number of definitions held.
    pub fn len(&self) -> usize {
        self.shared.state.read().defs.len()
    }

    /// Returns true if no definitions are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of external ids known, aliases included.
    pub fn known_ids(&self) -> usize {
        self.shared.state.read().by_id.len()
    }

    /// The configuration the cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    /// Current counters and timers.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Stops the background prune task. The cache keeps serving; only
    /// pruning stops. Idempotent, and also run on drop.
    pub fn shutdown(&self) {
        if let Some(mut task) = self.pruner.lock().take() {
            task.stop();
        }
    }
}

impl Drop for DefCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for DefCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefCache")
            .field("definitions", &self.len())
            .field("config", &self.shared.config)
            .field("pruning", &self.pruner.lock().is_some())
            .finish_non_exhaustive()
    }
}
