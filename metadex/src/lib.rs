//! # metadex
//!
//! In-memory index of metric definitions for a time-series platform.
//!
//! metadex tracks every distinct series ever observed (tenant, name,
//! last-seen time), keeps that knowledge mirrored to a durable store, and
//! resolves graphite-style patterns such as `servers.*.cpu.idle` into
//! concrete series for the query path.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - One reader/writer lock over the whole index; reads run concurrently
//! - Fresh, known series cost one read-locked hash lookup per data point
//! - Exactly one durable-store write per new series and per refresh, even
//!   under racing ingest threads
//! - Literal, prefix and trigram pattern lookups, with periodic pruning of
//!   unselective trigrams to bound memory
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use metadex::{CacheConfig, DefCache, MatchKind, MemoryStore, MetricDefinition};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Definitions already persisted by earlier runs
//! let store = Arc::new(MemoryStore::with_definitions(
//!     vec![
//!         MetricDefinition::new("1.aa", 1, "servers.web1.cpu.idle", 1_700_000_000),
//!         MetricDefinition::new("1.bb", 1, "servers.web2.cpu.idle", 1_700_000_000),
//!     ],
//!     1000,
//! ));
//!
//! // Bootstraps from the store and starts background pruning
//! let cache = DefCache::new(store, CacheConfig::default())?;
//!
//! let (kind, found) = cache.find(1, "servers.*.cpu.idle");
//! assert_eq!(kind, MatchKind::Trigram);
//! assert_eq!(found.len(), 2);
//!
//! let def = cache.get("1.aa").expect("bootstrapped");
//! assert_eq!(def.name, "servers.web1.cpu.idle");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`DefCache`]: Top-level handle; bootstrap, add, get, find, list
//! - [`PatternIndex`]: Name → id index with trigram posting lists
//! - [`DurableStore`]: Adapter trait for the backing document store
//! - [`CacheConfig`]: Freshness window and pruning settings
//!
//! ## Modules
//!
//! - [`cache`]: The definition cache and its write path
//! - [`index`]: Pattern index and pruning
//! - [`glob`]: Pattern syntax and classification
//! - [`definition`]: Definition and data point types
//! - [`durable`]: Durable store trait and adapters
//! - [`prune`]: Background prune task
//! - [`stats`]: Counters and timers
//! - [`config`]: Cache configuration
//! - [`request`]: Fetch request contract for the storage engine
//! - [`consolidation`]: Consolidation method names
//! - [`error`]: Error types

pub mod cache;
pub mod config;
pub mod consolidation;
pub mod definition;
pub mod durable;
pub mod error;
pub mod glob;
pub mod index;
pub mod prune;
pub mod request;
pub mod stats;

// Re-export primary API types at crate root for convenience.
pub use cache::{DefCache, SeriesMatch};
pub use config::CacheConfig;
pub use consolidation::Consolidator;
pub use definition::{MetricData, MetricDefinition, OrgId, SHARED_ORG};
pub use durable::{DurableStore, JsonLinesStore, MemoryStore, Page};
pub use error::{MetadexError, Result};
pub use glob::{MatchKind, Pattern};
pub use index::{MetricId, PatternIndex};
pub use request::Req;
pub use stats::StatsSnapshot;
