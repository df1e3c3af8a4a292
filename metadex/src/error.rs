//! Error types for the metadex definition index.
//!
//! Only a small part of the index is fallible. The hot paths (`add`, `get`,
//! `find`, `list`) degrade instead of failing: durable-store write failures
//! are logged and counted, lookups that miss return `None` or an empty
//! vector. What remains are configuration validation and the durable store
//! adapter itself.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all metadex operations.
#[derive(Error, Debug)]
pub enum MetadexError {
    /// Error reported by a durable store adapter.
    #[error("durable store error: {0}")]
    DurableStore(#[from] DurableStoreError),

    /// Error validating the cache configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The background prune thread could not be started.
    #[error("failed to start prune task: {0}")]
    PruneTask(#[source] std::io::Error),
}

/// Errors raised by a [`DurableStore`](crate::durable::DurableStore) adapter.
#[derive(Error, Debug)]
pub enum DurableStoreError {
    /// The backing file could not be read or written.
    #[error("failed to access '{}': {source}", path.display())]
    Io {
        /// The file that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A stored definition could not be decoded.
    #[error("failed to decode definition at byte {offset}: {source}")]
    Decode {
        /// Byte offset of the offending record.
        offset: u64,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A definition could not be encoded for indexing.
    #[error("failed to encode definition '{id}': {source}")]
    Encode {
        /// External id of the definition.
        id: String,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The pagination cursor was not produced by this store.
    #[error("invalid cursor '{cursor}'")]
    InvalidCursor {
        /// The rejected cursor.
        cursor: String,
    },

    /// The store is temporarily unable to serve the request.
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors that can occur while validating a [`CacheConfig`](crate::config::CacheConfig).
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    /// The freshness window is zero.
    #[error("freshness window cannot be zero")]
    ZeroFreshnessWindow,

    /// The prune interval is zero.
    #[error("prune interval cannot be zero")]
    ZeroPruneInterval,

    /// The prune threshold is outside `(0, 1]`.
    #[error("prune threshold {threshold} must be within (0, 1]")]
    InvalidPruneThreshold {
        /// The rejected threshold.
        threshold: f64,
    },
}

/// Type alias for `Result<T, MetadexError>`.
pub type Result<T> = std::result::Result<T, MetadexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err: MetadexError = ConfigError::InvalidPruneThreshold { threshold: 1.5 }.into();
        assert_eq!(
            err.to_string(),
            "config error: prune threshold 1.5 must be within (0, 1]"
        );

        let err: MetadexError = DurableStoreError::InvalidCursor {
            cursor: "abc".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "durable store error: invalid cursor 'abc'");
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = DurableStoreError::Io {
            path: PathBuf::from("/tmp/defs.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/tmp/defs.jsonl"));
    }
}
