//! Durable store adapters.
//!
//! The cache mirrors every new or refreshed definition to a durable store
//! and reads it back once, at startup. The store is treated as slow,
//! fallible and eventually consistent; the in-memory index stays the
//! authority for serving.
//!
//! Two adapters ship with the crate:
//!
//! - [`MemoryStore`] keeps documents in memory, keyed by external id. Useful
//!   for tests and for embedding without persistence.
//! - [`JsonLinesStore`] appends one JSON document per line to a file and
//!   pages through it by byte offset.
//!
//! # Pagination
//!
//! [`DurableStore::fetch_page`] starts a scan when given an empty cursor.
//! A non-empty [`Page::next_cursor`] means more pages remain.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::definition::MetricDefinition;
use crate::error::{DurableStoreError, Result};

/// Default number of definitions returned per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// One page of definitions from a durable store scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Definitions in this page.
    pub definitions: Vec<MetricDefinition>,
    /// Cursor for the next page, empty when the scan is complete.
    pub next_cursor: String,
}

/// Backing store for metric definitions.
///
/// Implementations must bound their own latency and return an error rather
/// than hang; the cache calls [`index_one`](Self::index_one) while holding
/// its write lock.
pub trait DurableStore: Send + Sync {
    /// Fetches the page starting at `cursor` (`""` for the first page).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the cursor is invalid.
    fn fetch_page(&self, cursor: &str) -> Result<Page>;

    /// Indexes (inserts or replaces) one definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the definition could not be accepted.
    fn index_one(&self, definition: &MetricDefinition) -> Result<()>;
}

fn parse_offset(cursor: &str) -> Result<u64> {
    if cursor.is_empty() {
        return Ok(0);
    }
    cursor.parse().map_err(|_| {
        DurableStoreError::InvalidCursor {
            cursor: cursor.to_string(),
        }
        .into()
    })
}

/// In-memory durable store.
#[derive(Debug)]
pub struct MemoryStore {
    page_size: usize,
    docs: Mutex<Vec<MetricDefinition>>,
}

impl MemoryStore {
    /// Creates an empty store returning up to `page_size` definitions per page.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            docs: Mutex::new(Vec::new()),
        }
    }

    /// Creates a store pre-populated with `definitions`.
    pub fn with_definitions(definitions: Vec<MetricDefinition>, page_size: usize) -> Self {
        let store = Self::new(page_size);
        *store.docs.lock() = definitions;
        store
    }

    /// Returns the stored document for `id`.
    pub fn get(&self, id: &str) -> Option<MetricDefinition> {
        self.docs.lock().iter().find(|d| d.id == id).cloned()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    /// Returns true if the store holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl DurableStore for MemoryStore {
    #[allow(clippy::cast_possible_truncation)]
    fn fetch_page(&self, cursor: &str) -> Result<Page> {
        let start = parse_offset(cursor)? as usize;
        let docs = self.docs.lock();
        if start > docs.len() {
            return Err(DurableStoreError::InvalidCursor {
                cursor: cursor.to_string(),
            }
            .into());
        }

        let end = (start + self.page_size).min(docs.len());
        let next_cursor = if end < docs.len() {
            end.to_string()
        } else {
            String::new()
        };
        Ok(Page {
            definitions: docs[start..end].to_vec(),
            next_cursor,
        })
    }

    fn index_one(&self, definition: &MetricDefinition) -> Result<()> {
        let mut docs = self.docs.lock();
        match docs.iter_mut().find(|d| d.id == definition.id) {
            Some(existing) => *existing = definition.clone(),
            None => docs.push(definition.clone()),
        }
        Ok(())
    }
}

/// Durable store backed by a JSON-lines file.
///
/// Every indexed definition is appended as a new line, so a refreshed
/// definition appears more than once; later lines win when the cache
/// bootstraps from the file.
#[derive(Debug)]
pub struct JsonLinesStore {
    path: PathBuf,
    page_size: usize,
    append: Mutex<()>,
}

impl JsonLinesStore {
    /// Opens the store at `path`. The file is created on first write.
    pub fn new<P: AsRef<Path>>(path: P, page_size: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            page_size: page_size.max(1),
            append: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> DurableStoreError {
        DurableStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl DurableStore for JsonLinesStore {
    fn fetch_page(&self, cursor: &str) -> Result<Page> {
        let mut offset = parse_offset(cursor)?;
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && offset == 0 => {
                return Ok(Page::default());
            }
            Err(e) => return Err(self.io_error(e).into()),
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| self.io_error(e))?;

        let mut definitions = Vec::with_capacity(self.page_size);
        let mut line = String::new();
        while definitions.len() < self.page_size {
            line.clear();
            let read = reader.read_line(&mut line).map_err(|e| self.io_error(e))?;
            if read == 0 {
                return Ok(Page {
                    definitions,
                    next_cursor: String::new(),
                });
            }
            let record_offset = offset;
            offset += read as u64;
            if line.trim().is_empty() {
                continue;
            }
            let definition = serde_json::from_str(line.trim()).map_err(|source| {
                DurableStoreError::Decode {
                    offset: record_offset,
                    source,
                }
            })?;
            definitions.push(definition);
        }

        // A full page; report end of scan if nothing but whitespace follows.
        let rest = reader.fill_buf().map_err(|e| self.io_error(e))?;
        let next_cursor = if rest.is_empty() {
            String::new()
        } else {
            offset.to_string()
        };
        Ok(Page {
            definitions,
            next_cursor,
        })
    }

    fn index_one(&self, definition: &MetricDefinition) -> Result<()> {
        let mut line =
            serde_json::to_string(definition).map_err(|source| DurableStoreError::Encode {
                id: definition.id.clone(),
                source,
            })?;
        line.push('\n');

        let _guard = self.append.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Drains every page of `store`, calling `on_page` for each non-empty one.
///
/// Returns the number of definitions seen. Stops at the first fetch error.
///
/// # Errors
///
/// Returns the first error reported by [`DurableStore::fetch_page`].
pub fn scan<F>(store: &dyn DurableStore, mut on_page: F) -> Result<usize>
where
    F: FnMut(Vec<MetricDefinition>),
{
    let mut total = 0;
    let mut cursor = String::new();
    loop {
        let page = store.fetch_page(&cursor)?;
        total += page.definitions.len();
        if !page.definitions.is_empty() {
            on_page(page.definitions);
        }
        if page.next_cursor.is_empty() {
            return Ok(total);
        }
        cursor = page.next_cursor;
    }
}
