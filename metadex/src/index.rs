//! Tenant-scoped name index with literal, prefix and trigram matching.
//!
//! The [`PatternIndex`] maps `(org, name)` pairs to dense, monotonically
//! assigned [`MetricId`]s and answers glob lookups over those names.
//!
//! # Structure
//!
//! - a per-org sorted map `name -> id`, used for literal lookups, prefix
//!   range scans and listing
//! - a table of `(org, name)` by id, used to verify trigram candidates
//! - trigram posting lists: every 3-byte window of every name maps to the
//!   sorted list of ids whose name contains it
//! - reference counts per id, marking which ids are live for pruning
//!
//! # Pruning
//!
//! Trigrams that occur in a large fraction of all live names narrow nothing
//! down and cost a lot of memory. [`PatternIndex::prune`] drops their posting
//! lists. A pruned trigram is skipped during candidate intersection, so
//! queries keep returning the same results, only with a larger candidate
//! set to verify. Names indexed after pruning do not revive the list.
//!
//! # Thread Safety
//!
//! The index is a plain data structure. Callers serialize mutations; the
//! [`DefCache`](crate::cache::DefCache) keeps it behind its reader/writer lock.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound;

use crate::definition::{OrgId, SHARED_ORG};
use crate::glob::{MatchKind, Pattern};

type Trigram = [u8; 3];

/// Process-local identifier assigned to a name the first time it is seen.
///
/// Ids are dense and never reused, so they double as positions into the
/// definition table kept by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricId(u32);

impl MetricId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One match returned by [`PatternIndex::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    /// The matching id.
    pub id: MetricId,
    /// The literal name that matched.
    pub path: String,
}

#[derive(Debug)]
enum Posting {
    Ids(Vec<MetricId>),
    Pruned,
}

#[derive(Debug)]
struct NameEntry {
    org: OrgId,
    name: String,
    refs: u32,
}

/// Name index for all tenants.
#[derive(Debug, Default)]
pub struct PatternIndex {
    entries: Vec<NameEntry>,
    by_org: HashMap<OrgId, BTreeMap<String, MetricId>>,
    postings: HashMap<Trigram, Posting>,
    live: usize,
}

impl PatternIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `(org, name)`, allocating the next one if the
    /// pair has not been seen before.
    ///
    /// Repeated calls with the same arguments always return the same id.
    #[allow(clippy::cast_possible_truncation)] // ids are bounded by memory long before u32::MAX
    pub fn get_or_add(&mut self, org: OrgId, name: &str) -> MetricId {
        let names = self.by_org.entry(org).or_default();
        if let Some(&id) = names.get(name) {
            return id;
        }

        let id = MetricId(self.entries.len() as u32);
        names.insert(name.to_string(), id);
        self.entries.push(NameEntry {
            org,
            name: name.to_string(),
            refs: 0,
        });

        for tri in trigrams(name) {
            match self.postings.entry(tri) {
                Entry::Occupied(mut slot) => {
                    if let Posting::Ids(ids) = slot.get_mut() {
                        ids.push(id);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(Posting::Ids(vec![id]));
                }
            }
        }
        id
    }

    /// Looks up the id for `(org, name)` without allocating.
    pub fn get(&self, org: OrgId, name: &str) -> Option<MetricId> {
        self.by_org.get(&org)?.get(name).copied()
    }

    /// Marks `id` as referenced by `org`. References are cumulative.
    ///
    /// Only the owning org can reference an id; other calls are ignored.
    pub fn add_ref(&mut self, org: OrgId, id: MetricId) {
        let Some(entry) = self.entries.get_mut(id.index()) else {
            return;
        };
        if entry.org != org {
            return;
        }
        if entry.refs == 0 {
            self.live += 1;
        }
        entry.refs = entry.refs.saturating_add(1);
    }

    /// Returns the reference count of `id`.
    pub fn refs(&self, id: MetricId) -> u32 {
        self.entries.get(id.index()).map_or(0, |e| e.refs)
    }

    /// Returns the name `id` was allocated under.
    pub fn name(&self, id: MetricId) -> Option<&str> {
        self.entries.get(id.index()).map(|e| e.name.as_str())
    }

    /// Resolves `pattern` for `org`.
    ///
    /// Results are visible to `org` (its own names plus the shared scope's,
    /// or everything when `org` is [`SHARED_ORG`]) and sorted by path.
    pub fn find(&self, org: OrgId, pattern: &str) -> (MatchKind, Vec<Glob>) {
        let pattern = Pattern::parse(pattern);
        let mut globs = match pattern.kind() {
            MatchKind::Literal => self.find_literal(org, pattern.literal().unwrap_or_default()),
            MatchKind::Prefix => self.find_prefix(org, pattern.prefix().unwrap_or_default()),
            MatchKind::Trigram => self.find_trigram(org, &pattern),
        };
        globs.sort_by(|a, b| a.path.cmp(&b.path).then(a.id.cmp(&b.id)));
        (pattern.kind(), globs)
    }

    /// Returns every id visible to `org`, in allocation order.
    pub fn list(&self, org: OrgId) -> Vec<MetricId> {
        let mut ids: Vec<MetricId> = self
            .scopes(org)
            .flat_map(|names| names.values().copied())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Drops the posting list of every trigram contained in more than
    /// `threshold` of all live names. Returns how many lists were dropped.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn prune(&mut self, threshold: f64) -> usize {
        let max_docs = (threshold * self.live as f64).floor() as usize;
        let entries = &self.entries;
        let mut pruned = 0;

        for posting in self.postings.values_mut() {
            let Posting::Ids(ids) = posting else {
                continue;
            };
            let live = ids.iter().filter(|id| entries[id.index()].refs > 0).count();
            if live > max_docs {
                *posting = Posting::Pruned;
                pruned += 1;
            }
        }
        pruned
    }

    /// Number of names indexed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no names are indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of names with at least one reference.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Number of trigrams whose posting list has been pruned.
    pub fn pruned_count(&self) -> usize {
        self.postings
            .values()
            .filter(|p| matches!(p, Posting::Pruned))
            .count()
    }

    /// Number of trigrams with a posting list still in memory.
    pub fn posting_count(&self) -> usize {
        self.postings.len() - self.pruned_count()
    }

    fn scopes(&self, org: OrgId) -> impl Iterator<Item = &BTreeMap<String, MetricId>> {
        self.by_org
            .iter()
            .filter(move |(owner, _)| is_visible(**owner, org))
            .map(|(_, names)| names)
    }

    fn find_literal(&self, org: OrgId, literal: &str) -> Vec<Glob> {
        self.scopes(org)
            .filter_map(|names| names.get(literal))
            .map(|&id| Glob {
                id,
                path: literal.to_string(),
            })
            .collect()
    }

    fn find_prefix(&self, org: OrgId, prefix: &str) -> Vec<Glob> {
        self.scopes(org)
            .flat_map(|names| {
                names
                    .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
                    .take_while(|(name, _)| name.starts_with(prefix))
            })
            .map(|(name, &id)| Glob {
                id,
                path: name.clone(),
            })
            .collect()
    }

    fn find_trigram(&self, org: OrgId, pattern: &Pattern) -> Vec<Glob> {
        let Some(regex) = pattern.to_regex() else {
            tracing::warn!(?pattern, "pattern does not compile, returning no matches");
            return Vec::new();
        };

        let mut lists: Vec<&[MetricId]> = Vec::new();
        for fragment in pattern.fragments() {
            for tri in trigrams(fragment) {
                match self.postings.get(&tri) {
                    // no indexed name contains this trigram
                    None => return Vec::new(),
                    Some(Posting::Pruned) => {}
                    Some(Posting::Ids(ids)) => lists.push(ids),
                }
            }
        }

        let candidates: Vec<MetricId> = if lists.is_empty() {
            self.list(org)
        } else {
            lists.sort_by_key(|ids| ids.len());
            let mut iter = lists.into_iter();
            let first = iter.next().unwrap_or_default().to_vec();
            iter.fold(first, |acc, ids| intersect_sorted(&acc, ids))
        };

        candidates
            .into_iter()
            .filter_map(|id| {
                let entry = &self.entries[id.index()];
                (is_visible(entry.org, org) && regex.is_match(&entry.name)).then(|| Glob {
                    id,
                    path: entry.name.clone(),
                })
            })
            .collect()
    }
}

fn is_visible(owner: OrgId, org: OrgId) -> bool {
    org == SHARED_ORG || owner == org || owner == SHARED_ORG
}

/// Distinct byte trigrams of `s`, sorted.
fn trigrams(s: &str) -> Vec<Trigram> {
    let mut out: Vec<Trigram> = s
        .as_bytes()
        .windows(3)
        .map(|w| [w[0], w[1], w[2]])
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn intersect_sorted(a: &[MetricId], b: &[MetricId]) -> Vec<MetricId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}
