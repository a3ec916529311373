//! Attribute metadata cache
//!
//! Answers "does entity kind `E` have attribute `name`?" for every sort key,
//! condition attribute and update attribute the query assembler sees. The
//! first lookup for a kind records its whole [`Entity::COLUMNS`] table; later
//! lookups, hits or misses, only take the read lock. Names outside the table
//! are never stored, so the cache holds at most one entry per declared
//! attribute no matter what callers ask for.
//!
//! Repositories use [`MetadataCache::global`] unless a cache is injected with
//! [`Store::with_metadata`](super::Store::with_metadata), which tests do to
//! observe population from a clean slate.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

use super::entity::Entity;

/// Longest identifier PostgreSQL keeps without truncation
pub const MAX_IDENTIFIER_LEN: usize = 63;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex is valid"));

static GLOBAL: LazyLock<Arc<MetadataCache>> = LazyLock::new(|| Arc::new(MetadataCache::new()));

/// Whether `name` is a plain SQL identifier that is safe to quote and emit
pub fn is_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN && IDENTIFIER.is_match(name)
}

/// Process-wide map from entity kind to its attribute set
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<TypeId, HashSet<&'static str>>>,
}

impl MetadataCache {
    /// An empty cache, independent of the global one
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every repository that was not given its own
    pub fn global() -> Arc<MetadataCache> {
        Arc::clone(&GLOBAL)
    }

    /// Whether entity kind `E` has attribute `name`.
    ///
    /// Names that are not plain identifiers are answered `false` without
    /// touching the cache.
    pub fn has_attribute<E: Entity>(&self, name: &str) -> bool {
        if !is_identifier(name) {
            return false;
        }

        let kind = TypeId::of::<E>();
        if let Some(known) = self.read(kind, name) {
            return known;
        }

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .entry(kind)
            .or_insert_with(|| E::COLUMNS.iter().copied().collect())
            .contains(name)
    }

    /// Whether `E` supports soft delete
    pub fn is_soft_delete<E: Entity>(&self) -> bool {
        self.has_attribute::<E>("deleted_at")
    }

    /// Cached answer, `None` until the kind has been looked up once
    pub fn cached<E: Entity>(&self, name: &str) -> Option<bool> {
        self.read(TypeId::of::<E>(), name)
    }

    /// Number of cached `(kind, attribute)` entries
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .map(HashSet::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, kind: TypeId, name: &str) -> Option<bool> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&kind)
            .map(|attrs| attrs.contains(name))
    }
}
