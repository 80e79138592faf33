//! Placeholder cache: (category, key) → `[CATEGORY_n]`, reverse lookup and
//! persistence.

use crate::error::{Result, StoreError};
use crate::store::MappingStore;
use crate::types::placeholder;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroize;

pub const DOCUMENT_VERSION: u32 = 1;

/// Serialized form of a cache.
///
/// ```json
/// { "version": 1,
///   "counters": { "email": 1 },
///   "placeholders": { "email": { "alice@test.com": "[EMAIL_1]" } },
///   "originals": { "[EMAIL_1]": "Alice@Test.com" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub version: u32,
    /// Last ordinal handed out per category
    pub counters: BTreeMap<String, u32>,
    /// category → normalized key → placeholder
    pub placeholders: BTreeMap<String, BTreeMap<String, String>>,
    /// placeholder → first surface form seen
    #[serde(default)]
    pub originals: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
struct CategoryTable {
    counter: u32,
    by_key: BTreeMap<String, String>,
}

/// Session-scoped placeholder assignments
#[derive(Debug, Clone, Default)]
pub struct PlaceholderCache {
    categories: BTreeMap<String, CategoryTable>,
    originals: BTreeMap<String, String>,
}

impl PlaceholderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder for `key` in `category`, assigning the next ordinal on
    /// first sight. `original` is remembered for reversal the first time.
    pub fn placeholder_for(&mut self, category: &str, key: &str, original: &str) -> String {
        let table = self.categories.entry(category.to_string()).or_default();
        if let Some(existing) = table.by_key.get(key) {
            return existing.clone();
        }
        table.counter += 1;
        let assigned = placeholder(category, table.counter);
        table.by_key.insert(key.to_string(), assigned.clone());
        self.originals
            .insert(assigned.clone(), original.to_string());
        assigned
    }

    /// Existing placeholder, without assigning
    pub fn lookup(&self, category: &str, key: &str) -> Option<&str> {
        self.categories
            .get(category)?
            .by_key
            .get(key)
            .map(String::as_str)
    }

    pub fn restore(&self, placeholder: &str) -> Option<&str> {
        self.originals.get(placeholder).map(String::as_str)
    }

    /// placeholder → original value, for every entry
    pub fn mapping(&self) -> BTreeMap<String, String> {
        self.originals.clone()
    }

    /// Highest ordinal assigned in `category` so far
    pub fn counter(&self, category: &str) -> u32 {
        self.categories.get(category).map_or(0, |t| t.counter)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn to_document(&self) -> MappingDocument {
        MappingDocument {
            version: DOCUMENT_VERSION,
            counters: self
                .categories
                .iter()
                .map(|(category, table)| (category.clone(), table.counter))
                .collect(),
            placeholders: self
                .categories
                .iter()
                .map(|(category, table)| (category.clone(), table.by_key.clone()))
                .collect(),
            originals: self.originals.clone(),
        }
    }

    /// Rebuild a cache, rejecting documents that could hand out a
    /// placeholder twice.
    pub fn from_document(document: MappingDocument) -> std::result::Result<Self, String> {
        if document.version != DOCUMENT_VERSION {
            return Err(format!("unsupported document version {}", document.version));
        }

        let mut cache = Self::new();
        for (category, &counter) in &document.counters {
            cache.categories.insert(
                category.clone(),
                CategoryTable {
                    counter,
                    by_key: BTreeMap::new(),
                },
            );
        }

        let mut seen = BTreeSet::new();
        for (category, entries) in document.placeholders {
            let mut table = cache.categories.remove(&category).unwrap_or_default();
            for (key, assigned) in entries {
                let ordinal = parse_ordinal(&category, &assigned)
                    .ok_or_else(|| format!("malformed placeholder {assigned:?} in '{category}'"))?;
                if !seen.insert(assigned.clone()) {
                    return Err(format!("placeholder {assigned:?} assigned twice"));
                }
                table.counter = table.counter.max(ordinal);
                let original = document
                    .originals
                    .get(&assigned)
                    .cloned()
                    .unwrap_or_else(|| key.clone());
                cache.originals.insert(assigned.clone(), original);
                table.by_key.insert(key, assigned);
            }
            cache.categories.insert(category, table);
        }
        Ok(cache)
    }

    /// Load a session's cache.
    ///
    /// A missing, unreadable or corrupt record yields an empty cache.
    pub fn load(store: &dyn MappingStore, session_id: &str) -> Self {
        let bytes = match store.read(session_id) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(session_id, "no persisted mapping, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(session_id, error = %e, "failed to read mapping, starting empty");
                return Self::new();
            }
        };

        let parsed = serde_json::from_slice::<MappingDocument>(&bytes)
            .map_err(|e| e.to_string())
            .and_then(Self::from_document);
        match parsed {
            Ok(cache) => {
                debug!(session_id, entries = cache.len(), "loaded persisted mapping");
                cache
            }
            Err(reason) => {
                warn!(session_id, %reason, "corrupt mapping, starting empty");
                Self::new()
            }
        }
    }

    /// Persist the whole cache in one write
    pub fn save(&self, store: &dyn MappingStore, session_id: &str) -> Result<()> {
        let blob = serde_json::to_vec_pretty(&self.to_document()).map_err(StoreError::from)?;
        store.write(session_id, &blob)?;
        debug!(session_id, entries = self.len(), "persisted mapping");
        Ok(())
    }
}

fn parse_ordinal(category: &str, assigned: &str) -> Option<u32> {
    let prefix = format!("[{}_", category.to_uppercase());
    let ordinal: u32 = assigned.strip_prefix(&prefix)?.strip_suffix(']')?.parse().ok()?;
    (ordinal > 0 && placeholder(category, ordinal) == assigned).then_some(ordinal)
}

impl Drop for PlaceholderCache {
    fn drop(&mut self) {
        for (_, mut original) in std::mem::take(&mut self.originals) {
            original.zeroize();
        }
        for (_, table) in std::mem::take(&mut self.categories) {
            for (mut key, _) in table.by_key {
                key.zeroize();
            }
        }
    }
}

/// A cache bound to one persisted session.
///
/// Created with [`Session::open`], mutated through [`Session::cache_mut`],
/// persisted with [`Session::commit`]. Dropping an uncommitted session
/// discards its changes.
pub struct Session<'s> {
    id: String,
    store: &'s dyn MappingStore,
    cache: PlaceholderCache,
}

impl<'s> Session<'s> {
    pub fn open(store: &'s dyn MappingStore, id: impl Into<String>) -> Self {
        let id = id.into();
        let cache = PlaceholderCache::load(store, &id);
        Self { id, store, cache }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn cache(&self) -> &PlaceholderCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut PlaceholderCache {
        &mut self.cache
    }

    /// Write the cache back. On failure the in-memory mapping stays
    /// available so the caller can retry or abort.
    pub fn commit(&self) -> Result<()> {
        self.cache.save(self.store, &self.id)
    }

    pub fn into_cache(self) -> PlaceholderCache {
        self.cache
    }
}

/// A cache shared between concurrent protections.
///
/// All mutation goes through one mutex so a value can never receive two
/// different placeholders.
#[derive(Debug, Clone, Default)]
pub struct SharedCache {
    inner: Arc<Mutex<PlaceholderCache>>,
}

impl SharedCache {
    pub fn new(cache: PlaceholderCache) -> Self {
        Self {
            inner: Arc::new(Mutex::new(cache)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PlaceholderCache> {
        self.inner.lock()
    }

    pub fn placeholder_for(&self, category: &str, key: &str, original: &str) -> String {
        self.inner.lock().placeholder_for(category, key, original)
    }

    pub fn snapshot(&self) -> PlaceholderCache {
        self.inner.lock().clone()
    }

    pub fn save(&self, store: &dyn MappingStore, session_id: &str) -> Result<()> {
        self.inner.lock().save(store, session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::{FileStore, MemoryStore};
    use tempfile::TempDir;

    struct BrokenStore;
    impl MappingStore for BrokenStore {
        fn read(&self, _session_id: &str) -> std::result::Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
        fn write(&self, _session_id: &str, _blob: &[u8]) -> std::result::Result<(), StoreError> {
            Err(StoreError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[test]
    fn test_placeholder_for_is_idempotent() {
        let mut cache = PlaceholderCache::new();
        let first = cache.placeholder_for("email", "alice@test.com", "Alice@test.com");
        let second = cache.placeholder_for("email", "alice@test.com", "alice@TEST.com");
        assert_eq!(first, "[EMAIL_1]");
        assert_eq!(first, second);
        assert_eq!(cache.restore("[EMAIL_1]"), Some("Alice@test.com"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ordinals_are_per_category() {
        let mut cache = PlaceholderCache::new();
        assert_eq!(cache.placeholder_for("email", "a", "a"), "[EMAIL_1]");
        assert_eq!(cache.placeholder_for("phone", "1", "1"), "[PHONE_1]");
        assert_eq!(cache.placeholder_for("email", "b", "b"), "[EMAIL_2]");
        assert_eq!(cache.counter("email"), 2);
        assert_eq!(cache.counter("fax"), 0);
        assert_eq!(cache.lookup("phone", "1"), Some("[PHONE_1]"));
        assert_eq!(cache.lookup("phone", "2"), None);
    }

    #[test]
    fn test_mapping_reverses_every_entry() {
        let mut cache = PlaceholderCache::new();
        cache.placeholder_for("name", "Bob", "Bob");
        cache.placeholder_for("credit_card", "4111111111111111", "4111 1111 1111 1111");
        let mapping = cache.mapping();
        assert_eq!(mapping["[NAME_1]"], "Bob");
        assert_eq!(mapping["[CREDIT_CARD_1]"], "4111 1111 1111 1111");
        assert_eq!(cache.restore("[NAME_9]"), None);
    }

    #[test]
    fn test_document_round_trip_keeps_counters() {
        let mut cache = PlaceholderCache::new();
        cache.placeholder_for("email", "a@x.io", "A@x.io");
        cache.placeholder_for("email", "b@x.io", "b@x.io");
        let document = cache.to_document();
        assert_eq!(document.counters["email"], 2);
        assert_eq!(document.placeholders["email"]["a@x.io"], "[EMAIL_1]");

        let mut restored = PlaceholderCache::from_document(document).unwrap();
        assert_eq!(restored.restore("[EMAIL_1]"), Some("A@x.io"));
        assert_eq!(restored.placeholder_for("email", "c@x.io", "c@x.io"), "[EMAIL_3]");
    }

    #[test]
    fn test_from_document_rejects_inconsistent_records() {
        let mut document = MappingDocument {
            version: DOCUMENT_VERSION,
            ..Default::default()
        };
        document.placeholders.insert(
            "email".to_string(),
            [("a".to_string(), "[PHONE_1]".to_string())].into_iter().collect(),
        );
        assert!(PlaceholderCache::from_document(document).is_err());

        let mut document = MappingDocument {
            version: DOCUMENT_VERSION,
            ..Default::default()
        };
        document.placeholders.insert(
            "email".to_string(),
            [
                ("a".to_string(), "[EMAIL_1]".to_string()),
                ("b".to_string(), "[EMAIL_1]".to_string()),
            ]
            .into_iter()
            .collect(),
        );
        assert!(PlaceholderCache::from_document(document).is_err());

        let document = MappingDocument {
            version: 7,
            ..Default::default()
        };
        assert!(PlaceholderCache::from_document(document).is_err());
    }

    #[test]
    fn test_counter_repaired_from_entries() {
        let mut document = MappingDocument {
            version: DOCUMENT_VERSION,
            ..Default::default()
        };
        document.placeholders.insert(
            "phone".to_string(),
            [("5550100".to_string(), "[PHONE_4]".to_string())].into_iter().collect(),
        );
        let mut cache = PlaceholderCache::from_document(document).unwrap();
        assert_eq!(cache.counter("phone"), 4);
        assert_eq!(cache.restore("[PHONE_4]"), Some("5550100"));
        assert_eq!(cache.placeholder_for("phone", "1", "1"), "[PHONE_5]");
    }

    #[test]
    fn test_counter_kept_for_category_without_entries() {
        let document = MappingDocument {
            version: DOCUMENT_VERSION,
            counters: [("phone".to_string(), 3)].into_iter().collect(),
            ..Default::default()
        };
        let mut cache = PlaceholderCache::from_document(document).unwrap();
        assert_eq!(cache.counter("phone"), 3);
        assert_eq!(cache.placeholder_for("phone", "5550102000", "555-010-2000"), "[PHONE_4]");
        assert_eq!(cache.to_document().counters["phone"], 4);
    }

    #[test]
    fn test_save_and_load_through_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path());

        let mut cache = PlaceholderCache::new();
        cache.placeholder_for("email", "bob@example.com", "Bob@example.com");
        cache.save(&store, "doc").unwrap();

        let loaded = PlaceholderCache::load(&store, "doc");
        assert_eq!(loaded.mapping(), cache.mapping());
        assert_eq!(loaded.counter("email"), 1);
    }

    #[test]
    fn test_load_falls_back_to_empty() {
        let store = MemoryStore::new();
        assert!(PlaceholderCache::load(&store, "missing").is_empty());

        store.write("corrupt", b"{ not json").unwrap();
        assert!(PlaceholderCache::load(&store, "corrupt").is_empty());

        assert!(PlaceholderCache::load(&BrokenStore, "any").is_empty());
    }

    #[test]
    fn test_save_failure_is_surfaced() {
        let cache = PlaceholderCache::new();
        assert!(matches!(cache.save(&BrokenStore, "s"), Err(Error::Store(_))));
    }

    #[test]
    fn test_session_commit_and_discard() {
        let store = MemoryStore::new();
        {
            let mut session = Session::open(&store, "draft");
            session.cache_mut().placeholder_for("name", "Eve", "Eve");
            // dropped without commit
        }
        assert!(store.read("draft").unwrap().is_none());

        let mut session = Session::open(&store, "doc");
        session.cache_mut().placeholder_for("name", "Eve", "Eve");
        session.commit().unwrap();
        assert_eq!(session.id(), "doc");

        let reopened = Session::open(&store, "doc");
        assert_eq!(reopened.cache().restore("[NAME_1]"), Some("Eve"));
    }

    #[test]
    fn test_failed_commit_keeps_in_memory_mapping() {
        let mut session = Session::open(&BrokenStore, "doc");
        session.cache_mut().placeholder_for("name", "Eve", "Eve");
        assert!(session.commit().is_err());
        let cache = session.into_cache();
        assert_eq!(cache.restore("[NAME_1]"), Some("Eve"));
    }

    #[test]
    fn test_shared_cache_assigns_once_under_contention() {
        let shared = SharedCache::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || shared.placeholder_for("email", "same@x.io", "same@x.io"))
            })
            .collect();
        let results: BTreeSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(shared.snapshot().counter("email"), 1);
    }
}
