//! In-memory collection store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_collection_name, CollectionStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// An in-memory collection store.
///
/// This store keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Throwaway servers that don't need history to survive a restart
///
/// # Example
///
/// ```rust
/// use depot_storage::{CollectionStore, InMemoryStore};
///
/// let store = InMemoryStore::new();
/// store.insert("demo", 1, b"a").unwrap();
/// store.insert("demo", 2, b"b").unwrap();
/// let tail = store.range_after("demo", 1).unwrap();
/// assert_eq!(tail, vec![(2, b"b".to_vec())]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<u64, Vec<u8>>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionStore for InMemoryStore {
    fn insert(&self, collection: &str, key: u64, value: &[u8]) -> StorageResult<()> {
        validate_collection_name(collection)?;

        let mut collections = self.collections.write();
        let entries = collections.entry(collection.to_string()).or_default();
        if entries.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                key,
            });
        }
        entries.insert(key, value.to_vec());
        Ok(())
    }

    fn get(&self, collection: &str, key: u64) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|entries| entries.get(&key).cloned()))
    }

    fn last_key(&self, collection: &str) -> StorageResult<Option<u64>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|entries| entries.keys().next_back().copied()))
    }

    fn range_after(&self, collection: &str, key: u64) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        let collections = self.collections.read();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .range(key.saturating_add(1)..)
            .filter(|(k, _)| **k > key)
            .map(|(k, v)| (*k, v.clone()))
            .collect())
    }

    fn len(&self, collection: &str) -> StorageResult<usize> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len))
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .collections
            .read()
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
