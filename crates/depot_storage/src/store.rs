//! Collection store trait definition.

use crate::error::{StorageError, StorageResult};

/// A durable store of named, ordered key/value collections.
///
/// Values are **opaque bytes**. Callers own the encoding of whatever they put
/// in a collection; the store only guarantees ordering and durability.
///
/// # Invariants
///
/// - A key is written at most once per collection (`insert` never overwrites)
/// - `insert` is durable when it returns `Ok`
/// - `range_after` yields entries in ascending key order
/// - A collection that was never written to behaves as empty
/// - Stores must be `Send + Sync` so one instance can serve every project
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
pub trait CollectionStore: Send + Sync {
    /// Inserts `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DuplicateKey`] if the key is already present,
    /// [`StorageError::InvalidCollection`] for unusable names, or an I/O error.
    fn insert(&self, collection: &str, key: u64, value: &[u8]) -> StorageResult<()>;

    /// Returns the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be read back.
    fn get(&self, collection: &str, key: u64) -> StorageResult<Option<Vec<u8>>>;

    /// Returns the greatest key in the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be inspected.
    fn last_key(&self, collection: &str) -> StorageResult<Option<u64>>;

    /// Returns every entry whose key is strictly greater than `key`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if any value cannot be read back.
    fn range_after(&self, collection: &str, key: u64) -> StorageResult<Vec<(u64, Vec<u8>)>>;

    /// Returns the number of entries in the collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be inspected.
    fn len(&self, collection: &str) -> StorageResult<usize>;

    /// Returns the names of all non-empty collections, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be listed.
    fn collections(&self) -> StorageResult<Vec<String>>;
}

/// Checks that `name` can be used as a collection name.
///
/// Names must be non-empty, must not start with `.`, and may only contain
/// ASCII letters, digits, `_`, `-` and `.`. File-backed stores use the name
/// as a file stem.
///
/// # Errors
///
/// Returns [`StorageError::InvalidCollection`] for anything else.
pub fn validate_collection_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidCollection(name.to_string()))
    }
}
