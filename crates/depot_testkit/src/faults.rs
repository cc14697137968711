//! Fault injection for ledger stores.

use depot_storage::{CollectionStore, InMemoryStore, StorageError, StorageResult};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory store that fails on demand.
///
/// Failed inserts leave the store unchanged, like a write that never
/// reached the disk.
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_inserts: AtomicBool,
    fail_reads: AtomicBool,
    inserts: AtomicUsize,
}

impl FaultyStore {
    /// Creates a store that behaves normally until told otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following insert fail (or succeed again).
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Makes every following read fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of inserts that succeeded.
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    fn check_read(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("read"));
        }
        Ok(())
    }
}

fn injected(what: &str) -> StorageError {
    StorageError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("injected {what} failure"),
    ))
}

impl CollectionStore for FaultyStore {
    fn insert(&self, collection: &str, key: u64, value: &[u8]) -> StorageResult<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }
        self.inner.insert(collection, key, value)?;
        self.inserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, collection: &str, key: u64) -> StorageResult<Option<Vec<u8>>> {
        self.check_read()?;
        self.inner.get(collection, key)
    }

    fn last_key(&self, collection: &str) -> StorageResult<Option<u64>> {
        self.check_read()?;
        self.inner.last_key(collection)
    }

    fn range_after(&self, collection: &str, key: u64) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        self.check_read()?;
        self.inner.range_after(collection, key)
    }

    fn len(&self, collection: &str) -> StorageResult<usize> {
        self.check_read()?;
        self.inner.len(collection)
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        self.check_read()?;
        self.inner.collections()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_can_be_toggled() {
        let store = FaultyStore::new();
        store.insert("demo", 1, b"one").unwrap();

        store.fail_inserts(true);
        assert!(store.insert("demo", 2, b"two").is_err());
        assert_eq!(store.last_key("demo").unwrap(), Some(1));

        store.fail_reads(true);
        assert!(store.get("demo", 1).is_err());

        store.fail_inserts(false);
        store.fail_reads(false);
        store.insert("demo", 2, b"two").unwrap();
        assert_eq!(store.insert_count(), 2);
    }
}
