//! Per-project commit ledger.

use crate::error::LedgerError;
use depot_protocol::{Commit, CommitRecord};
use depot_storage::CollectionStore;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

/// Latest recorded version per file name.
type VersionIndex = HashMap<String, u32>;

/// Append-only commit history, one collection per project.
///
/// Records are keyed by commit id and stored as CBOR. The ledger assumes
/// it is the only writer of a project's collection while the project lock
/// is held; it does no locking of its own.
///
/// The latest version of every file is indexed in memory. A project's index
/// is built from its history on first use and kept current by every append
/// made through this ledger (or a clone of it).
///
/// # Invariants
///
/// - Commit ids are 1, 2, 3, ... with no gaps
/// - A record never changes after it is appended
/// - Every file version in a record exceeds the previous version of that file
#[derive(Clone)]
pub struct CommitLedger {
    store: Arc<dyn CollectionStore>,
    versions: Arc<Mutex<HashMap<String, VersionIndex>>>,
}

impl CommitLedger {
    /// Creates a ledger over `store`.
    pub fn new(store: Arc<dyn CollectionStore>) -> Self {
        Self {
            store,
            versions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the id of the latest commit, or 0 for an empty history.
    pub fn head(&self, project: &str) -> Result<u32, LedgerError> {
        match self.store.last_key(project)? {
            None => Ok(0),
            Some(key) => u32::try_from(key).map_err(|_| LedgerError::IdOverflow(project.to_string())),
        }
    }

    /// Returns the id the next appended commit will receive.
    pub fn next_commit_id(&self, project: &str) -> Result<u32, LedgerError> {
        let head = self.head(project)?;
        // Ids travel as i32 on the wire.
        if head >= i32::MAX as u32 {
            return Err(LedgerError::IdOverflow(project.to_string()));
        }
        Ok(head + 1)
    }

    /// Records `commit` as the next commit of `project`.
    ///
    /// Returns the stored record with its assigned id. The write is durable
    /// when this returns `Ok`.
    pub fn append(&self, project: &str, commit: &Commit) -> Result<CommitRecord, LedgerError> {
        let commit_id = self.next_commit_id(project)?;
        let record = CommitRecord::from_commit(commit_id, commit);
        self.append_record(project, &record)?;
        Ok(record)
    }

    /// Stores a fully formed record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Gap`] unless `record.commit_id` is exactly the
    /// next id.
    pub fn append_record(&self, project: &str, record: &CommitRecord) -> Result<(), LedgerError> {
        let expected = self.next_commit_id(project)?;
        if record.commit_id != expected {
            return Err(LedgerError::Gap {
                project: project.to_string(),
                expected: u64::from(expected),
                found: u64::from(record.commit_id),
            });
        }

        let mut payload = Vec::new();
        ciborium::into_writer(record, &mut payload).map_err(|e| LedgerError::Encode {
            commit_id: record.commit_id,
            reason: e.to_string(),
        })?;

        self.store
            .insert(project, u64::from(record.commit_id), &payload)?;

        if let Some(index) = self.versions.lock().get_mut(project) {
            for diff in &record.files {
                index.insert(diff.file_name.clone(), diff.version);
            }
        }
        Ok(())
    }

    /// Returns one record by id.
    pub fn record(&self, project: &str, commit_id: u32) -> Result<Option<CommitRecord>, LedgerError> {
        self.store
            .get(project, u64::from(commit_id))?
            .map(|bytes| decode(u64::from(commit_id), &bytes))
            .transpose()
    }

    /// Returns every record with id greater than `since`, ascending.
    ///
    /// `since` at or beyond the head yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Gap`] if the stored ids are not contiguous.
    pub fn range_since(&self, project: &str, since: u32) -> Result<Vec<CommitRecord>, LedgerError> {
        let entries = self.store.range_after(project, u64::from(since))?;
        let mut records = Vec::with_capacity(entries.len());
        let mut expected = u64::from(since) + 1;

        for (key, bytes) in entries {
            if key != expected {
                return Err(LedgerError::Gap {
                    project: project.to_string(),
                    expected,
                    found: key,
                });
            }
            let record = decode(key, &bytes)?;
            if u64::from(record.commit_id) != key {
                return Err(LedgerError::Decode {
                    commit_id: key,
                    reason: format!("record claims id {}", record.commit_id),
                });
            }
            records.push(record);
            expected += 1;
        }

        Ok(records)
    }

    /// Returns the latest recorded version of every file in `project`.
    pub fn latest_versions(&self, project: &str) -> Result<VersionIndex, LedgerError> {
        self.with_versions(project, VersionIndex::clone)
    }

    /// Returns the latest recorded version of one file, if it was ever
    /// committed.
    pub fn recorded_version(&self, project: &str, file_name: &str) -> Result<Option<u32>, LedgerError> {
        self.with_versions(project, |index| index.get(file_name).copied())
    }

    fn with_versions<T>(
        &self,
        project: &str,
        f: impl FnOnce(&VersionIndex) -> T,
    ) -> Result<T, LedgerError> {
        // Held while scanning so an append cannot slip between scan and insert.
        let mut cache = self.versions.lock();
        let index = match cache.entry(project.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.scan_versions(project)?),
        };
        Ok(f(index))
    }

    fn scan_versions(&self, project: &str) -> Result<VersionIndex, LedgerError> {
        let mut index = VersionIndex::new();
        for record in self.range_since(project, 0)? {
            for diff in record.files {
                index.insert(diff.file_name, diff.version);
            }
        }
        Ok(index)
    }

    /// Checks the full history of `project`.
    ///
    /// Returns the number of commits on success.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Gap`] for missing ids and
    /// [`LedgerError::VersionNotIncreasing`] if a file version fails to grow.
    pub fn verify(&self, project: &str) -> Result<usize, LedgerError> {
        let records = self.range_since(project, 0)?;
        let mut versions: HashMap<&str, u32> = HashMap::new();

        for record in &records {
            for diff in &record.files {
                if let Some(previous) = versions.insert(diff.file_name.as_str(), diff.version) {
                    if diff.version <= previous {
                        return Err(LedgerError::VersionNotIncreasing {
                            project: project.to_string(),
                            commit_id: record.commit_id,
                            file_name: diff.file_name.clone(),
                        });
                    }
                }
            }
        }

        Ok(records.len())
    }

    /// Returns the names of projects that have at least one commit.
    pub fn projects(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.store.collections()?)
    }
}

impl std::fmt::Debug for CommitLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLedger").finish_non_exhaustive()
    }
}

fn decode(commit_id: u64, bytes: &[u8]) -> Result<CommitRecord, LedgerError> {
    ciborium::from_reader(bytes).map_err(|e| LedgerError::Decode {
        commit_id,
        reason: e.to_string(),
    })
}
