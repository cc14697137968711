//! File-backed collection store.
//!
//! Layout of a store directory:
//!
//! ```text
//! <store>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ demo.col          # Append-only log for collection "demo"
//! └─ assets.col        # Append-only log for collection "assets"
//! ```
//!
//! Each log is a sequence of records:
//!
//! ```text
//! | magic "DCOL" (4) | key u64 LE (8) | len u32 LE (4) | payload (len) | crc32 (4) |
//! ```
//!
//! The CRC covers header and payload. On open every log is scanned and an
//! in-memory index of key -> record location is rebuilt.

use crate::error::{StorageError, StorageResult};
use crate::store::{validate_collection_name, CollectionStore};
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_FILE: &str = "LOCK";
const LOG_EXTENSION: &str = "col";
const RECORD_MAGIC: [u8; 4] = *b"DCOL";
const HEADER_SIZE: usize = 16;
const CRC_SIZE: usize = 4;

/// Lookup table for the reflected IEEE CRC32 polynomial.
const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut value = n as u32;
        let mut bit = 0;
        while bit < 8 {
            value = if value & 1 == 1 {
                (value >> 1) ^ 0xEDB8_8320
            } else {
                value >> 1
            };
            bit += 1;
        }
        table[n] = value;
        n += 1;
    }
    table
};

/// IEEE CRC32 of a record's header and payload.
fn record_checksum(bytes: &[u8]) -> u32 {
    !bytes.iter().fold(u32::MAX, |crc, &byte| {
        CRC_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
    })
}

/// A durable collection store backed by one append-only log per collection.
///
/// # Durability
///
/// Every `insert` is followed by `File::sync_data()`. A write that fails
/// halfway is truncated away before the error is returned, so a failed insert
/// leaves no trace. A record torn by a crash is dropped (with a warning) the
/// next time the store is opened.
///
/// # Concurrency
///
/// The directory is guarded by an exclusive advisory lock: a second
/// `FileStore` for the same directory fails with [`StorageError::Locked`].
/// Within the process, all collections share one mutex.
///
/// # Example
///
/// ```no_run
/// use depot_storage::{CollectionStore, FileStore};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("data/ledger")).unwrap();
/// store.insert("demo", 1, b"record").unwrap();
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    logs: Mutex<HashMap<String, CollectionLog>>,
    _lock_file: File,
}

#[derive(Debug)]
struct CollectionLog {
    file: File,
    size: u64,
    index: BTreeMap<u64, RecordLocation>,
}

#[derive(Debug, Clone, Copy)]
struct RecordLocation {
    /// Offset of the payload (not the header).
    offset: u64,
    len: u32,
}

impl FileStore {
    /// Opens or creates a store in `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created or listed
    /// - Another process holds the lock ([`StorageError::Locked`])
    /// - A log is corrupted beyond a torn tail
    pub fn open(path: &Path) -> StorageResult<Self> {
        fs::create_dir_all(path)?;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut logs = HashMap::new();
        for entry in fs::read_dir(path)? {
            let entry_path = entry?.path();
            if entry_path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(name) = entry_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_collection_name(name).is_err() {
                warn!(path = %entry_path.display(), "ignoring log with unusable name");
                continue;
            }

            let log = CollectionLog::recover(&entry_path)?;
            debug!(collection = name, records = log.index.len(), "recovered collection log");
            logs.insert(name.to_string(), log);
        }

        Ok(Self {
            path: path.to_path_buf(),
            logs: Mutex::new(logs),
            _lock_file: lock_file,
        })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn log_path(&self, collection: &str) -> PathBuf {
        self.path.join(format!("{collection}.{LOG_EXTENSION}"))
    }
}

impl CollectionLog {
    fn create(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            file,
            size: 0,
            index: BTreeMap::new(),
        })
    }

    /// Opens an existing log, rebuilds its index and drops a torn tail.
    fn recover(path: &Path) -> StorageResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let mut index = BTreeMap::new();
        let mut offset = 0usize;

        while data.len() - offset >= HEADER_SIZE {
            let header = &data[offset..offset + HEADER_SIZE];
            if header[0..4] != RECORD_MAGIC {
                return Err(StorageError::Corrupted(format!(
                    "invalid record magic at offset {offset} in {}",
                    path.display()
                )));
            }

            let key = u64::from_le_bytes([
                header[4], header[5], header[6], header[7], header[8], header[9], header[10],
                header[11],
            ]);
            let len = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
            let total = HEADER_SIZE + len as usize + CRC_SIZE;

            if data.len() - offset < total {
                break;
            }

            let crc_start = offset + HEADER_SIZE + len as usize;
            let stored = u32::from_le_bytes([
                data[crc_start],
                data[crc_start + 1],
                data[crc_start + 2],
                data[crc_start + 3],
            ]);
            let computed = record_checksum(&data[offset..crc_start]);
            if stored != computed {
                return Err(StorageError::ChecksumMismatch {
                    offset: offset as u64,
                    expected: stored,
                    actual: computed,
                });
            }

            let location = RecordLocation {
                offset: (offset + HEADER_SIZE) as u64,
                len,
            };
            if index.insert(key, location).is_some() {
                return Err(StorageError::Corrupted(format!(
                    "key {key} written twice in {}",
                    path.display()
                )));
            }

            offset += total;
        }

        if offset < data.len() {
            warn!(
                path = %path.display(),
                valid_len = offset,
                file_len = data.len(),
                "truncating torn record at end of log"
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(Self {
            file,
            size: offset as u64,
            index,
        })
    }

    fn append(&mut self, key: u64, value: &[u8]) -> StorageResult<()> {
        let len = u32::try_from(value.len()).map_err(|_| {
            StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("value of {} bytes exceeds record limit", value.len()),
            ))
        })?;

        let mut record = Vec::with_capacity(HEADER_SIZE + value.len() + CRC_SIZE);
        record.extend_from_slice(&RECORD_MAGIC);
        record.extend_from_slice(&key.to_le_bytes());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(value);
        let crc = record_checksum(&record);
        record.extend_from_slice(&crc.to_le_bytes());

        let start = self.size;
        if let Err(err) = self.write_record(start, &record) {
            if let Err(truncate_err) = self.file.set_len(start) {
                warn!(error = %truncate_err, "failed to drop partially written record");
            }
            return Err(err);
        }

        self.size = start + record.len() as u64;
        self.index.insert(
            key,
            RecordLocation {
                offset: start + HEADER_SIZE as u64,
                len,
            },
        );
        Ok(())
    }

    fn write_record(&mut self, start: u64, record: &[u8]) -> StorageResult<()> {
        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(record)?;
        self.file.sync_data()?;
        Ok(())
    }

    fn read(&mut self, location: RecordLocation) -> StorageResult<Vec<u8>> {
        let mut buffer = vec![0u8; location.len as usize];
        self.file.seek(SeekFrom::Start(location.offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl CollectionStore for FileStore {
    fn insert(&self, collection: &str, key: u64, value: &[u8]) -> StorageResult<()> {
        validate_collection_name(collection)?;

        let mut logs = self.logs.lock();
        if !logs.contains_key(collection) {
            let log = CollectionLog::create(&self.log_path(collection))?;
            logs.insert(collection.to_string(), log);
        }
        let Some(log) = logs.get_mut(collection) else {
            return Err(StorageError::Corrupted(format!(
                "collection '{collection}' vanished while inserting"
            )));
        };

        if log.index.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                collection: collection.to_string(),
                key,
            });
        }

        log.append(key, value)
    }

    fn get(&self, collection: &str, key: u64) -> StorageResult<Option<Vec<u8>>> {
        let mut logs = self.logs.lock();
        let Some(log) = logs.get_mut(collection) else {
            return Ok(None);
        };
        let Some(location) = log.index.get(&key).copied() else {
            return Ok(None);
        };
        log.read(location).map(Some)
    }

    fn last_key(&self, collection: &str) -> StorageResult<Option<u64>> {
        Ok(self
            .logs
            .lock()
            .get(collection)
            .and_then(|log| log.index.keys().next_back().copied()))
    }

    fn range_after(&self, collection: &str, key: u64) -> StorageResult<Vec<(u64, Vec<u8>)>> {
        let mut logs = self.logs.lock();
        let Some(log) = logs.get_mut(collection) else {
            return Ok(Vec::new());
        };

        let locations: Vec<(u64, RecordLocation)> = log
            .index
            .range(key.saturating_add(1)..)
            .filter(|(k, _)| **k > key)
            .map(|(k, loc)| (*k, *loc))
            .collect();

        locations
            .into_iter()
            .map(|(k, loc)| Ok((k, log.read(loc)?)))
            .collect()
    }

    fn len(&self, collection: &str) -> StorageResult<usize> {
        Ok(self
            .logs
            .lock()
            .get(collection)
            .map_or(0, |log| log.index.len()))
    }

    fn collections(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self
            .logs
            .lock()
            .iter()
            .filter(|(_, log)| !log.index.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
