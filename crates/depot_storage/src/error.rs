//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value already exists under this key.
    #[error("duplicate key {key} in collection '{collection}'")]
    DuplicateKey {
        /// The collection that was written to.
        collection: String,
        /// The key that already exists.
        key: u64,
    },

    /// The collection name cannot be used as a storage name.
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),

    /// A stored record failed its checksum.
    #[error("checksum mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Offset of the record within its log.
        offset: u64,
        /// Checksum stored with the record.
        expected: u32,
        /// Checksum computed over the record.
        actual: u32,
    },

    /// The storage is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store directory.
    #[error("store directory is locked by another process")]
    Locked,
}
