//! Error types for the server.

use depot_protocol::{ProtocolError, Response};
use depot_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors raised while applying a commit to a project tree.
///
/// Every variant except [`ApplyError::RollbackFailed`] guarantees that the
/// tree was restored to its pre-apply state.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// The commit names a file the archive does not carry.
    #[error("archive has no content for {0}")]
    MissingEntry(String),

    /// A version is not newer than the one already recorded for the file.
    #[error("version {version} of {file_name} is not newer than recorded version {recorded}")]
    StaleVersion {
        /// File the commit touches.
        file_name: String,
        /// Version carried by the commit.
        version: u32,
        /// Latest version in the ledger.
        recorded: u32,
    },

    /// A file name could not be mapped into the project directory.
    #[error("invalid path {0}")]
    InvalidPath(String),

    /// A filesystem operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being touched.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Restoring snapshots failed; the tree may differ from its prior state.
    #[error("rollback incomplete: {0}")]
    RollbackFailed(String),
}

impl ApplyError {
    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// Names the failure that started a rollback which itself failed.
    ///
    /// Other variants are returned unchanged.
    #[must_use]
    pub fn after(self, cause: &dyn std::fmt::Display) -> Self {
        match self {
            Self::RollbackFailed(failures) => {
                Self::RollbackFailed(format!("{failures} (rolling back after: {cause})"))
            }
            other => other,
        }
    }
}

/// Errors raised by the commit ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A record could not be serialized.
    #[error("failed to encode commit {commit_id}: {reason}")]
    Encode {
        /// Commit being written.
        commit_id: u32,
        /// Encoder message.
        reason: String,
    },

    /// A stored record could not be read back.
    #[error("failed to decode commit {commit_id}: {reason}")]
    Decode {
        /// Key of the stored record.
        commit_id: u64,
        /// Decoder message.
        reason: String,
    },

    /// Commit ids are not the contiguous sequence 1..N.
    #[error("ledger gap in {project}: expected commit {expected}, found {found}")]
    Gap {
        /// Project whose history is broken.
        project: String,
        /// Id that should come next.
        expected: u64,
        /// Id actually found.
        found: u64,
    },

    /// A recorded file version does not exceed the one before it.
    #[error("commit {commit_id} in {project} does not advance the version of {file_name}")]
    VersionNotIncreasing {
        /// Project being checked.
        project: String,
        /// Offending commit.
        commit_id: u32,
        /// File whose version went backwards or repeated.
        file_name: String,
    },

    /// No more commit ids fit the wire format.
    #[error("commit id space exhausted for {0}")]
    IdOverflow(String),
}

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed framing or payload.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Unknown project or token mismatch. Deliberately carries no detail.
    #[error("project not found")]
    NotFound,

    /// Applying the commit failed and the tree was rolled back.
    #[error("apply failed: {0}")]
    Apply(#[from] ApplyError),

    /// Recording the commit failed and the tree was rolled back.
    #[error("ledger failed: {0}")]
    Ledger(#[from] LedgerError),

    /// Settings could not be loaded or are inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error outside of apply (connection, tree reads).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Maps the error to the reply a client receives.
    ///
    /// Replies never contain error detail.
    pub fn response(&self) -> Response {
        match self {
            ServerError::NotFound => Response::ProjectNotFound,
            ServerError::Apply(_) | ServerError::Ledger(_) => Response::UpdateFailed,
            ServerError::Protocol(_)
            | ServerError::Config(_)
            | ServerError::Io(_)
            | ServerError::Internal(_) => Response::ProtocolFailure,
        }
    }

    /// Returns true if the client caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::Protocol(_)
                | ServerError::NotFound
                | ServerError::Apply(ApplyError::MissingEntry(_))
                | ServerError::Apply(ApplyError::StaleVersion { .. })
        )
    }

    /// Returns true if the server is at fault.
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
