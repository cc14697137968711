//! CLI error type.

use depot_server::{LedgerError, ServerError};
use depot_storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The data directory has no ledger.
    #[error("no ledger found at {}", .0.display())]
    NoLedger(PathBuf),

    /// The ledger store could not be opened.
    #[error("cannot open ledger: {0}")]
    Storage(#[from] StorageError),

    /// Reading history failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Settings or tree access failed.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// JSON output could not be produced.
    #[error("json output failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Verification found problems.
    #[error("verification failed: {0} problem(s)")]
    Verification(usize),
}
