//! CLI command implementations.

pub mod diff;
pub mod log;
pub mod projects;
pub mod verify;

use crate::error::CliError;
use depot_server::{CommitLedger, ServerConfig};
use depot_storage::FileStore;
use std::path::Path;
use std::sync::Arc;

/// Opens the ledger of the data directory at `data`.
pub fn open_ledger(data: &Path) -> Result<CommitLedger, CliError> {
    let ledger_dir = ServerConfig::new(data).ledger_dir();
    if !ledger_dir.is_dir() {
        return Err(CliError::NoLedger(ledger_dir));
    }
    let store = FileStore::open(&ledger_dir)?;
    Ok(CommitLedger::new(Arc::new(store)))
}
