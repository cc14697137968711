//! # depot server
//!
//! Server side of depot: clients push commits, the server applies them to
//! the project tree and records them; clients later pull the net effect of
//! everything since their last commit as one archive.
//!
//! This crate provides:
//! - The access gate (project + token check, uniform "not found")
//! - The commit ledger over any [`depot_storage::CollectionStore`]
//! - Transactional diff application with snapshot/rollback
//! - Per-project single-writer locking
//! - Push/pull handlers and async stream entry points
//!
//! # Consistency
//!
//! A commit is recorded if and only if every one of its file operations was
//! applied. Apply and ledger append run as one critical section per project;
//! if either fails, every touched file is restored before the error is
//! reported. Pulls read the ledger and the tree under the same lock, so they
//! see a project either before or after a push, never halfway.
//!
//! # Example
//!
//! ```rust,no_run
//! use depot_server::{ServerConfig, SyncServer};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::load("serversettings.json".as_ref())?;
//! let server = SyncServer::open(config)?;
//!
//! let body = br#"{"Authority":{"ProjectName":"demo","AccessToken":"t","Username":"sam"},"CommitId":0}"#;
//! let mut reply = Vec::new();
//! server.serve_pull(body, &mut reply).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod apply;
mod auth;
mod config;
mod error;
mod handler;
mod ledger;
mod locks;
mod server;
mod tree;

pub use apply::{apply_commit, recover_pending, ApplyGuard, ApplyIntent, RecoveryReport};
pub use auth::AccessGate;
pub use config::{ProjectConfig, ProjectStore, ProjectsSettings, ServerConfig, DEFAULT_MAX_PUSH_BYTES};
pub use error::{ApplyError, LedgerError, ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler};
pub use ledger::CommitLedger;
pub use locks::ProjectLocks;
pub use server::SyncServer;
pub use tree::ProjectTree;
