//! # depot protocol
//!
//! Wire types and pure algorithms for depot.
//!
//! This crate provides:
//! - The data model: [`Authority`], [`FileDiff`], [`Commit`], [`CommitRecord`]
//! - Schema validation of client JSON (required fields, safe file names)
//! - Push/pull request framing and the textual [`Response`] set
//! - The [`Archive`] transport format (file bytes plus delete markers)
//! - The diff composition engine ([`compose`], [`CompositeDiff`])
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Framing
//!
//! All integers are little-endian `i32`. A push request is
//!
//! ```text
//! [len][authority JSON][len][commit JSON][len][file-map JSON][archive bytes...]
//! ```
//!
//! and an archive is
//!
//! ```text
//! [entry count] { [name len][name][data len][data] }*
//! [delete count] { [name len][name] }*
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;
mod compose;
mod error;
pub mod framing;
mod messages;
mod model;

pub use archive::Archive;
pub use compose::{compose, CompositeDiff, NetChange};
pub use error::{ProtocolError, ProtocolResult};
pub use messages::{PullRequest, PushRequest, Response};
pub use model::{normalize_file_name, Authority, Commit, CommitRecord, DiffType, FileDiff};
