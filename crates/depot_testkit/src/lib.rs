//! # depot testkit
//!
//! Test utilities for depot.
//!
//! This crate provides:
//! - A ready-made server on a temporary data directory ([`TestServer`])
//! - Builders for push and pull requests
//! - A store wrapper that fails on demand ([`FaultyStore`])
//! - Property-based generators for valid commit histories, plus a small
//!   model of a project tree to replay them against
//!
//! ## Usage
//!
//! ```rust
//! use depot_testkit::prelude::*;
//!
//! let server = TestServer::new();
//! let response = server.push(PushBuilder::new().add("a.txt", 1, "hello"));
//! assert_eq!(response, depot_protocol::Response::Pushed { commit_id: 1 });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
