//! # depot storage
//!
//! Ordered key/value collection stores for depot.
//!
//! A store holds any number of named collections; each collection maps
//! `u64` keys to opaque byte values and is iterated in ascending key order.
//! The commit ledger keeps one collection per project and never interprets
//! anything below that.
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral servers
//! - [`FileStore`] - Append-only, checksummed logs on disk
//!
//! ## Example
//!
//! ```rust
//! use depot_storage::{CollectionStore, InMemoryStore};
//!
//! let store = InMemoryStore::new();
//! store.insert("demo", 1, b"first").unwrap();
//! assert_eq!(store.last_key("demo").unwrap(), Some(1));
//! assert_eq!(store.get("demo", 1).unwrap().as_deref(), Some(&b"first"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::{validate_collection_name, CollectionStore};
