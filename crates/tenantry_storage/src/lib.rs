//! # Tenantry Storage
//!
//! Durable key/value persistence for the tenantry offline store.
//!
//! Each key holds exactly one JSON document. The sync engine keeps the
//! pending-change queue under one key and every entity collection under
//! its own key; this crate does not interpret those documents.
//!
//! ## Design Principles
//!
//! - Stores are whole-document: `set` replaces the value atomically
//! - Readers never observe a partially written document
//! - Must be `Send + Sync` so the engine can share one store across tasks
//! - No transactions across keys
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For testing and ephemeral sessions
//! - [`FileStore`] - One JSON file per key, crash-durable
//!
//! ## Example
//!
//! ```rust
//! use serde_json::json;
//! use tenantry_storage::{InMemoryStore, LocalStore};
//!
//! let store = InMemoryStore::new();
//! store.set("properties", &json!([{"id": "p1"}])).unwrap();
//! assert_eq!(store.get("properties").unwrap(), Some(json!([{"id": "p1"}])));
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
pub use store::{validate_key, LocalStore};
