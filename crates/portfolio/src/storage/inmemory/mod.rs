//! In-memory storage backend for testing.
//!
//! Records live in a `BTreeMap` wrapped in `Arc<RwLock<_>>`. Nothing is
//! persisted; clones share the same data.
//!
//! # Example
//!
//! ```rust,ignore
//! use portfolio::storage::inmemory::InMemoryStore;
//!
//! let store = InMemoryStore::new();
//! // Hand the store to a repository...
//! ```

mod store;

pub use store::InMemoryStore;
