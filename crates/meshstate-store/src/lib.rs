//! # meshstate-store — the `Store` contract
//!
//! Content-addressed literal persistence, reference indexing, and
//! terminal-ops (DAG frontier) tracking, layered over the raw
//! `StorageEffects` key-value trait from `meshstate-core` the way
//! `aura-anti-entropy`'s `PersistentSyncHandler` layers sync state over a
//! storage backend.

#![forbid(unsafe_code)]

pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{OpHeader, ReferenceEvent, ReferenceWatch, Store};
