//! Raw key-value storage effects. The `Store` contract from spec.md §4.1
//! (literal save/load, reference indexing, terminal-ops tracking,
//! `watchReferences`) is built on top of this trait in `meshstate-store`.

use async_trait::async_trait;
use std::collections::HashMap;

/// Storage operation errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read data.
    #[error("failed to read: {0}")]
    ReadFailed(String),
    /// Failed to write data.
    #[error("failed to write: {0}")]
    WriteFailed(String),
    /// Key not found.
    #[error("key not found: {0}")]
    NotFound(String),
}

/// Key-value storage effects, implemented by an in-memory or on-disk
/// backend in `meshstate-store`.
#[async_trait]
pub trait StorageEffects: Send + Sync {
    /// Store a value under the given key.
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Retrieve a value by key.
    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a key-value pair. Returns whether the key was present.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// List all keys with an optional prefix filter.
    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError>;

    /// Check whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Store multiple key-value pairs.
    async fn store_batch(&self, pairs: HashMap<String, Vec<u8>>) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: StorageEffects + ?Sized> StorageEffects for std::sync::Arc<T> {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        (**self).store(key, value).await
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).retrieve(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        (**self).remove(key).await
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        (**self).list_keys(prefix).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        (**self).exists(key).await
    }

    async fn store_batch(&self, pairs: HashMap<String, Vec<u8>>) -> Result<(), StorageError> {
        (**self).store_batch(pairs).await
    }
}
