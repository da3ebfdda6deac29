//! Store-local error type, converted into `MeshError` at the crate boundary.

use meshstate_core::errors::MeshError;
use meshstate_core::effects::storage::StorageError;

/// Errors a `Store` implementation can return.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wraps a core-level error (hash mismatch, invalid input, ...).
    #[error(transparent)]
    Core(#[from] MeshError),
    /// The underlying key-value backend failed.
    #[error("storage backend error: {0}")]
    Backend(#[from] StorageError),
}

impl From<StoreError> for MeshError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Core(inner) => inner,
            StoreError::Backend(inner) => MeshError::storage(inner.to_string()),
        }
    }
}
