//! Sync-local error type, converted into `MeshError` at the crate boundary.

use meshstate_core::MeshError;
use meshstate_store::StoreError;

/// Errors the state-gossip and terminal-ops sync agents can return.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Wraps a core-level error.
    #[error(transparent)]
    Core(#[from] MeshError),
    /// Wraps a store-level error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A request-objs `dependencyChain` did not validate (R1).
    #[error("invalid dependency chain for {0}")]
    InvalidDependencyChain(String),
    /// An omitted dependency arrived without a valid ownership proof (R2).
    #[error("missing or invalid ownership proof for {0}")]
    InvalidOwnershipProof(String),
    /// More than two concurrent requests for the same hash from distinct
    /// peers (spec.md §4.5 "backpressure").
    #[error("backpressure: too many concurrent requesters for {0}")]
    BackPressure(String),
    /// A wire message could not be serialized or deserialized.
    #[error("wire codec error: {0}")]
    Codec(String),
    /// Sending to a peer failed.
    #[error("peer send failed: {0}")]
    PeerSend(String),
}

impl From<SyncError> for MeshError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::Core(inner) => inner,
            SyncError::Store(inner) => inner.into(),
            SyncError::InvalidDependencyChain(msg) => MeshError::MissingDependency(msg),
            SyncError::InvalidOwnershipProof(msg) => MeshError::InvalidOwnershipProof(msg),
            SyncError::BackPressure(msg) => MeshError::Invalid(format!("backpressure: {msg}")),
            SyncError::Codec(msg) => MeshError::Serialization(msg),
            SyncError::PeerSend(msg) => MeshError::PeerMessageSendFailure(msg),
        }
    }
}
