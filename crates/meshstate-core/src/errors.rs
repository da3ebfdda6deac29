//! Unified error type for the meshstate workspace.

use thiserror::Error;

/// Standard result type for meshstate operations.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type returned by meshstate crates.
///
/// Every crate in the workspace maps its local error enum into this type at
/// its public boundary, the same way `aura-core`'s `AuraError` is the single
/// error surface for the Aura workspace.
#[derive(Error, Debug, Clone)]
pub enum MeshError {
    /// Input failed validation before any state was touched.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// A referenced object, literal, or operation does not exist in the store.
    #[error("not found: {0}")]
    NotFound(String),

    /// A computed hash did not match the hash a value was addressed by.
    #[error("hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch {
        /// Hash the value claimed to have.
        expected: String,
        /// Hash actually computed from the value's bytes.
        computed: String,
    },

    /// An ownership proof failed verification.
    #[error("invalid ownership proof for {0}")]
    InvalidOwnershipProof(String),

    /// A mutation op was rejected by its target class's acceptance rule.
    #[error("unacceptable op: {0}")]
    UnacceptableOp(String),

    /// An operation references a dependency chain that cannot be validated.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// A message arrived addressed to the wrong mutable object or peer group.
    #[error("wrong target: {0}")]
    WrongTarget(String),

    /// Cryptographic operation failed (signature verification, hashing).
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Encoding or decoding a value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying store failed a read or write.
    #[error("storage error: {0}")]
    Storage(String),

    /// Sending or receiving a peer message failed.
    #[error("peer message send failure: {0}")]
    PeerMessageSendFailure(String),

    /// An operation did not complete before its deadline.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// Timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Catch-all for conditions that should not arise given the invariants
    /// documented at the call site.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MeshError {
    /// Construct an [`MeshError::Invalid`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Construct an [`MeshError::NotFound`].
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Construct an [`MeshError::Storage`].
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Construct an [`MeshError::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the operation that produced this error might succeed
    /// without any corrective action (a transient condition).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PeerMessageSendFailure(_) | Self::Timeout { .. } | Self::Storage(_)
        )
    }

    /// Coarse category, useful for metrics and logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "invalid",
            Self::NotFound(_) => "not_found",
            Self::HashMismatch { .. } => "hash_mismatch",
            Self::InvalidOwnershipProof(_) => "ownership_proof",
            Self::UnacceptableOp(_) => "unacceptable_op",
            Self::MissingDependency(_) => "missing_dependency",
            Self::WrongTarget(_) => "wrong_target",
            Self::Crypto(_) => "crypto",
            Self::Serialization(_) => "serialization",
            Self::Storage(_) => "storage",
            Self::PeerMessageSendFailure(_) => "peer_send",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<serde_json::Error> for MeshError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for MeshError {
    fn from(e: hex::FromHexError) -> Self {
        Self::Invalid(format!("hex decode: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(MeshError::storage("disk full").is_retryable());
        assert!(!MeshError::invalid("bad field").is_retryable());
    }

    #[test]
    fn category_matches_variant() {
        assert_eq!(MeshError::not_found("x").category(), "not_found");
        assert_eq!(
            MeshError::InvalidOwnershipProof("h".into()).category(),
            "ownership_proof"
        );
    }
}
