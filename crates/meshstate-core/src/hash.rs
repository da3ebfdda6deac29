//! Content hashing and the `Hash` content identifier.
//!
//! Hashing is pure and synchronous: it never needs the effect system. The
//! algorithm is selected once, here, via the `ALGORITHM` constant, so the
//! rest of the workspace never hardcodes a hash function.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::errors::MeshError;

/// A cryptographic hash function suitable for content addressing.
pub trait HashAlgorithm: Send + Sync + fmt::Debug {
    /// Hash arbitrary bytes to a 32-byte digest.
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// SHA-256, NIST FIPS 180-4.
#[derive(Debug, Clone, Copy)]
pub struct Sha256Algorithm;

impl HashAlgorithm for Sha256Algorithm {
    fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }
}

/// The hash algorithm used throughout meshstate. Change this one constant to
/// re-key the whole system onto a different algorithm.
pub const ALGORITHM: Sha256Algorithm = Sha256Algorithm;

/// Hash arbitrary bytes using the global algorithm.
#[inline]
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    ALGORITHM.hash(data)
}

/// A 32-byte content hash, the identifier of a [`crate::literal::Literal`]
/// and the addressing scheme for every hashed/mutable object and operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Hash of the empty byte string, occasionally useful as a sentinel.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Hash raw bytes directly (used for literal payload hashing).
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(hash_bytes(data))
    }

    /// Hash a serializable value via its canonical DAG-CBOR encoding.
    pub fn of_value<T: Serialize>(value: &T) -> Result<Self, MeshError> {
        let bytes = crate::serialization::to_vec(value)?;
        Ok(Self::of_bytes(&bytes))
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex encoding, used in wire messages and storage keys.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hash back from hex.
    pub fn from_hex(s: &str) -> Result<Self, MeshError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(MeshError::invalid("hash must decode to 32 bytes"));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(Hash::of_bytes(b"hello"), Hash::of_bytes(b"hello"));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(Hash::of_bytes(b"a"), Hash::of_bytes(b"b"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = Hash::of_bytes(b"roundtrip");
        assert_eq!(Hash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn known_sha256_vector() {
        let empty = Hash::of_bytes(b"");
        assert_eq!(
            empty.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
