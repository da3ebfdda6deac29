//! Canonical wire encoding.
//!
//! DAG-CBOR is the single encoding used for literal payloads, wire messages,
//! and anything else that is hashed or sent over the network: it gives a
//! deterministic byte representation for a given value, which content
//! addressing depends on.

use serde::{Deserialize, Serialize};

use crate::errors::MeshError;

/// Serialize a value to its canonical DAG-CBOR bytes.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>, MeshError> {
    serde_ipld_dagcbor::to_vec(value)
        .map_err(|e| MeshError::Serialization(format!("dag-cbor encode: {e}")))
}

/// Deserialize canonical DAG-CBOR bytes back into a value.
pub fn from_slice<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, MeshError> {
    serde_ipld_dagcbor::from_slice(bytes)
        .map_err(|e| MeshError::Serialization(format!("dag-cbor decode: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Sample {
        id: u64,
        tags: Vec<String>,
    }

    #[test]
    fn roundtrip() {
        let s = Sample {
            id: 7,
            tags: vec!["a".into(), "b".into()],
        };
        let bytes = to_vec(&s).unwrap();
        let back: Sample = from_slice(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn encoding_is_deterministic() {
        let s = Sample {
            id: 7,
            tags: vec!["a".into(), "b".into()],
        };
        assert_eq!(to_vec(&s).unwrap(), to_vec(&s).unwrap());
    }
}
