//! The literal codec: canonicalizing a value into a hash-addressed record.

use serde::{Deserialize, Serialize};

use crate::errors::MeshError;
use crate::hash::Hash;

/// Whether a dependency is embedded structurally (`subobject`) or merely
/// referenced by hash (`reference`).
///
/// Reference-type dependencies are the ones eligible for ownership-proof
/// omission when serializing a [`crate::object::Context`] (spec.md §4.5,
/// "for every *reference*-type ... dependency").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencyType {
    /// Structurally embedded child value.
    Subobject,
    /// Pointer-only reference to another hashed object.
    Reference,
}

/// One entry in a literal's dependency list: the hash of a nested value,
/// where in the canonical value tree it occurs, and whether it is embedded
/// or merely referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Hash of the dependency.
    pub hash: Hash,
    /// Path into the canonical value tree where this dependency occurs
    /// (dot-separated field path, e.g. `"payload.members.2"`).
    pub path: String,
    /// Subobject or reference.
    pub dep_type: DependencyType,
}

impl Dependency {
    /// Construct a reference-type dependency.
    pub fn reference(hash: Hash, path: impl Into<String>) -> Self {
        Self {
            hash,
            path: path.into(),
            dep_type: DependencyType::Reference,
        }
    }

    /// Construct a subobject-type dependency.
    pub fn subobject(hash: Hash, path: impl Into<String>) -> Self {
        Self {
            hash,
            path: path.into(),
            dep_type: DependencyType::Subobject,
        }
    }
}

/// A signature binding a literal to an authoring identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Identity of the signer (opaque to this crate; cryptographic signing
    /// itself is an external collaborator per spec.md §1).
    pub signer: crate::identifiers::AuthorId,
    /// Opaque signature bytes over `value`.
    pub bytes: Vec<u8>,
}

/// Canonical serialized form of a hashed object: `{ hash, value, dependencies,
/// signatures }` from spec.md §3.
///
/// Invariant: `hash == H(value)`, and every dependency's hash must be
/// reachable from `value` at the declared `path`. [`Literal::canonicalize`]
/// is the only constructor that can produce a literal satisfying this
/// invariant from raw parts; [`Literal::verify_hash`] re-checks it for
/// literals arriving over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Literal {
    /// Content hash of `value`.
    pub hash: Hash,
    /// Canonical DAG-CBOR encoding of the value.
    pub value: Vec<u8>,
    /// Ordered dependency list.
    pub dependencies: Vec<Dependency>,
    /// Signatures over `value`.
    pub signatures: Vec<Signature>,
}

impl Literal {
    /// Canonicalize a serializable value into a literal, computing its hash.
    ///
    /// The caller supplies `dependencies` and `signatures`; this function's
    /// only responsibility is the `hash = H(value)` invariant (the fields
    /// this module's name comes from — "the literal codec").
    pub fn canonicalize<T: Serialize>(
        value: &T,
        dependencies: Vec<Dependency>,
        signatures: Vec<Signature>,
    ) -> Result<Self, MeshError> {
        let bytes = crate::serialization::to_vec(value)?;
        let hash = Hash::of_bytes(&bytes);
        Ok(Self {
            hash,
            value: bytes,
            dependencies,
            signatures,
        })
    }

    /// Decode the canonical value back into `T`.
    pub fn materialize<T: for<'de> Deserialize<'de>>(&self) -> Result<T, MeshError> {
        crate::serialization::from_slice(&self.value)
    }

    /// Recompute the hash of `value` and check it against `self.hash`.
    ///
    /// Every literal received over the wire must pass this check before
    /// being trusted (spec.md §7, `HashMismatch`).
    pub fn verify_hash(&self) -> Result<(), MeshError> {
        let computed = Hash::of_bytes(&self.value);
        if computed != self.hash {
            return Err(MeshError::HashMismatch {
                expected: self.hash.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    /// Whether this literal declares no signatures, which is itself a
    /// rejection condition for mutation ops (spec.md §4.1, "missing
    /// signatures").
    pub fn is_unsigned(&self) -> bool {
        self.signatures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Payload {
        a: u32,
        b: String,
    }

    #[test]
    fn canonicalize_then_materialize_is_identity() {
        let payload = Payload {
            a: 5,
            b: "hi".into(),
        };
        let lit = Literal::canonicalize(&payload, vec![], vec![]).unwrap();
        let back: Payload = lit.materialize().unwrap();
        assert_eq!(back.a, 5);
        assert_eq!(back.b, "hi");
    }

    #[test]
    fn verify_hash_detects_tamper() {
        let payload = Payload {
            a: 5,
            b: "hi".into(),
        };
        let mut lit = Literal::canonicalize(&payload, vec![], vec![]).unwrap();
        assert!(lit.verify_hash().is_ok());
        lit.value.push(0xff);
        assert!(matches!(
            lit.verify_hash(),
            Err(MeshError::HashMismatch { .. })
        ));
    }
}
