//! # meshstate-core — foundation types
//!
//! Content hashing, the literal codec, the mutable-object/operation model,
//! identifiers, the unified error type, and the infrastructure effect trait
//! definitions (`Store` is built on these in `meshstate-store`; peer
//! transport in `meshstate-agent`).
//!
//! This crate has zero dependencies on other crates in the workspace.

#![forbid(unsafe_code)]

pub mod effects;
pub mod errors;
pub mod hash;
pub mod identifiers;
pub mod literal;
pub mod object;
pub mod registry;
pub mod serialization;

pub use errors::{MeshError, Result};
pub use hash::Hash;
pub use identifiers::{AuthorId, PeerGroupId, PeerId};
pub use literal::{Dependency, DependencyType, Literal, Signature};
pub use object::{
    Context, HashedObject, IncompleteOp, MutableObject, MutationOp, ObjectRequest, OwnershipProof,
    TerminalOp, TerminalOpsState,
};
pub use registry::{decode_op_payload, is_registered, register_op_class, PayloadDecoder};
