//! The mutable-object / operation model (spec.md §3).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime};

use crate::errors::MeshError;
use crate::hash::Hash;
use crate::identifiers::{AuthorId, PeerId};
use crate::literal::{Dependency, Literal, Signature};

/// A pure value identified by its literal's hash. Same content implies same
/// hash implies same identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedObject {
    /// Identity of this object: its literal's hash.
    pub hash: Hash,
    /// The canonical literal this object was rehydrated from.
    pub literal: Literal,
}

impl HashedObject {
    /// Wrap a literal as a hashed object, checking the hash invariant.
    pub fn from_literal(literal: Literal) -> Result<Self, MeshError> {
        literal.verify_hash()?;
        Ok(Self {
            hash: literal.hash,
            literal,
        })
    }
}

/// A hashed object whose semantic state is the fold of its accepted
/// mutation ops. `identity` is the mutable object's own hash (the hash of
/// its declaration literal, e.g. `{ class_registry_entry, initial_state }`);
/// `accepted_classes` is the declared set of op class names this object
/// will fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableObject {
    /// This mutable object's own identity hash.
    pub identity: Hash,
    /// Mutation op class names this object accepts.
    pub accepted_classes: BTreeSet<String>,
}

impl MutableObject {
    /// Whether a class name is accepted by this mutable object.
    pub fn accepts(&self, class_name: &str) -> bool {
        self.accepted_classes.iter().any(|c| c == class_name)
    }
}

/// A hashed object representing one signed mutation against a mutable
/// object's op DAG (spec.md §3 "Mutation op").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOp {
    /// Reference (by hash) to the mutable object this op mutates.
    pub target: Hash,
    /// Hashes of previously observed ops on the same target. Defines
    /// causal order; empty for an initial op.
    pub prev_ops: BTreeSet<Hash>,
    /// Optional references to ops in other mutable objects that causally
    /// justify this op.
    pub causal_ops: BTreeSet<Hash>,
    /// Identity of the op's author.
    pub author: AuthorId,
    /// Signed proof binding `author` to this op's content.
    pub signature: Signature,
    /// Registered mutation-op class name (spec.md §9, "dynamic dispatch on
    /// op class").
    pub class_name: String,
    /// Canonical encoding of the class-specific payload.
    pub payload: Vec<u8>,
    /// Whether this op may be undone by a later undo op (spec.md §4.6).
    pub reversible: bool,
    /// If this op is itself an undo op, the hash of the op it undoes.
    pub undoes: Option<Hash>,
}

impl MutationOp {
    /// Canonicalize this op into a literal, deriving its dependency list
    /// from `target`, `prev_ops`, and `causal_ops` (all reference-type:
    /// none of them are structurally embedded).
    pub fn into_literal(self) -> Result<Literal, MeshError> {
        let mut dependencies = Vec::with_capacity(1 + self.prev_ops.len() + self.causal_ops.len());
        dependencies.push(Dependency::reference(self.target, "target"));
        for (i, h) in self.prev_ops.iter().enumerate() {
            dependencies.push(Dependency::reference(*h, format!("prevOps.{i}")));
        }
        for (i, h) in self.causal_ops.iter().enumerate() {
            dependencies.push(Dependency::reference(*h, format!("causalOps.{i}")));
        }
        let signatures = vec![self.signature.clone()];
        Literal::canonicalize(&self, dependencies, signatures)
    }

    /// Decode a `MutationOp` back out of a literal that carries one.
    pub fn from_literal(literal: &Literal) -> Result<Self, MeshError> {
        literal.materialize()
    }
}

/// An op that no other persisted op on the same target references via
/// `prevOps` — the op DAG's current frontier.
pub type TerminalOp = Hash;

/// `{ mutableObjHash, terminalOps }`, hashed like any other hashed object;
/// its hash is the state hash diffused by the gossip layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalOpsState {
    /// The mutable object this state describes.
    pub mutable_obj_hash: Hash,
    /// Current frontier of the op DAG.
    pub terminal_ops: BTreeSet<TerminalOp>,
}

impl TerminalOpsState {
    /// Compute this state's hash (the gossip layer's "state hash").
    pub fn state_hash(&self) -> Result<Hash, MeshError> {
        Hash::of_value(self)
    }

    /// Canonicalize into a literal for transmission (`send-state`,
    /// `send-state-object`).
    pub fn into_literal(self) -> Result<Literal, MeshError> {
        let dep = Dependency::reference(self.mutable_obj_hash, "mutableObjHash");
        Literal::canonicalize(&self, vec![dep], vec![])
    }
}

/// A transient bundle of objects plus their transitive dependencies,
/// packaged for a single message (spec.md §3 "Context").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Context {
    /// Root object hashes this context was built to carry.
    pub root_hashes: Vec<Hash>,
    /// Every literal included in this context, keyed by hash.
    pub literals: BTreeMap<Hash, Literal>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a root object and its literal.
    pub fn add_root(&mut self, hash: Hash, literal: Literal) {
        self.root_hashes.push(hash);
        self.literals.insert(hash, literal);
    }

    /// Insert a non-root (dependency) literal.
    pub fn add_literal(&mut self, hash: Hash, literal: Literal) {
        self.literals.insert(hash, literal);
    }

    /// Validate this context's invariants (spec.md §3):
    /// every literal's hash recomputes to itself, and every root hash
    /// appears in `literals`.
    pub fn validate(&self) -> Result<(), MeshError> {
        for (hash, literal) in &self.literals {
            literal.verify_hash()?;
            if literal.hash != *hash {
                return Err(MeshError::HashMismatch {
                    expected: hash.to_hex(),
                    computed: literal.hash.to_hex(),
                });
            }
        }
        for root in &self.root_hashes {
            if !self.literals.contains_key(root) {
                return Err(MeshError::Invalid(format!(
                    "root hash {root} missing from context literals"
                )));
            }
        }
        Ok(())
    }

    /// Transitive dependency hashes of `root` (per its literal's
    /// dependency list, recursively) that are *not* present in this
    /// context's `literals` map — `findMissingDeps` from spec.md §4.5.
    pub fn find_missing_deps(&self, root: Hash) -> Vec<Hash> {
        let mut missing = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(h) = stack.pop() {
            if !seen.insert(h) {
                continue;
            }
            match self.literals.get(&h) {
                Some(lit) => {
                    for dep in &lit.dependencies {
                        stack.push(dep.hash);
                    }
                }
                None => {
                    if h != root {
                        missing.push(h);
                    }
                }
            }
        }
        missing
    }
}

/// Proof that the sender possesses an omitted dependency without
/// transmitting it: `(hash, H(value || secret))`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipProof {
    /// Hash of the omitted dependency.
    pub hash: Hash,
    /// `H(value || secret)` for the receiver-chosen `secret`.
    pub proof: Hash,
}

impl OwnershipProof {
    /// Compute the ownership proof for a locally-held value and a secret.
    pub fn compute(value: &[u8], secret: &[u8]) -> Hash {
        let mut buf = Vec::with_capacity(value.len() + secret.len());
        buf.extend_from_slice(value);
        buf.extend_from_slice(secret);
        Hash::of_bytes(&buf)
    }

    /// Check this proof against a locally-held value and the secret that
    /// was supplied in the original request.
    pub fn verify(&self, value: &[u8], secret: &[u8]) -> bool {
        Self::compute(value, secret) == self.proof
    }
}

/// A request for one missing object, carrying the dependency chain that
/// proves it is reachable from an accepted op (spec.md §4.5, `request-objs`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRequest {
    /// Hash of the requested object.
    pub hash: Hash,
    /// Ordered hashes from the target op down to `hash`, each appearing in
    /// the previous literal's dependency list.
    pub dependency_chain: Vec<Hash>,
}

/// A received op whose dependencies have not all arrived yet, buffered
/// pending completion or timeout (spec.md §3 "Incomplete op").
#[derive(Debug, Clone)]
pub struct IncompleteOp {
    /// Peer this (partial) op arrived from.
    pub source: PeerId,
    /// Context accumulated so far.
    pub context: Context,
    /// Still-missing dependencies, keyed by hash.
    pub missing: BTreeMap<Hash, ObjectRequest>,
    /// Deadline after which this entry is evicted.
    pub expires_at: SystemTime,
}

impl IncompleteOp {
    /// Construct a new incomplete op with a deadline `ttl` from now.
    pub fn new(source: PeerId, context: Context, ttl: Duration) -> Self {
        Self {
            source,
            context,
            missing: BTreeMap::new(),
            expires_at: SystemTime::now() + ttl,
        }
    }

    /// Whether every dependency has arrived.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// Whether this entry's deadline has passed.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Record that `hash` arrived, folding its literal into the context and
    /// removing it from `missing`.
    pub fn resolve_dependency(&mut self, hash: Hash, literal: Literal) {
        self.context.add_literal(hash, literal);
        self.missing.remove(&hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::AuthorId;

    fn sig() -> Signature {
        Signature {
            signer: AuthorId::new(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn op_roundtrips_through_literal() {
        let op = MutationOp {
            target: Hash::of_bytes(b"target"),
            prev_ops: BTreeSet::new(),
            causal_ops: BTreeSet::new(),
            author: AuthorId::new(),
            signature: sig(),
            class_name: "TestOp".into(),
            payload: vec![9, 9],
            reversible: false,
            undoes: None,
        };
        let lit = op.clone().into_literal().unwrap();
        let back = MutationOp::from_literal(&lit).unwrap();
        assert_eq!(op.target, back.target);
        assert_eq!(op.class_name, back.class_name);
    }

    #[test]
    fn ownership_proof_round_trip() {
        let value = b"identity-object-bytes";
        let secret = b"receiver-secret";
        let proof = OwnershipProof {
            hash: Hash::of_bytes(value),
            proof: OwnershipProof::compute(value, secret),
        };
        assert!(proof.verify(value, secret));
        assert!(!proof.verify(value, b"wrong-secret"));
    }

    #[test]
    fn context_detects_missing_root() {
        let mut ctx = Context::new();
        ctx.root_hashes.push(Hash::of_bytes(b"absent"));
        assert!(ctx.validate().is_err());
    }

    #[test]
    fn find_missing_deps_walks_transitively() {
        let leaf = Literal::canonicalize(&"leaf", vec![], vec![]).unwrap();
        let leaf_hash = leaf.hash;
        let mid_dep = Dependency::reference(leaf_hash, "child");
        let mid = Literal::canonicalize(&"mid", vec![mid_dep], vec![]).unwrap();
        let mut ctx = Context::new();
        ctx.add_root(mid.hash, mid.clone());
        // leaf not added: should be reported missing.
        let missing = ctx.find_missing_deps(mid.hash);
        assert_eq!(missing, vec![leaf_hash]);
    }
}
