//! The `Store` contract (spec.md §4.1).

use async_trait::async_trait;
use std::collections::BTreeSet;

use meshstate_core::{Hash, HashedObject, Literal, TerminalOpsState};

use crate::error::StoreError;

/// Declares that a literal being saved is a mutation op, so the store can
/// enforce the "prevOps already persisted" invariant and maintain the
/// terminal-ops index without decoding the op's class-specific payload.
///
/// Corresponds to spec.md §4.1's `opHeader?` parameter of `save`.
#[derive(Debug, Clone)]
pub struct OpHeader {
    /// The mutable object this op targets.
    pub target: Hash,
    /// Hashes of ops this one causally follows.
    pub prev_ops: BTreeSet<Hash>,
}

/// One notification delivered by [`Store::watch_references`]: a newly
/// persisted literal whose `field` equals some watched hash.
#[derive(Debug, Clone)]
pub struct ReferenceEvent {
    /// The reference field this event concerns (e.g. `"target"`).
    pub field: String,
    /// The hash being referenced.
    pub referenced_hash: Hash,
    /// The hash of the literal that refers to it.
    pub referring_hash: Hash,
}

/// Content-addressed literal storage with reference indexing and terminal-
/// ops tracking (spec.md §4.1).
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a literal. Idempotent by hash; rejects hash mismatches,
    /// unsigned literals, and (when `op_header` is given) ops whose
    /// `prevOps` are not already persisted against `target`.
    async fn save(&self, literal: Literal, op_header: Option<OpHeader>) -> Result<(), StoreError>;

    /// Reconstruct a hashed object from its persisted literal.
    async fn load(&self, hash: Hash) -> Result<Option<HashedObject>, StoreError>;

    /// Load a literal by hash without reconstructing the hashed object.
    async fn load_literal(&self, hash: Hash) -> Result<Option<Literal>, StoreError>;

    /// Load the current terminal-ops state for a mutable object.
    async fn load_terminal_ops_for_mutable(
        &self,
        mutable_hash: Hash,
    ) -> Result<Option<TerminalOpsState>, StoreError>;

    /// Subscribe to reference-arrival notifications for `field == hash`.
    /// Delivered at-least-once, in persistence order per target; backed by
    /// a broadcast channel so sibling processes sharing the backend
    /// observe the same events exactly once each (spec.md §4.1, "multi-
    /// process safety").
    fn watch_references(&self, field: &str, hash: Hash) -> ReferenceWatch;
}

/// A filtered view over the store's reference-event broadcast channel.
pub struct ReferenceWatch {
    field: String,
    hash: Hash,
    rx: tokio::sync::broadcast::Receiver<ReferenceEvent>,
}

impl ReferenceWatch {
    /// Construct a watch over a broadcast receiver, filtering to events
    /// matching `field`/`hash`.
    pub fn new(field: impl Into<String>, hash: Hash, rx: tokio::sync::broadcast::Receiver<ReferenceEvent>) -> Self {
        Self {
            field: field.into(),
            hash,
            rx,
        }
    }

    /// Wait for the next matching reference event. Returns `None` if the
    /// channel closed (store dropped). Lagged/dropped events are skipped
    /// rather than surfaced as an error: at-least-once delivery only
    /// requires that a matching event eventually arrive, not that every
    /// historical one does once the receiver has fallen behind.
    pub async fn next(&mut self) -> Option<ReferenceEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) if ev.field == self.field && ev.referenced_hash == self.hash => {
                    return Some(ev)
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
