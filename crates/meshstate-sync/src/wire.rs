//! Wire messages for the state-gossip and terminal-ops sync protocols
//! (spec.md §4.4/§4.5).

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use meshstate_agent::AgentId;
use meshstate_core::{Context, Hash, Literal, OwnershipProof};

use crate::error::SyncError;

/// Messages exchanged by [`crate::state_gossip::StateGossipAgent`] instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StateGossipMessage {
    /// Every tracked agent's current state hash.
    SendFullState {
        /// `(agentId, hash)` pairs.
        entries: Vec<(AgentId, Hash)>,
    },
    /// A full state object for one agent.
    SendStateObject {
        /// The agent this state belongs to.
        agent_id: AgentId,
        /// The canonicalized `TerminalOpsState` literal.
        literal_object: Literal,
        /// Sender's wall-clock timestamp, for diagnostics.
        timestamp: SystemTime,
    },
    /// Ask the peer for its full tracked-agent state map.
    RequestFullState,
    /// Ask the peer for one agent's full state object.
    RequestStateObject {
        /// The agent whose state object is requested.
        agent_id: AgentId,
    },
}

impl StateGossipMessage {
    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        meshstate_core::serialization::to_vec(self).map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        meshstate_core::serialization::from_slice(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

/// One entry of a `request-objs` message: the requested hash plus the proof
/// that it is reachable from an accepted op (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestedObject {
    /// Hash of the requested object.
    pub hash: Hash,
    /// Ordered hashes from the target op down to `hash`.
    pub dependency_chain: Vec<Hash>,
}

/// Messages exchanged by [`crate::terminal_ops_sync::TerminalOpsSyncAgent`]
/// instances, one pair per `(mutableObject, peerGroup)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TerminalOpsSyncMessage {
    /// Ask the peer for its terminal-ops state object for `target`.
    RequestState {
        /// The mutable object in question.
        target: Hash,
    },
    /// Reply with the requester's terminal-ops state.
    SendState {
        /// The mutable object in question.
        target: Hash,
        /// The canonicalized `TerminalOpsState` literal.
        state_literal: Literal,
    },
    /// Ask for listed objects reachable from `target`'s accepted ops.
    RequestObjs {
        /// The mutable object in question.
        target: Hash,
        /// Objects requested, each with its justifying dependency chain.
        requested_objects: Vec<RequestedObject>,
        /// Secret the requester will use to check ownership proofs of any
        /// dependency the responder chooses to omit.
        secret: Vec<u8>,
    },
    /// Deliver requested literals, omitting any the receiver is expected to
    /// already hold (proved instead of sent).
    SendObjs {
        /// The mutable object in question.
        target: Hash,
        /// Delivered literals and their transitive dependencies.
        sent_objects: Context,
        /// Ownership proofs for every omitted dependency.
        omitted_deps: Vec<OwnershipProof>,
        /// The secret the proofs above were computed with (echoed back from
        /// the corresponding `RequestObjs.secret`).
        secret: Vec<u8>,
    },
}

impl TerminalOpsSyncMessage {
    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SyncError> {
        meshstate_core::serialization::to_vec(self).map_err(|e| SyncError::Codec(e.to_string()))
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SyncError> {
        meshstate_core::serialization::from_slice(bytes).map_err(|e| SyncError::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_gossip_message_round_trips() {
        let msg = StateGossipMessage::RequestFullState;
        let bytes = msg.to_bytes().unwrap();
        let back = StateGossipMessage::from_bytes(&bytes).unwrap();
        assert!(matches!(back, StateGossipMessage::RequestFullState));
    }

    #[test]
    fn terminal_ops_sync_message_round_trips() {
        let target = Hash::of_bytes(b"mutable");
        let msg = TerminalOpsSyncMessage::RequestState { target };
        let bytes = msg.to_bytes().unwrap();
        let back = TerminalOpsSyncMessage::from_bytes(&bytes).unwrap();
        match back {
            TerminalOpsSyncMessage::RequestState { target: t } => assert_eq!(t, target),
            _ => panic!("wrong variant"),
        }
    }
}
