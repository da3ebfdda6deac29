//! # meshstate-agent — pod and peer-group contracts
//!
//! The in-process agent pod (spec.md §4.2) that `meshstate-sync`'s gossip and
//! terminal-ops agents register with, and the peer-group agent contract
//! (spec.md §4.3) they consume for peer messaging, plus an in-memory
//! peer-group transport for tests.

#![forbid(unsafe_code)]

pub mod peer_group;
pub mod pod;

pub use peer_group::{InMemoryPeerGroup, Peer, PeerGroupAgent, PeerGroupParams, PeerMessageSink};
pub use pod::{AgentId, AgentPod, LocalAgent, PodEvent};
