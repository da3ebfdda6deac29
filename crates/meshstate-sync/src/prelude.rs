//! Mesh-sync prelude.
//!
//! Curated re-exports for wiring a node's gossip and terminal-ops agents.

pub use crate::config::{StateGossipParams, TerminalOpsSyncParams};
pub use crate::error::SyncError;
pub use crate::router::SyncRouter;
pub use crate::state_gossip::{
    gossip_address, GossipTrackedAgent, StateGossipAgent, StateGossipMessageSink,
    StateGossipPodAdapter,
};
pub use crate::terminal_ops_sync::{
    PodPublishSink, PublishSink, TerminalOpsPodAdapter, TerminalOpsSyncAgent,
    TerminalOpsSyncMessageSink,
};
pub use crate::wire::{RequestedObject, StateGossipMessage, TerminalOpsSyncMessage};
