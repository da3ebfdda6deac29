#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![allow(
    missing_docs,
    unused_variables,
    clippy::unwrap_used,
    clippy::expect_used,
    dead_code,
    clippy::match_like_matches_macro,
    clippy::type_complexity,
    clippy::while_let_loop,
    clippy::redundant_closure,
    clippy::large_enum_variant,
    clippy::unused_unit,
    clippy::get_first,
    clippy::single_range_in_vec_init,
    clippy::disallowed_methods,
    deprecated
)]
//! # meshstate-sync — state gossip and terminal-ops sync agents
//!
//! This crate provides the two reconciliation agents mesh-sync nodes run
//! per spec.md §4.4/§4.5:
//! - [`state_gossip`]: diffuses a per-agent-id state hash across a peer
//!   group and pulls full state objects on mismatch.
//! - [`terminal_ops_sync`]: one instance per `(mutableObject, peerGroup)`,
//!   reconciling the op DAG by fetching missing operations and their
//!   transitive dependencies, enforcing the R1/R2 security rules.
//!
//! [`router`] ties the two together in front of a single
//! [`meshstate_agent::PeerGroupAgent`] receiver slot.
//!
//! ## Design principles
//!
//! - **Pull-based dependency fetch**: a peer only learns an op's bytes
//!   after proving, via the dependency chain, that it already holds an
//!   accepted ancestor op targeting the same object (R1).
//! - **Bounded leakage**: reference-typed dependencies are never sent
//!   unsolicited; the holder proves it already has the value via an
//!   ownership proof instead (R2).
//! - **Self-healing gossip**: a stale claim from a peer triggers sending
//!   them our current state back, rather than waiting for their own next
//!   gossip round.
//! - **Verification before storage**: every object is checked for a valid
//!   hash and signature and run through `shouldAccept` before `Store::save`.

pub mod config;
pub mod error;
pub mod pure;
pub mod router;
pub mod state_gossip;
pub mod terminal_ops_sync;
pub mod wire;

pub use config::{StateGossipParams, TerminalOpsSyncParams};
pub use error::SyncError;
pub use router::SyncRouter;
pub use state_gossip::{
    gossip_address, GossipTrackedAgent, StateGossipAgent, StateGossipMessageSink,
    StateGossipPodAdapter,
};
pub use terminal_ops_sync::{
    PodPublishSink, PublishSink, TerminalOpsPodAdapter, TerminalOpsSyncAgent,
    TerminalOpsSyncMessageSink,
};
pub use wire::{RequestedObject, StateGossipMessage, TerminalOpsSyncMessage};
