//! Dispatches inbound peer-group messages to the right local agent by
//! `recipient_hash` (spec.md §4.3 `receivePeerMessage(source, senderHash,
//! recipientHash, content)`): the gossip agent answers at a fixed
//! per-topic address, terminal-ops agents answer at their own
//! mutable-object hash.
//!
//! A [`PeerGroupAgent`](meshstate_agent::PeerGroupAgent) registers exactly
//! one [`PeerMessageSink`]; a node running both a gossip agent and several
//! terminal-ops agents needs something in front of all of them to route by
//! address, which is what this module provides.

use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use meshstate_agent::PeerMessageSink;
use meshstate_core::{Hash, PeerId};

use crate::state_gossip::StateGossipMessageSink;
use crate::terminal_ops_sync::TerminalOpsSyncMessageSink;

/// Routes inbound messages to the gossip agent or to one of several
/// registered terminal-ops sync agents, keyed by target mutable-object
/// hash.
pub struct SyncRouter {
    gossip: Arc<StateGossipMessageSink>,
    terminal_ops: RwLock<BTreeMap<Hash, Arc<TerminalOpsSyncMessageSink>>>,
}

impl SyncRouter {
    /// Build a router in front of one gossip agent.
    pub fn new(gossip: Arc<StateGossipMessageSink>) -> Self {
        Self {
            gossip,
            terminal_ops: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a terminal-ops sync agent's sink under its target hash.
    pub async fn register_terminal_ops(&self, target: Hash, sink: Arc<TerminalOpsSyncMessageSink>) {
        self.terminal_ops.write().await.insert(target, sink);
    }

    /// Stop routing to a terminal-ops target (mirrors agent shutdown).
    pub async fn deregister_terminal_ops(&self, target: Hash) {
        self.terminal_ops.write().await.remove(&target);
    }
}

#[async_trait]
impl PeerMessageSink for SyncRouter {
    async fn receive_peer_message(
        &self,
        source: PeerId,
        sender_hash: Hash,
        recipient_hash: Hash,
        content: Vec<u8>,
    ) {
        if recipient_hash == self.gossip.address() {
            self.gossip
                .receive_peer_message(source, sender_hash, recipient_hash, content)
                .await;
            return;
        }

        let sink = self.terminal_ops.read().await.get(&recipient_hash).cloned();
        match sink {
            Some(sink) => {
                sink.receive_peer_message(source, sender_hash, recipient_hash, content)
                    .await
            }
            None => tracing::warn!(recipient = %recipient_hash, "message for unknown local agent; dropping"),
        }
    }
}
