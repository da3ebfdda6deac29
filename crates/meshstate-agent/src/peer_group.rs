//! Peer-group agent: the consumed contract for sending/receiving messages
//! within a gossip topic (spec.md §4.3), plus an in-memory transport used by
//! tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use meshstate_core::{Hash, MeshError, PeerGroupId, PeerId};

/// One peer reachable within a peer group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    /// The peer's endpoint identity.
    pub endpoint: PeerId,
}

/// Tunables for a peer group (spec.md §4.3, `params.maxPeers`).
#[derive(Debug, Clone)]
pub struct PeerGroupParams {
    /// Upper bound on the number of peers this group will track.
    pub max_peers: usize,
}

impl Default for PeerGroupParams {
    fn default() -> Self {
        Self { max_peers: 50 }
    }
}

/// Receives inbound peer messages delivered by a [`PeerGroupAgent`].
/// Implemented by `StateGossipAgent` and `TerminalOpsSyncAgent`.
#[async_trait]
pub trait PeerMessageSink: Send + Sync {
    /// Deliver one inbound message. `sender_hash`/`recipient_hash` identify
    /// which local agent instance on either end the content is addressed
    /// to, per spec.md §4.3's `receivePeerMessage(source, senderHash,
    /// recipientHash, content)`.
    async fn receive_peer_message(
        &self,
        source: PeerId,
        sender_hash: Hash,
        recipient_hash: Hash,
        content: Vec<u8>,
    );
}

/// The peer-group agent contract consumed by the sync agents (spec.md §4.3).
#[async_trait]
pub trait PeerGroupAgent: Send + Sync {
    /// This node's own endpoint within the group.
    fn local_endpoint(&self) -> PeerId;

    /// Currently known peers.
    async fn peers(&self) -> Vec<Peer>;

    /// Group-wide tunables.
    fn params(&self) -> &PeerGroupParams;

    /// Identity of this peer group.
    fn peer_group_id(&self) -> &PeerGroupId;

    /// Gossip topic name within the group.
    fn topic(&self) -> &str;

    /// Send a message to one peer. Per-endpoint FIFO delivery order is
    /// guaranteed by the transport (spec.md §5, "ordering guarantees").
    async fn send_message_to_peer(
        &self,
        target: PeerId,
        sender_hash: Hash,
        recipient_hash: Hash,
        content: Vec<u8>,
    ) -> Result<(), MeshError>;

    /// Register the sink that inbound messages are delivered to.
    async fn register_receiver(&self, receiver: Arc<dyn PeerMessageSink>);
}

/// In-memory peer-group transport for tests: a fixed cluster of nodes that
/// deliver to each other over `tokio::sync::mpsc` channels, FIFO per sender,
/// the way the teacher's broadcast/anti-entropy test suites wire up
/// multi-handler scenarios in-process.
pub struct InMemoryPeerGroup {
    local_endpoint: PeerId,
    peer_group_id: PeerGroupId,
    topic: String,
    params: PeerGroupParams,
    senders: HashMap<PeerId, tokio::sync::mpsc::UnboundedSender<InMemoryMessage>>,
    receiver: async_lock::RwLock<Option<Arc<dyn PeerMessageSink>>>,
}

struct InMemoryMessage {
    source: PeerId,
    sender_hash: Hash,
    recipient_hash: Hash,
    content: Vec<u8>,
}

impl InMemoryPeerGroup {
    /// Build a fully-connected cluster of `count` in-memory peer groups
    /// sharing one topic, each with its own inbound task spawned on the
    /// current `tokio` runtime.
    pub fn cluster(peer_group_id: PeerGroupId, topic: &str, count: usize) -> Vec<Arc<Self>> {
        let endpoints: Vec<PeerId> = (0..count).map(|_| PeerId::new()).collect();
        let mut inboxes = HashMap::new();
        let mut senders = HashMap::new();
        for endpoint in &endpoints {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            senders.insert(*endpoint, tx);
            inboxes.insert(*endpoint, rx);
        }

        let mut nodes = Vec::with_capacity(count);
        for endpoint in &endpoints {
            let node = Arc::new(Self {
                local_endpoint: *endpoint,
                peer_group_id: peer_group_id.clone(),
                topic: topic.to_string(),
                params: PeerGroupParams::default(),
                senders: senders.clone(),
                receiver: async_lock::RwLock::new(None),
            });
            let mut inbox = inboxes.remove(endpoint).expect("inbox present for endpoint");
            let node_for_task = node.clone();
            tokio::spawn(async move {
                while let Some(msg) = inbox.recv().await {
                    let receiver = node_for_task.receiver.read().await.clone();
                    if let Some(sink) = receiver {
                        sink.receive_peer_message(
                            msg.source,
                            msg.sender_hash,
                            msg.recipient_hash,
                            msg.content,
                        )
                        .await;
                    }
                }
            });
            nodes.push(node);
        }
        nodes
    }

    /// The peers this node can see (every other node in the cluster).
    fn peer_list(&self) -> Vec<Peer> {
        self.senders
            .keys()
            .filter(|e| **e != self.local_endpoint)
            .map(|e| Peer { endpoint: *e })
            .collect()
    }
}

#[async_trait]
impl PeerGroupAgent for InMemoryPeerGroup {
    fn local_endpoint(&self) -> PeerId {
        self.local_endpoint
    }

    async fn peers(&self) -> Vec<Peer> {
        self.peer_list()
    }

    fn params(&self) -> &PeerGroupParams {
        &self.params
    }

    fn peer_group_id(&self) -> &PeerGroupId {
        &self.peer_group_id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    async fn send_message_to_peer(
        &self,
        target: PeerId,
        sender_hash: Hash,
        recipient_hash: Hash,
        content: Vec<u8>,
    ) -> Result<(), MeshError> {
        let sender = self
            .senders
            .get(&target)
            .ok_or_else(|| MeshError::PeerMessageSendFailure(format!("unknown peer {target}")))?;
        sender
            .send(InMemoryMessage {
                source: self.local_endpoint,
                sender_hash,
                recipient_hash,
                content,
            })
            .map_err(|e| MeshError::PeerMessageSendFailure(e.to_string()))
    }

    async fn register_receiver(&self, receiver: Arc<dyn PeerMessageSink>) {
        *self.receiver.write().await = Some(receiver);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_lock::Mutex;

    struct RecordingSink {
        received: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl PeerMessageSink for RecordingSink {
        async fn receive_peer_message(
            &self,
            _source: PeerId,
            _sender_hash: Hash,
            _recipient_hash: Hash,
            content: Vec<u8>,
        ) {
            self.received.lock().await.push(content);
        }
    }

    #[tokio::test]
    async fn cluster_delivers_point_to_point() {
        let group_id = PeerGroupId::new("test-topic");
        let nodes = InMemoryPeerGroup::cluster(group_id, "test-topic", 2);
        let received = Arc::new(Mutex::new(Vec::new()));
        nodes[1]
            .register_receiver(Arc::new(RecordingSink {
                received: received.clone(),
            }))
            .await;

        let sender_hash = Hash::of_bytes(b"agent-a");
        let recipient_hash = Hash::of_bytes(b"agent-b");
        nodes[0]
            .send_message_to_peer(
                nodes[1].local_endpoint(),
                sender_hash,
                recipient_hash,
                b"hello".to_vec(),
            )
            .await
            .unwrap();

        // Let the spawned inbound task run.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(received.lock().await.as_slice(), [b"hello".to_vec()]);
    }
}
