//! Peer-messaging effects: the transport surface the peer-group agent
//! (spec.md §4.3) is built on. Connection-oriented and UDP-specific
//! extensions from the teacher's broader network effects trait are out of
//! scope here — transport is an external collaborator (spec.md §1).

use async_trait::async_trait;

use crate::identifiers::PeerId;

/// Network operation errors.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Failed to send a message to the destination.
    #[error("failed to send message to {peer_id:?}: {reason}")]
    SendFailed {
        /// Peer the send targeted, if known.
        peer_id: Option<PeerId>,
        /// Reason for the failure.
        reason: String,
    },
    /// Peer is not currently reachable.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(PeerId),
}

/// Point-to-point and broadcast peer messaging, the transport surface the
/// peer-group agent contract (spec.md §4.3) relies on.
#[async_trait]
pub trait PeerMessaging: Send + Sync {
    /// Send raw bytes to a specific peer.
    async fn send_to_peer(&self, peer: PeerId, message: Vec<u8>) -> Result<(), NetworkError>;

    /// Currently connected peers.
    async fn connected_peers(&self) -> Vec<PeerId>;
}

#[async_trait]
impl<T: PeerMessaging + ?Sized> PeerMessaging for std::sync::Arc<T> {
    async fn send_to_peer(&self, peer: PeerId, message: Vec<u8>) -> Result<(), NetworkError> {
        (**self).send_to_peer(peer, message).await
    }

    async fn connected_peers(&self) -> Vec<PeerId> {
        (**self).connected_peers().await
    }
}
