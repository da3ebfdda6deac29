//! Identifier types used across the mesh sync protocol.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies a single participating device/process on the mesh.
///
/// Used as the agent identity in the state gossip agent's local/remote state
/// maps, and as the peer identity in peer-group membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    /// Create a new random peer id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Inner UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("peer-").unwrap_or(s);
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<PeerId> for Uuid {
    fn from(id: PeerId) -> Self {
        id.0
    }
}

/// Identifies the author of a mutation op: the identity whose signature is
/// checked against [`crate::object::MutationOp::signature`].
///
/// Distinct from [`PeerId`] because authorship of an op and the peer that
/// happens to relay it over the wire are different concepts -- an op may be
/// re-gossiped by peers other than its author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorId(pub Uuid);

impl AuthorId {
    /// Create a new random author id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AuthorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "author-{}", self.0)
    }
}

impl From<Uuid> for AuthorId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifies a peer group: the scope within which a set of peers gossips
/// state hashes and reconciles a shared set of mutable objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerGroupId(pub String);

impl PeerGroupId {
    /// Wrap a string identifier.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }
}

impl fmt::Display for PeerGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeerGroupId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_display_roundtrip() {
        let id = PeerId::new();
        let rendered = id.to_string();
        assert_eq!(rendered.parse::<PeerId>().unwrap(), id);
    }
}
