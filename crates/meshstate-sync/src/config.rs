//! Runtime configuration for the gossip and terminal-ops sync agents
//! (spec.md §4.4/§4.5 "params").

use std::time::Duration;

/// Tunables for [`crate::state_gossip::StateGossipAgent`].
#[derive(Debug, Clone)]
pub struct StateGossipParams {
    /// Fraction of the peer group to gossip a new state to.
    pub peer_gossip_fraction: f64,
    /// Probability of gossiping at all on any given state update. Held
    /// separately from `peer_gossip_fraction` so callers can tune "how
    /// often we gossip" independent of "how wide".
    pub peer_gossip_prob: f64,
    /// Floor on the gossip fan-out size, regardless of `peer_gossip_fraction`.
    pub min_gossip_peers: usize,
    /// Bound on the per-agent superseded-state LRU.
    pub max_cached_prev_states: usize,
    /// Number of times to retry a failing `receiveRemoteState` call.
    pub new_state_error_retries: u32,
    /// Pacing between `receiveRemoteState` retries.
    pub new_state_error_delay: Duration,
    /// Upper bound on jittered gossip delay (unused by the pure fan-out
    /// calculation; consulted by callers that want to spread sends out).
    pub max_gossip_delay: Duration,
}

impl Default for StateGossipParams {
    fn default() -> Self {
        Self {
            peer_gossip_fraction: 0.2,
            peer_gossip_prob: 0.5,
            min_gossip_peers: 4,
            max_cached_prev_states: 50,
            new_state_error_retries: 3,
            new_state_error_delay: Duration::from_millis(1500),
            max_gossip_delay: Duration::from_millis(5000),
        }
    }
}

/// Tunables for [`crate::terminal_ops_sync::TerminalOpsSyncAgent`].
#[derive(Debug, Clone)]
pub struct TerminalOpsSyncParams {
    /// Deadline for an outbound object movement to complete.
    pub send_timeout: Duration,
    /// Deadline for an inbound object movement to complete.
    pub receive_timeout: Duration,
    /// Deadline for an incomplete op to complete before eviction.
    pub incomplete_op_timeout: Duration,
    /// Housekeeping sweep interval.
    pub housekeeping_interval: Duration,
    /// Maximum concurrent requesters tolerated for the same hash across
    /// distinct peers before backpressure kicks in (spec.md §4.5).
    pub max_concurrent_requesters_per_hash: usize,
}

impl Default for TerminalOpsSyncParams {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(60),
            receive_timeout: Duration::from_secs(90),
            incomplete_op_timeout: Duration::from_secs(3600),
            housekeeping_interval: Duration::from_secs(5),
            max_concurrent_requesters_per_hash: 2,
        }
    }
}
