//! Agent pod: the in-process event bus agents register with (spec.md §4.2).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use meshstate_core::{Hash, Literal, PeerId};

/// Identity of an agent registered with a pod (a state-gossip agent, a
/// terminal-ops sync agent, or any other pod participant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Generate a fresh, random agent id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Events the pod delivers to its registered agents (spec.md §4.2).
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The set of registered agents changed.
    AgentSetChange,
    /// An agent's externally-observable state hash changed.
    AgentStateUpdate {
        /// The agent whose state changed.
        agent: AgentId,
        /// The new state hash.
        state_hash: Hash,
        /// The canonicalized new state object, so gossip can diffuse it
        /// without reading back through the owning agent.
        state_literal: Literal,
    },
    /// A new peer joined the local peer group.
    NewPeer {
        /// The peer's endpoint.
        endpoint: PeerId,
    },
    /// A previously known peer is no longer reachable.
    LostPeer {
        /// The peer's endpoint.
        endpoint: PeerId,
    },
}

/// An agent that can be registered with an [`AgentPod`] and receive its
/// events. Implemented by `StateGossipAgent` and `TerminalOpsSyncAgent` in
/// `meshstate-sync`.
#[async_trait]
pub trait LocalAgent: Send + Sync {
    /// This agent's pod identity.
    fn agent_id(&self) -> AgentId;

    /// Handle one pod event. Delivered sequentially in registration order
    /// relative to other agents, per spec.md's "delivered synchronously (in
    /// scheduling order)".
    async fn handle_pod_event(&self, event: PodEvent);
}

/// In-process event bus holding a set of agents keyed by [`AgentId`].
#[derive(Default)]
pub struct AgentPod {
    agents: async_lock::RwLock<BTreeMap<AgentId, Arc<dyn LocalAgent>>>,
}

impl AgentPod {
    /// An empty pod.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, then broadcast `AgentSetChange` to every agent
    /// including the one just added.
    pub async fn register_agent(&self, agent: Arc<dyn LocalAgent>) {
        let id = agent.agent_id();
        self.agents.write().await.insert(id, agent);
        tracing::info!(agent = %id, "agent registered with pod");
        self.broadcast_event(PodEvent::AgentSetChange).await;
    }

    /// Deregister an agent by id, then broadcast `AgentSetChange` to the
    /// remaining agents.
    pub async fn deregister_agent(&self, id: AgentId) {
        let removed = self.agents.write().await.remove(&id).is_some();
        if removed {
            tracing::info!(agent = %id, "agent deregistered from pod");
            self.broadcast_event(PodEvent::AgentSetChange).await;
        }
    }

    /// Deliver `event` to every registered agent's local-event handler, in
    /// registration (`BTreeMap`, i.e. `AgentId`) order.
    pub async fn broadcast_event(&self, event: PodEvent) {
        let agents: Vec<Arc<dyn LocalAgent>> = self.agents.read().await.values().cloned().collect();
        for agent in agents {
            agent.handle_pod_event(event.clone()).await;
        }
    }

    /// Deliver `event` to exactly one registered agent, by id.
    pub async fn send_to_agent(&self, id: AgentId, event: PodEvent) {
        let agent = self.agents.read().await.get(&id).cloned();
        match agent {
            Some(agent) => agent.handle_pod_event(event).await,
            None => tracing::warn!(agent = %id, "send_to_agent: no such agent registered"),
        }
    }

    /// Number of currently registered agents.
    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAgent {
        id: AgentId,
        events_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LocalAgent for CountingAgent {
        fn agent_id(&self) -> AgentId {
            self.id
        }

        async fn handle_pod_event(&self, _event: PodEvent) {
            self.events_seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_agent() {
        let pod = AgentPod::new();
        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));

        pod.register_agent(Arc::new(CountingAgent {
            id: AgentId::new(),
            events_seen: counter_a.clone(),
        }))
        .await;
        pod.register_agent(Arc::new(CountingAgent {
            id: AgentId::new(),
            events_seen: counter_b.clone(),
        }))
        .await;

        // Each register_agent call already broadcast an AgentSetChange; reset
        // and broadcast one more event to check fan-out precisely.
        counter_a.store(0, Ordering::SeqCst);
        counter_b.store(0, Ordering::SeqCst);
        pod.broadcast_event(PodEvent::AgentSetChange).await;

        assert_eq!(counter_a.load(Ordering::SeqCst), 1);
        assert_eq!(counter_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deregister_removes_agent_from_future_broadcasts() {
        let pod = AgentPod::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let id = AgentId::new();
        pod.register_agent(Arc::new(CountingAgent {
            id,
            events_seen: counter.clone(),
        }))
        .await;

        pod.deregister_agent(id).await;
        counter.store(0, Ordering::SeqCst);
        pod.broadcast_event(PodEvent::AgentSetChange).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(pod.agent_count().await, 0);
    }
}
