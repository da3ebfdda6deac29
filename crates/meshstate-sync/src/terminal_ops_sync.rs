//! Terminal-ops sync agent (spec.md §4.5): one instance per `(mutableObject,
//! peerGroup)`, reconciling the op DAG by fetching missing operations and
//! their transitive dependencies while enforcing R1/R2.

use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::SystemTime;

use meshstate_agent::{AgentId, PeerGroupAgent, PeerMessageSink, PodEvent};
use meshstate_core::{
    Context, DependencyType, Hash, IncompleteOp, Literal, MeshError, MutationOp,
    ObjectRequest, OwnershipProof, PeerId, TerminalOpsState,
};
use meshstate_store::{OpHeader, Store};

use crate::config::TerminalOpsSyncParams;
use crate::pure;
use crate::state_gossip::GossipTrackedAgent;
use crate::wire::{RequestedObject, TerminalOpsSyncMessage};

/// A fresh per-request ownership-proof secret (spec.md §3 "Ownership
/// proof": "per-request, receiver-chosen").
fn generate_secret() -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// A pending per-endpoint object movement: either we're expecting `hash`
/// from `source` (incoming) or we owe it to `source` once we have it
/// (outgoing).
#[derive(Debug, Clone)]
struct Movement {
    chain: Vec<Hash>,
    secret: Vec<u8>,
    deadline: SystemTime,
}

/// One instance per `(mutableObject, peerGroup)` (spec.md §4.5).
pub struct TerminalOpsSyncAgent {
    agent_id: AgentId,
    obj_hash: Hash,
    accepted_classes: BTreeSet<String>,
    store: Arc<dyn Store>,
    peer_group: Arc<dyn PeerGroupAgent>,
    params: TerminalOpsSyncParams,

    state: RwLock<Option<TerminalOpsState>>,
    state_hash: RwLock<Option<Hash>>,

    outgoing: RwLock<BTreeMap<Hash, BTreeMap<PeerId, Movement>>>,
    incoming: RwLock<BTreeMap<Hash, BTreeMap<PeerId, Movement>>>,
    incomplete: RwLock<BTreeMap<Hash, IncompleteOp>>,
    ops_for_missing: RwLock<BTreeMap<Hash, BTreeSet<Hash>>>,

    shutdown: tokio::sync::Notify,
}

impl TerminalOpsSyncAgent {
    /// Construct a new agent for `obj_hash`, accepting mutation ops whose
    /// class name is in `accepted_classes`.
    pub fn new(
        obj_hash: Hash,
        accepted_classes: BTreeSet<String>,
        store: Arc<dyn Store>,
        peer_group: Arc<dyn PeerGroupAgent>,
        params: TerminalOpsSyncParams,
    ) -> Self {
        Self {
            agent_id: AgentId::new(),
            obj_hash,
            accepted_classes,
            store,
            peer_group,
            params,
            state: RwLock::new(None),
            state_hash: RwLock::new(None),
            outgoing: RwLock::new(BTreeMap::new()),
            incoming: RwLock::new(BTreeMap::new()),
            incomplete: RwLock::new(BTreeMap::new()),
            ops_for_missing: RwLock::new(BTreeMap::new()),
            shutdown: tokio::sync::Notify::new(),
        }
    }

    /// This agent's pod identity; also the id the gossip agent tracks its
    /// state hash under.
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// The mutable object this instance reconciles.
    pub fn target(&self) -> Hash {
        self.obj_hash
    }

    async fn send(&self, target: PeerId, msg: &TerminalOpsSyncMessage) {
        let Ok(bytes) = msg.to_bytes() else {
            tracing::warn!(target = %self.obj_hash, "failed to encode terminal-ops message");
            return;
        };
        if let Err(e) = self
            .peer_group
            .send_message_to_peer(target, self.obj_hash, self.obj_hash, bytes)
            .await
        {
            tracing::warn!(peer = %target, target_obj = %self.obj_hash, error = %e, "terminal-ops send failed");
        }
    }

    /// Reload `terminalOps(objHash)` from the store, recompute the state
    /// hash, and return the new `(state, hash, literal)` if it changed
    /// (spec.md §4.5 "Publishing").
    pub async fn publish(&self) -> Option<(TerminalOpsState, Hash, Literal)> {
        let loaded = self
            .store
            .load_terminal_ops_for_mutable(self.obj_hash)
            .await
            .ok()
            .flatten();
        let state = loaded.unwrap_or_else(|| TerminalOpsState {
            mutable_obj_hash: self.obj_hash,
            terminal_ops: BTreeSet::new(),
        });
        let Ok(hash) = state.state_hash() else {
            return None;
        };

        let current = *self.state_hash.read().await;
        if current == Some(hash) {
            return None;
        }

        let Ok(literal) = state.clone().into_literal() else {
            return None;
        };
        *self.state.write().await = Some(state.clone());
        *self.state_hash.write().await = Some(hash);
        tracing::debug!(target = %self.obj_hash, state_hash = %hash, "terminal-ops state advanced");
        Some((state, hash, literal))
    }

    /// Spawn a task that watches the store for new ops targeting this
    /// object and republishes on every arrival.
    pub fn spawn_watch_loop(self: &Arc<Self>, on_publish: Arc<dyn PublishSink>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut watch = this.store.watch_references("target", this.obj_hash);
            loop {
                tokio::select! {
                    ev = watch.next() => {
                        match ev {
                            Some(_) => {
                                if let Some((_, hash, literal)) = this.publish().await {
                                    on_publish.on_state_published(this.agent_id, hash, literal).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = this.shutdown.notified() => break,
                }
            }
        })
    }

    /// Spawn the periodic housekeeping sweep (spec.md §4.5 "Housekeeping").
    pub fn spawn_housekeeping(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.params.housekeeping_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => this.sweep().await,
                    _ = this.shutdown.notified() => break,
                }
            }
        })
    }

    /// Halt this agent's background tasks (`shutdown()` from spec.md §5).
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }

    /// Expire entries whose deadlines have passed in `incoming`, `outgoing`,
    /// and `incomplete`.
    async fn sweep(&self) {
        let now = SystemTime::now();

        {
            let mut incoming = self.incoming.write().await;
            incoming.retain(|_, by_peer| {
                by_peer.retain(|_, m| m.deadline > now);
                !by_peer.is_empty()
            });
        }
        {
            let mut outgoing = self.outgoing.write().await;
            outgoing.retain(|_, by_peer| {
                by_peer.retain(|_, m| m.deadline > now);
                !by_peer.is_empty()
            });
        }
        {
            let mut incomplete = self.incomplete.write().await;
            let mut ops_for_missing = self.ops_for_missing.write().await;
            let expired: Vec<Hash> = incomplete
                .iter()
                .filter(|(_, op)| op.is_expired(now))
                .map(|(h, _)| *h)
                .collect();
            for hash in expired {
                if let Some(op) = incomplete.remove(&hash) {
                    tracing::debug!(op = %hash, "incomplete op expired");
                    for missing_hash in op.missing.keys() {
                        if let Some(waiters) = ops_for_missing.get_mut(missing_hash) {
                            waiters.remove(&hash);
                            if waiters.is_empty() {
                                ops_for_missing.remove(missing_hash);
                            }
                        }
                    }
                }
            }
        }
    }

    /// Called when the peer's terminal-ops set arrives (directly, or via
    /// the gossip agent's object cache). Requests any of the peer's
    /// terminal ops we don't already hold or have in flight.
    async fn reconcile_against(&self, source: PeerId, peer_state: &TerminalOpsState) {
        if peer_state.mutable_obj_hash != self.obj_hash {
            tracing::warn!(expected = %self.obj_hash, got = %peer_state.mutable_obj_hash, "terminal-ops state for wrong target; ignoring");
            return;
        }

        let mut present = BTreeSet::new();
        for hash in &peer_state.terminal_ops {
            // Already-in-flight requests count as present too, so a repeat
            // delivery of the same terminal-ops state (each gossip round,
            // every `receive_remote_state`) doesn't re-issue `RequestObjs`
            // for a hash we're already waiting on.
            let have = self.store.load_literal(*hash).await.ok().flatten().is_some()
                || self.incomplete.read().await.contains_key(hash)
                || self.incoming.read().await.contains_key(hash);
            if have {
                present.insert(*hash);
            }
        }
        let to_request = pure::ops_to_request(&peer_state.terminal_ops, |h| present.contains(&h));
        if to_request.is_empty() {
            return;
        }

        let secret = generate_secret();
        let deadline = SystemTime::now() + self.params.receive_timeout;
        {
            let mut incoming = self.incoming.write().await;
            for hash in &to_request {
                incoming.entry(*hash).or_default().insert(
                    source,
                    Movement {
                        chain: Vec::new(),
                        secret: secret.clone(),
                        deadline,
                    },
                );
            }
        }

        let requested_objects = to_request
            .into_iter()
            .map(|hash| RequestedObject {
                hash,
                dependency_chain: Vec::new(),
            })
            .collect();
        self.send(
            source,
            &TerminalOpsSyncMessage::RequestObjs {
                target: self.obj_hash,
                requested_objects,
                secret,
            },
        )
        .await;
    }

    async fn handle_request_state(&self, source: PeerId, target: Hash) {
        if target != self.obj_hash {
            return;
        }
        let Some(state) = self.state.read().await.clone() else {
            return;
        };
        let Ok(literal) = state.into_literal() else {
            return;
        };
        self.send(
            source,
            &TerminalOpsSyncMessage::SendState {
                target: self.obj_hash,
                state_literal: literal,
            },
        )
        .await;
    }

    async fn handle_send_state(&self, source: PeerId, target: Hash, state_literal: Literal) {
        if target != self.obj_hash {
            return;
        }
        if state_literal.verify_hash().is_err() {
            tracing::warn!(peer = %source, "terminal-ops state literal hash mismatch; dropping");
            return;
        }
        let Ok(peer_state) = state_literal.materialize::<TerminalOpsState>() else {
            return;
        };
        self.reconcile_against(source, &peer_state).await;
    }

    /// Validate R1 against the store: `chain[0]` (or `requested` if `chain`
    /// is empty) must be a persisted, accepted mutation op targeting
    /// `objHash`, and each consecutive pair in `chain` must be linked
    /// through the previous literal's dependency list.
    async fn validate_request(&self, chain: &[Hash], requested: Hash) -> Result<(), ()> {
        let root_op = chain.first().copied().unwrap_or(requested);

        let Some(root_literal) = self.store.load_literal(root_op).await.ok().flatten() else {
            return Err(());
        };
        let Ok(op) = MutationOp::from_literal(&root_literal) else {
            return Err(());
        };
        if op.target != self.obj_hash || !self.accepted_classes.contains(&op.class_name) {
            return Err(());
        }

        if chain.is_empty() {
            return if requested == root_op { Ok(()) } else { Err(()) };
        }

        let mut ctx = Context::new();
        for hash in &chain[..chain.len() - 1] {
            let Some(lit) = self.store.load_literal(*hash).await.ok().flatten() else {
                return Err(());
            };
            ctx.add_literal(*hash, lit);
        }
        if pure::validate_dependency_chain(&ctx, chain[0], chain, requested) {
            Ok(())
        } else {
            Err(())
        }
    }

    async fn handle_request_objs(
        &self,
        source: PeerId,
        target: Hash,
        requested_objects: Vec<RequestedObject>,
        secret: Vec<u8>,
    ) {
        if target != self.obj_hash {
            return;
        }

        let mut ctx = Context::new();
        let mut proofs = Vec::new();
        let mut any_resolved = false;

        for req in requested_objects {
            if self.validate_request(&req.dependency_chain, req.hash).await.is_err() {
                tracing::warn!(peer = %source, hash = %req.hash, "rejected request-objs: R1 violation");
                continue;
            }

            let requester_count = self.count_requesters(req.hash, source).await;
            if requester_count >= self.params.max_concurrent_requesters_per_hash {
                tracing::debug!(hash = %req.hash, "backpressure: too many concurrent requesters");
                continue;
            }

            match self.store.load_literal(req.hash).await.ok().flatten() {
                Some(literal) => {
                    any_resolved = true;
                    ctx.add_root(req.hash, literal.clone());
                    self.include_dependencies(&literal, &secret, &mut ctx, &mut proofs)
                        .await;
                }
                None => {
                    let deadline = SystemTime::now() + self.params.send_timeout;
                    self.outgoing
                        .write()
                        .await
                        .entry(req.hash)
                        .or_default()
                        .insert(
                            source,
                            Movement {
                                chain: req.dependency_chain.clone(),
                                secret: secret.clone(),
                                deadline,
                            },
                        );
                }
            }
        }

        if any_resolved {
            self.send(
                source,
                &TerminalOpsSyncMessage::SendObjs {
                    target: self.obj_hash,
                    sent_objects: ctx,
                    omitted_deps: proofs,
                    secret,
                },
            )
            .await;
        }
    }

    async fn count_requesters(&self, hash: Hash, exclude_self_retry: PeerId) -> usize {
        self.outgoing
            .read()
            .await
            .get(&hash)
            .map(|by_peer| {
                by_peer
                    .keys()
                    .filter(|p| **p != exclude_self_retry)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Recursively include subobject dependencies and prove-then-omit
    /// reference dependencies (spec.md §4.5 "Receiving request-objs").
    async fn include_dependencies(
        &self,
        literal: &Literal,
        secret: &[u8],
        ctx: &mut Context,
        proofs: &mut Vec<OwnershipProof>,
    ) {
        let deps = literal.dependencies.clone();
        for dep in deps {
            match dep.dep_type {
                DependencyType::Subobject => {
                    if ctx.literals.contains_key(&dep.hash) {
                        continue;
                    }
                    if let Some(child) = self.store.load_literal(dep.hash).await.ok().flatten() {
                        ctx.add_literal(dep.hash, child.clone());
                        Box::pin(self.include_dependencies(&child, secret, ctx, proofs)).await;
                    }
                }
                DependencyType::Reference => {
                    if let Some(value) = self.store.load_literal(dep.hash).await.ok().flatten() {
                        let proof = OwnershipProof {
                            hash: dep.hash,
                            proof: OwnershipProof::compute(&value.value, secret),
                        };
                        proofs.push(proof);
                    }
                }
            }
        }
    }

    async fn handle_send_objs(
        &self,
        source: PeerId,
        target: Hash,
        mut sent_objects: Context,
        omitted_deps: Vec<OwnershipProof>,
        secret: Vec<u8>,
    ) {
        if target != self.obj_hash {
            return;
        }
        if sent_objects.validate().is_err() {
            tracing::warn!(peer = %source, "send-objs context failed validation; dropping");
            return;
        }

        let proof_by_hash: BTreeMap<Hash, Hash> =
            omitted_deps.into_iter().map(|p| (p.hash, p.proof)).collect();

        let roots = sent_objects.root_hashes.clone();
        for root in roots {
            self.process_send_objs_root(source, root, &mut sent_objects, &proof_by_hash, &secret)
                .await;
        }
    }

    async fn process_send_objs_root(
        &self,
        source: PeerId,
        root: Hash,
        sent_objects: &mut Context,
        proof_by_hash: &BTreeMap<Hash, Hash>,
        secret: &[u8],
    ) {
        let expected = {
            let incoming = self.incoming.read().await;
            incoming
                .get(&root)
                .and_then(|by_peer| by_peer.get(&source))
                .map(|m| m.secret == secret)
        };
        // A sender who already has a partial delivery in flight for this root
        // may legitimately follow up with a fresh secret (e.g. after a sweep
        // evicted the old `incoming` entry); gate that on it being the same
        // source the incomplete op is waiting on, not merely "some incomplete
        // op exists for this hash" — otherwise any peer could graft its own
        // content onto another peer's in-flight partial delivery.
        let is_continuing_incomplete = self
            .incomplete
            .read()
            .await
            .get(&root)
            .is_some_and(|op| op.source == source);
        if expected != Some(true) && !is_continuing_incomplete {
            tracing::warn!(peer = %source, hash = %root, "unexpected send-objs root; ignoring");
            return;
        }

        // Fold ownership-proven deps we already hold into the context.
        loop {
            let missing = sent_objects.find_missing_deps(root);
            if missing.is_empty() {
                break;
            }
            let mut folded_any = false;
            for dep_hash in missing {
                if sent_objects.literals.contains_key(&dep_hash) {
                    continue;
                }
                if let (Some(local), Some(proof)) = (
                    self.store.load_literal(dep_hash).await.ok().flatten(),
                    proof_by_hash.get(&dep_hash),
                ) {
                    if OwnershipProof::compute(&local.value, secret) == *proof {
                        sent_objects.add_literal(dep_hash, local);
                        folded_any = true;
                    }
                }
            }
            if !folded_any {
                break;
            }
        }

        let still_missing = sent_objects.find_missing_deps(root);
        if still_missing.is_empty() {
            self.try_persist_root(source, root, sent_objects).await;
            return;
        }

        let Some(root_literal) = sent_objects.literals.get(&root).cloned() else {
            return;
        };
        if !pure::is_plausible_op_literal(&root_literal) {
            tracing::debug!(hash = %root, "non-op partial arrival with missing deps; dropping");
            return;
        }
        let Ok(op) = MutationOp::from_literal(&root_literal) else {
            return;
        };
        if op.target != self.obj_hash || !self.accepted_classes.contains(&op.class_name) {
            tracing::debug!(hash = %root, "unacceptable partial op; dropping");
            return;
        }

        let prior_chain = self
            .incoming
            .read()
            .await
            .get(&root)
            .and_then(|m| m.get(&source))
            .map(|m| m.chain.clone())
            .unwrap_or_default();

        let deadline = SystemTime::now() + self.params.receive_timeout;
        let mut entry = self
            .incomplete
            .write()
            .await
            .remove(&root)
            .unwrap_or_else(|| IncompleteOp::new(source, Context::new(), self.params.incomplete_op_timeout));
        entry.context = sent_objects.clone();
        entry.expires_at = SystemTime::now() + self.params.incomplete_op_timeout;
        entry.missing = still_missing
            .iter()
            .map(|h| {
                (
                    *h,
                    ObjectRequest {
                        hash: *h,
                        dependency_chain: {
                            let mut chain = prior_chain.clone();
                            chain.push(root);
                            chain.push(*h);
                            chain
                        },
                    },
                )
            })
            .collect();
        self.incomplete.write().await.insert(root, entry);

        {
            let mut ops_for_missing = self.ops_for_missing.write().await;
            for h in &still_missing {
                ops_for_missing.entry(*h).or_default().insert(root);
            }
        }
        {
            let mut incoming = self.incoming.write().await;
            incoming.entry(root).or_default().insert(
                source,
                Movement {
                    chain: prior_chain.clone(),
                    secret: secret.to_vec(),
                    deadline,
                },
            );
        }

        let requested_objects: Vec<RequestedObject> = still_missing
            .into_iter()
            .map(|h| {
                let mut chain = prior_chain.clone();
                chain.push(root);
                chain.push(h);
                RequestedObject {
                    hash: h,
                    dependency_chain: chain,
                }
            })
            .collect();
        self.send(
            source,
            &TerminalOpsSyncMessage::RequestObjs {
                target: self.obj_hash,
                requested_objects,
                secret: secret.to_vec(),
            },
        )
        .await;
    }

    async fn try_persist_root(&self, source: PeerId, root: Hash, sent_objects: &Context) {
        let Some(literal) = sent_objects.literals.get(&root).cloned() else {
            return;
        };
        if self.accept_and_save(literal).await.is_ok() {
            self.incoming.write().await.remove(&root);
            self.resolve_arrived(root, sent_objects).await;
            self.flush_outgoing(root).await;
        } else {
            tracing::warn!(hash = %root, peer = %source, "rejected op after full arrival");
            self.incoming.write().await.remove(&root);
        }
    }

    /// Validate a literal as an accepted mutation op targeting this object
    /// and persist it (`shouldAccept` + `store.save`, spec.md §4.5).
    async fn accept_and_save(&self, literal: Literal) -> Result<(), MeshError> {
        literal.verify_hash()?;
        if !pure::is_plausible_op_literal(&literal) {
            return Err(MeshError::UnacceptableOp("unsigned or malformed op".into()));
        }
        let op = MutationOp::from_literal(&literal)?;
        if op.target != self.obj_hash {
            return Err(MeshError::WrongTarget(format!(
                "op targets {} not {}",
                op.target, self.obj_hash
            )));
        }
        if !self.accepted_classes.contains(&op.class_name) {
            return Err(MeshError::UnacceptableOp(op.class_name.clone()));
        }
        self.store
            .save(
                literal,
                Some(OpHeader {
                    target: self.obj_hash,
                    prev_ops: op.prev_ops.clone(),
                }),
            )
            .await
            .map_err(MeshError::from)
    }

    /// When `hash` arrives (newly persisted, or folded via ownership
    /// proof), fold it into any incomplete ops waiting on it and try to
    /// persist them once complete (spec.md §4.5 "Incoming-dep completion").
    async fn resolve_arrived(&self, hash: Hash, ctx: &Context) {
        let Some(literal) = ctx.literals.get(&hash).cloned() else {
            return;
        };
        let waiters: Vec<Hash> = self
            .ops_for_missing
            .read()
            .await
            .get(&hash)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .collect();

        for waiter in waiters {
            let resolved: Option<Context> = {
                let mut incomplete = self.incomplete.write().await;
                match incomplete.get_mut(&waiter) {
                    None => None,
                    Some(op) => {
                        op.resolve_dependency(hash, literal.clone());
                        if op.is_complete() {
                            let ctx = op.context.clone();
                            incomplete.remove(&waiter);
                            Some(ctx)
                        } else {
                            None
                        }
                    }
                }
            };
            if let Some(op_context) = resolved {
                let root_literal = op_context
                    .literals
                    .get(&waiter)
                    .cloned()
                    .unwrap_or_else(|| literal.clone());
                if self.accept_and_save(root_literal).await.is_ok() {
                    Box::pin(self.resolve_arrived(waiter, &op_context)).await;
                    self.flush_outgoing(waiter).await;
                } else {
                    tracing::warn!(hash = %waiter, "dropped incomplete op: failed to persist after completion");
                }
            }
        }
        self.ops_for_missing.write().await.remove(&hash);
    }

    /// Release any outgoing movements waiting on `hash` now that it is
    /// persisted locally, sending the deferred `send-objs`.
    pub async fn flush_outgoing(&self, hash: Hash) {
        let waiters: Vec<(PeerId, Movement)> = {
            let mut outgoing = self.outgoing.write().await;
            outgoing.remove(&hash).map(|m| m.into_iter().collect()).unwrap_or_default()
        };
        if waiters.is_empty() {
            return;
        }
        let Some(literal) = self.store.load_literal(hash).await.ok().flatten() else {
            return;
        };
        for (peer, movement) in waiters {
            let mut ctx = Context::new();
            let mut proofs = Vec::new();
            ctx.add_root(hash, literal.clone());
            self.include_dependencies(&literal, &movement.secret, &mut ctx, &mut proofs)
                .await;
            self.send(
                peer,
                &TerminalOpsSyncMessage::SendObjs {
                    target: self.obj_hash,
                    sent_objects: ctx,
                    omitted_deps: proofs,
                    secret: movement.secret,
                },
            )
            .await;
        }
    }

    /// Dispatch one decoded wire message.
    pub async fn handle_message(&self, source: PeerId, msg: TerminalOpsSyncMessage) {
        match msg {
            TerminalOpsSyncMessage::RequestState { target } => {
                self.handle_request_state(source, target).await
            }
            TerminalOpsSyncMessage::SendState {
                target,
                state_literal,
            } => self.handle_send_state(source, target, state_literal).await,
            TerminalOpsSyncMessage::RequestObjs {
                target,
                requested_objects,
                secret,
            } => {
                self.handle_request_objs(source, target, requested_objects, secret)
                    .await
            }
            TerminalOpsSyncMessage::SendObjs {
                target,
                sent_objects,
                omitted_deps,
                secret,
            } => {
                self.handle_send_objs(source, target, sent_objects, omitted_deps, secret)
                    .await
            }
        }
    }

    /// Ask a peer for its terminal-ops state for this target (used when
    /// the gossip layer has told us only a differing hash, not the object).
    pub async fn request_state_from(&self, peer: PeerId) {
        self.send(
            peer,
            &TerminalOpsSyncMessage::RequestState {
                target: self.obj_hash,
            },
        )
        .await;
    }
}

/// Invoked when a [`TerminalOpsSyncAgent`]'s periodic republish produces a
/// new state, so the caller can broadcast `agent-state-update` on the pod
/// (decoupled from `meshstate-agent`'s `AgentPod` type directly so this
/// crate can unit-test the agent without a pod).
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Called with the new state hash and literal after `publish()` detects
    /// a change.
    async fn on_state_published(&self, agent: AgentId, state_hash: Hash, state_literal: Literal);
}

#[async_trait]
impl GossipTrackedAgent for TerminalOpsSyncAgent {
    fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    async fn receive_remote_state(
        &self,
        source: PeerId,
        _state_hash: Hash,
        state: Literal,
    ) -> Result<bool, MeshError> {
        state.verify_hash()?;
        let peer_state: TerminalOpsState = state.materialize()?;
        if peer_state.mutable_obj_hash != self.obj_hash {
            return Err(MeshError::WrongTarget(format!(
                "gossip state for {} delivered to agent for {}",
                peer_state.mutable_obj_hash, self.obj_hash
            )));
        }

        let before: BTreeSet<Hash> = {
            let mut missing = BTreeSet::new();
            for hash in &peer_state.terminal_ops {
                if self.store.load_literal(*hash).await.ok().flatten().is_none()
                    && !self.incomplete.read().await.contains_key(hash)
                {
                    missing.insert(*hash);
                }
            }
            missing
        };

        self.reconcile_against(source, &peer_state).await;
        Ok(!before.is_empty())
    }
}

/// Receives raw wire bytes addressed to this agent's target hash.
pub struct TerminalOpsSyncMessageSink {
    inner: Arc<TerminalOpsSyncAgent>,
}

impl TerminalOpsSyncMessageSink {
    /// Wrap an agent to receive its peer-group messages.
    pub fn new(inner: Arc<TerminalOpsSyncAgent>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl PeerMessageSink for TerminalOpsSyncMessageSink {
    async fn receive_peer_message(
        &self,
        source: PeerId,
        _sender_hash: Hash,
        _recipient_hash: Hash,
        content: Vec<u8>,
    ) {
        match TerminalOpsSyncMessage::from_bytes(&content) {
            Ok(msg) => self.inner.handle_message(source, msg).await,
            Err(e) => tracing::warn!(peer = %source, error = %e, "undecodable terminal-ops message"),
        }
    }
}

/// Adapts `PodEvent::AgentSetChange` (new peer joining the pod's group
/// triggers a state re-request) into calls on the agent. Terminal-ops
/// agents don't otherwise act on pod events directly; publication is
/// driven by `spawn_watch_loop`, not the pod.
pub struct TerminalOpsPodAdapter {
    inner: Arc<TerminalOpsSyncAgent>,
}

impl TerminalOpsPodAdapter {
    /// Wrap an agent for pod registration.
    pub fn new(inner: Arc<TerminalOpsSyncAgent>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl meshstate_agent::LocalAgent for TerminalOpsPodAdapter {
    fn agent_id(&self) -> AgentId {
        self.inner.agent_id
    }

    async fn handle_pod_event(&self, event: PodEvent) {
        if let PodEvent::NewPeer { endpoint } = event {
            self.inner.request_state_from(endpoint).await;
        }
    }
}

/// Bridges a [`TerminalOpsSyncAgent`]'s `publish()` results onto an
/// [`meshstate_agent::AgentPod`]'s `agent-state-update` event, which the
/// gossip agent picks up via [`StateGossipPodAdapter`](crate::state_gossip::StateGossipPodAdapter).
pub struct PodPublishSink {
    pod: Arc<meshstate_agent::AgentPod>,
}

impl PodPublishSink {
    /// Wrap a pod so published states are broadcast to it.
    pub fn new(pod: Arc<meshstate_agent::AgentPod>) -> Self {
        Self { pod }
    }
}

#[async_trait]
impl PublishSink for PodPublishSink {
    async fn on_state_published(&self, agent: AgentId, state_hash: Hash, state_literal: Literal) {
        self.pod
            .broadcast_event(PodEvent::AgentStateUpdate {
                agent,
                state_hash,
                state_literal,
            })
            .await;
    }
}
