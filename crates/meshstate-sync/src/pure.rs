//! Pure decision helpers for the sync agents. No I/O; safe to property test.

use std::collections::BTreeSet;

use meshstate_core::{Context, Hash, Literal};

/// Gossip fan-out size for a state update: `max(minGossipPeers,
/// ceil(peerCount * peerGossipFraction))`, clamped to the actual peer count
/// (spec.md §4.4 step 2).
pub fn gossip_fanout_size(peer_count: usize, min_gossip_peers: usize, peer_gossip_fraction: f64) -> usize {
    if peer_count == 0 {
        return 0;
    }
    let fraction_count = (peer_count as f64 * peer_gossip_fraction).ceil() as usize;
    min_gossip_peers.max(fraction_count).min(peer_count)
}

/// Validate a `request-objs` dependency chain (spec.md §4.5 R1): each
/// consecutive pair `(chain[i], chain[i+1])` must appear as a dependency of
/// `chain[i]`'s literal in `ctx`, the chain must start at `target` (or be
/// empty when `requested == target`), and must end at `requested`.
pub fn validate_dependency_chain(
    ctx: &Context,
    target: Hash,
    chain: &[Hash],
    requested: Hash,
) -> bool {
    if chain.is_empty() {
        return requested == target;
    }
    if chain[0] != target {
        return false;
    }
    if *chain.last().unwrap() != requested {
        return false;
    }
    for pair in chain.windows(2) {
        let (from, to) = (pair[0], pair[1]);
        let Some(literal) = ctx.literals.get(&from) else {
            return false;
        };
        if !literal.dependencies.iter().any(|d| d.hash == to) {
            return false;
        }
    }
    true
}

/// Whether `literal` is well-formed enough to even attempt op validation:
/// its hash recomputes and it carries at least one signature.
pub fn is_plausible_op_literal(literal: &Literal) -> bool {
    literal.verify_hash().is_ok() && !literal.is_unsigned()
}

/// Given the peer's terminal-ops set and what we already hold (persisted or
/// pending as an incomplete op), compute the ops we should request.
pub fn ops_to_request(
    remote_terminal_ops: &BTreeSet<Hash>,
    locally_present: impl Fn(Hash) -> bool,
) -> Vec<Hash> {
    remote_terminal_ops
        .iter()
        .copied()
        .filter(|h| !locally_present(*h))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshstate_core::Dependency;

    #[test]
    fn fanout_respects_floor_and_peer_count() {
        assert_eq!(gossip_fanout_size(3, 4, 0.2), 3);
        assert_eq!(gossip_fanout_size(100, 4, 0.2), 20);
        assert_eq!(gossip_fanout_size(0, 4, 0.2), 0);
    }

    #[test]
    fn empty_chain_valid_only_when_requested_is_target() {
        let ctx = Context::new();
        let target = Hash::of_bytes(b"t");
        assert!(validate_dependency_chain(&ctx, target, &[], target));
        assert!(!validate_dependency_chain(
            &ctx,
            target,
            &[],
            Hash::of_bytes(b"other")
        ));
    }

    #[test]
    fn chain_must_be_linked_through_context_dependencies() {
        let mut ctx = Context::new();
        let leaf = Literal::canonicalize(&"leaf", vec![], vec![]).unwrap();
        let leaf_hash = leaf.hash;
        let dep = Dependency::reference(leaf_hash, "child");
        let root = Literal::canonicalize(&"root", vec![dep], vec![]).unwrap();
        ctx.add_root(root.hash, root.clone());
        ctx.add_literal(leaf_hash, leaf);

        assert!(validate_dependency_chain(
            &ctx,
            root.hash,
            &[root.hash, leaf_hash],
            leaf_hash
        ));
        assert!(!validate_dependency_chain(
            &ctx,
            root.hash,
            &[root.hash, Hash::of_bytes(b"unrelated")],
            Hash::of_bytes(b"unrelated")
        ));
    }
}
