//! Property tests for the literal codec's round-trip laws: `literalize ∘
//! materialize` is identity on hash, and a `Context` built from a literal
//! preserves its root hashes and literals map.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

use meshstate_core::{Context, Dependency, Hash, Literal};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct SamplePayload {
    id: u64,
    tag: String,
    values: Vec<u8>,
}

fn arb_payload() -> impl Strategy<Value = SamplePayload> {
    (
        any::<u64>(),
        "[a-z]{0,12}",
        prop::collection::vec(any::<u8>(), 0..16),
    )
        .prop_map(|(id, tag, values)| SamplePayload { id, tag, values })
}

fn arb_hash() -> impl Strategy<Value = Hash> {
    prop::collection::vec(any::<u8>(), 1..32).prop_map(|bytes| Hash::of_bytes(&bytes))
}

proptest! {
    /// `literalize ∘ materialize` is identity on hash: canonicalizing a
    /// value, decoding it back, then re-canonicalizing the decoded value
    /// reproduces the original literal's hash.
    #[test]
    fn literalize_materialize_round_trip_preserves_hash(payload in arb_payload()) {
        let literal = Literal::canonicalize(&payload, vec![], vec![]).unwrap();
        let materialized: SamplePayload = literal.materialize().unwrap();
        prop_assert_eq!(&materialized, &payload);

        let relitaralized = Literal::canonicalize(&materialized, vec![], vec![]).unwrap();
        prop_assert_eq!(relitaralized.hash, literal.hash);
    }

    /// A `Context` built from a single root literal preserves that root's
    /// hash in `root_hashes` and its literal in `literals`, and reports
    /// exactly the declared (synthetic, unresolved) dependency hashes as
    /// missing.
    #[test]
    fn context_round_trip_preserves_root_hashes_and_literals(
        payload in arb_payload(),
        dep_hashes in prop::collection::vec(arb_hash(), 0..4),
    ) {
        let deps: Vec<Dependency> = dep_hashes
            .iter()
            .enumerate()
            .map(|(i, h)| Dependency::reference(*h, format!("dep.{i}")))
            .collect();
        let literal = Literal::canonicalize(&payload, deps, vec![]).unwrap();

        let mut ctx = Context::new();
        ctx.add_root(literal.hash, literal.clone());

        prop_assert!(ctx.validate().is_ok());
        prop_assert_eq!(ctx.root_hashes.clone(), vec![literal.hash]);
        prop_assert_eq!(ctx.literals.get(&literal.hash), Some(&literal));

        let expected: BTreeSet<Hash> = dep_hashes.iter().copied().collect();
        let missing: BTreeSet<Hash> = ctx.find_missing_deps(literal.hash).into_iter().collect();
        prop_assert_eq!(missing, expected);
    }
}
