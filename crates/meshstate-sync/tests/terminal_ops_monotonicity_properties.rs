//! Property test for store monotonicity (spec.md testable property 2):
//! after each op is saved, the terminal-ops frontier the store maintains
//! incrementally must equal the frontier recomputed from scratch over every
//! op persisted so far — "every op is terminal except those referenced as a
//! `prevOp` by some other persisted op".

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use proptest::prelude::*;

use meshstate_core::effects::storage::{StorageEffects, StorageError};
use meshstate_core::identifiers::AuthorId;
use meshstate_core::literal::Signature;
use meshstate_core::{Hash, Literal};
use meshstate_store::{MemoryStore, OpHeader, Store};

#[derive(Default)]
struct InMemoryBackend {
    map: async_lock::RwLock<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl StorageEffects for InMemoryBackend {
    async fn store(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.map.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn retrieve(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.map.write().await.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: Option<&str>) -> Result<Vec<String>, StorageError> {
        let guard = self.map.read().await;
        Ok(guard
            .keys()
            .filter(|k| prefix.map(|p| k.starts_with(p)).unwrap_or(true))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.map.read().await.contains_key(key))
    }

    async fn store_batch(&self, pairs: HashMap<String, Vec<u8>>) -> Result<(), StorageError> {
        self.map.write().await.extend(pairs);
        Ok(())
    }
}

fn sig() -> Signature {
    Signature {
        signer: AuthorId::new(),
        bytes: vec![1, 2, 3],
    }
}

/// A literal distinguished by `(target, seq)`, so every op in a generated
/// DAG hashes distinctly even when two ops share the same `prevOps` set.
fn op_literal(target: Hash, seq: usize) -> Literal {
    Literal::canonicalize(&(target, seq), vec![], vec![sig()]).unwrap()
}

/// A DAG over `n` ops (2..=8), where op `i`'s `prevOps` is a random subset
/// of `{0, ..., i-1}` — every op can only reference earlier ops, so the
/// generated order is already a valid persist order.
fn arb_dag(max_n: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
    (2..=max_n).prop_flat_map(|n| {
        prop::collection::vec(any::<u32>(), n).prop_map(move |masks| {
            masks
                .into_iter()
                .enumerate()
                .map(|(i, mask)| (0..i).filter(|j| mask & (1 << j) != 0).collect::<Vec<usize>>())
                .collect::<Vec<Vec<usize>>>()
        })
    })
}

proptest! {
    #[test]
    fn terminal_ops_match_brute_force_recomputation(prev_indices in arb_dag(8)) {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let store = MemoryStore::new(InMemoryBackend::default(), 16);
            let target = Hash::of_bytes(b"monotonicity-target");

            let mut hashes = Vec::with_capacity(prev_indices.len());
            let mut referenced = BTreeSet::new();

            for (seq, prevs) in prev_indices.iter().enumerate() {
                let literal = op_literal(target, seq);
                hashes.push(literal.hash);

                let prev_ops: BTreeSet<Hash> = prevs.iter().map(|&j| hashes[j]).collect();
                for h in &prev_ops {
                    referenced.insert(*h);
                }

                store
                    .save(literal, Some(OpHeader { target, prev_ops }))
                    .await
                    .unwrap();

                // Brute force: every op persisted so far minus every op
                // referenced as a prevOp by any op persisted so far.
                let persisted: BTreeSet<Hash> = hashes[..=seq].iter().copied().collect();
                let expected: BTreeSet<Hash> = persisted.difference(&referenced).copied().collect();

                let state = store
                    .load_terminal_ops_for_mutable(target)
                    .await
                    .unwrap()
                    .unwrap();

                prop_assert_eq!(
                    state.terminal_ops,
                    expected,
                    "terminal-ops frontier diverged from brute-force recomputation after op {}",
                    seq
                );
            }
        });
    }
}
