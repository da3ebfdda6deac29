//! A [`Store`] built over any [`StorageEffects`] backend.

use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use meshstate_core::effects::storage::StorageEffects;
use meshstate_core::{Hash, HashedObject, Literal, TerminalOpsState};

use crate::error::StoreError;
use crate::store::{OpHeader, ReferenceEvent, ReferenceWatch, Store};

const LITERAL_PREFIX: &str = "literal:";
const TERMINAL_PREFIX: &str = "terminal:";

fn literal_key(hash: Hash) -> String {
    format!("{LITERAL_PREFIX}{}", hash.to_hex())
}

fn terminal_key(mutable_hash: Hash) -> String {
    format!("{TERMINAL_PREFIX}{}", mutable_hash.to_hex())
}

/// [`Store`] implementation layered over a raw [`StorageEffects`] backend,
/// the same way `aura-anti-entropy`'s `PersistentSyncHandler` layers a
/// higher-level sync contract over `StorageEffects` directly. Keeps a small
/// in-memory cache of terminal-ops state per mutable object to avoid a
/// round trip on every incremental update, guarded by `async_lock::RwLock`.
pub struct MemoryStore<S: StorageEffects> {
    backend: S,
    terminal_cache: RwLock<HashMap<Hash, TerminalOpsState>>,
    ref_tx: tokio::sync::broadcast::Sender<ReferenceEvent>,
}

impl<S: StorageEffects> MemoryStore<S> {
    /// Wrap a storage backend as a `Store`. `event_capacity` bounds the
    /// reference-event broadcast channel; lagging watchers skip ahead
    /// rather than error (see [`ReferenceWatch::next`]).
    pub fn new(backend: S, event_capacity: usize) -> Self {
        let (ref_tx, _) = tokio::sync::broadcast::channel(event_capacity.max(1));
        Self {
            backend,
            terminal_cache: RwLock::new(HashMap::new()),
            ref_tx,
        }
    }

    async fn load_terminal_ops_internal(
        &self,
        mutable_hash: Hash,
    ) -> Result<Option<TerminalOpsState>, StoreError> {
        if let Some(cached) = self.terminal_cache.read().await.get(&mutable_hash) {
            return Ok(Some(cached.clone()));
        }
        let key = terminal_key(mutable_hash);
        let Some(bytes) = self.backend.retrieve(&key).await? else {
            return Ok(None);
        };
        let state: TerminalOpsState =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Core(e.into()))?;
        self.terminal_cache
            .write()
            .await
            .insert(mutable_hash, state.clone());
        Ok(Some(state))
    }

    async fn persist_terminal_ops(&self, state: &TerminalOpsState) -> Result<(), StoreError> {
        let key = terminal_key(state.mutable_obj_hash);
        let bytes = serde_json::to_vec(state).map_err(|e| StoreError::Core(e.into()))?;
        self.backend.store(&key, bytes).await?;
        self.terminal_cache
            .write()
            .await
            .insert(state.mutable_obj_hash, state.clone());
        Ok(())
    }

    async fn literal_exists(&self, hash: Hash) -> Result<bool, StoreError> {
        Ok(self.backend.exists(&literal_key(hash)).await?)
    }
}

#[async_trait]
impl<S: StorageEffects> Store for MemoryStore<S> {
    async fn save(&self, literal: Literal, op_header: Option<OpHeader>) -> Result<(), StoreError> {
        literal.verify_hash().map_err(StoreError::Core)?;

        if let Some(header) = &op_header {
            if literal.is_unsigned() {
                return Err(StoreError::Core(meshstate_core::MeshError::invalid(
                    "mutation op literal carries no signature",
                )));
            }
            for prev in &header.prev_ops {
                if !self.literal_exists(*prev).await? {
                    return Err(StoreError::Core(meshstate_core::MeshError::MissingDependency(
                        format!("prevOp {prev} not yet persisted"),
                    )));
                }
            }
        }

        // Idempotent by hash: re-saving the same literal is a no-op past
        // this point, but we still re-run op-header bookkeeping below so a
        // duplicate delivery doesn't desync the terminal-ops index.
        if !self.literal_exists(literal.hash).await? {
            let bytes = serde_json::to_vec(&literal).map_err(|e| StoreError::Core(e.into()))?;
            self.backend.store(&literal_key(literal.hash), bytes).await?;
        }

        for dep in &literal.dependencies {
            let event = ReferenceEvent {
                field: dep.path.clone(),
                referenced_hash: dep.hash,
                referring_hash: literal.hash,
            };
            // No receivers is not an error: notification is best-effort fan
            // out, not a delivery guarantee to a specific subscriber count.
            let _ = self.ref_tx.send(event);
        }

        if let Some(header) = op_header {
            let mut state = self
                .load_terminal_ops_internal(header.target)
                .await?
                .unwrap_or(TerminalOpsState {
                    mutable_obj_hash: header.target,
                    terminal_ops: BTreeSet::new(),
                });
            state.terminal_ops.insert(literal.hash);
            for prev in &header.prev_ops {
                state.terminal_ops.remove(prev);
            }
            self.persist_terminal_ops(&state).await?;
        }

        Ok(())
    }

    async fn load(&self, hash: Hash) -> Result<Option<HashedObject>, StoreError> {
        match self.load_literal(hash).await? {
            Some(literal) => Ok(Some(
                HashedObject::from_literal(literal).map_err(StoreError::Core)?,
            )),
            None => Ok(None),
        }
    }

    async fn load_literal(&self, hash: Hash) -> Result<Option<Literal>, StoreError> {
        let Some(bytes) = self.backend.retrieve(&literal_key(hash)).await? else {
            return Ok(None);
        };
        let literal: Literal =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Core(e.into()))?;
        Ok(Some(literal))
    }

    async fn load_terminal_ops_for_mutable(
        &self,
        mutable_hash: Hash,
    ) -> Result<Option<TerminalOpsState>, StoreError> {
        self.load_terminal_ops_internal(mutable_hash).await
    }

    fn watch_references(&self, field: &str, hash: Hash) -> ReferenceWatch {
        ReferenceWatch::new(field.to_string(), hash, self.ref_tx.subscribe())
    }
}

/// Convenience alias for the common case of wrapping a shared backend.
pub type SharedMemoryStore<S> = MemoryStore<Arc<S>>;

#[cfg(test)]
mod tests {
    use super::*;
    use meshstate_core::effects::storage::StorageError;
    use meshstate_core::identifiers::AuthorId;
    use meshstate_core::literal::{Dependency, Signature};

    #[derive(Default)]
    struct InMemoryBackend {
        map: RwLock<HashMap<String, Vec<u8>>>,
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

        async fn store_batch(
            &self,
            pairs: HashMap<String, Vec<u8>>,
        ) -> Result<(), StorageError> {
            self.map.write().await.extend(pairs);
            Ok(())
        }
    }

    fn sig() -> Signature {
        Signature {
            signer: AuthorId::new(),
            bytes: vec![1],
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = MemoryStore::new(InMemoryBackend::default(), 16);
        let lit = Literal::canonicalize(&"value", vec![], vec![sig()]).unwrap();
        store.save(lit.clone(), None).await.unwrap();
        let loaded = store.load(lit.hash).await.unwrap().unwrap();
        assert_eq!(loaded.hash, lit.hash);
    }

    #[tokio::test]
    async fn save_rejects_missing_prev_op() {
        let store = MemoryStore::new(InMemoryBackend::default(), 16);
        let target = Hash::of_bytes(b"target");
        let missing_prev = Hash::of_bytes(b"ghost");
        let lit = Literal::canonicalize(&"op", vec![], vec![sig()]).unwrap();
        let header = OpHeader {
            target,
            prev_ops: BTreeSet::from([missing_prev]),
        };
        let err = store.save(lit, Some(header)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Core(meshstate_core::MeshError::MissingDependency(_))
        ));
    }

    #[tokio::test]
    async fn terminal_ops_advance_on_new_op() {
        let store = MemoryStore::new(InMemoryBackend::default(), 16);
        let target = Hash::of_bytes(b"mutable-object");

        let op1 = Literal::canonicalize(&"op1", vec![], vec![sig()]).unwrap();
        store
            .save(
                op1.clone(),
                Some(OpHeader {
                    target,
                    prev_ops: BTreeSet::new(),
                }),
            )
            .await
            .unwrap();

        let state = store
            .load_terminal_ops_for_mutable(target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.terminal_ops, BTreeSet::from([op1.hash]));

        let op2 = Literal::canonicalize(&"op2", vec![], vec![sig()]).unwrap();
        store
            .save(
                op2.clone(),
                Some(OpHeader {
                    target,
                    prev_ops: BTreeSet::from([op1.hash]),
                }),
            )
            .await
            .unwrap();

        let state = store
            .load_terminal_ops_for_mutable(target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.terminal_ops, BTreeSet::from([op2.hash]));
    }

    #[tokio::test]
    async fn watch_references_receives_matching_event() {
        let store = MemoryStore::new(InMemoryBackend::default(), 16);
        let target_hash = Hash::of_bytes(b"watched");
        let mut watch = store.watch_references("target", target_hash);

        let dep = Dependency::reference(target_hash, "target");
        let lit = Literal::canonicalize(&"referrer", vec![dep], vec![sig()]).unwrap();
        store.save(lit.clone(), None).await.unwrap();

        let event = watch.next().await.unwrap();
        assert_eq!(event.referenced_hash, target_hash);
        assert_eq!(event.referring_hash, lit.hash);
    }
}
