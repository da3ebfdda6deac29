//! Global registry of mutation-op payload classes (spec.md §9, "dynamic
//! dispatch on op class" / "global registries").
//!
//! `MutationOp` carries its `class_name` and an opaque `payload: Vec<u8>`
//! (spec.md §3). The sync protocol only ever inspects `target`, `prevOps`,
//! `causalOps`, `class_name`, and `signatures` — it never needs to decode
//! the payload itself. Mutable-object logic above this crate does, though,
//! and this registry is what lets it rehydrate a payload into the concrete
//! Rust type for `class_name` without an open-coded match growing here
//! every time a new op class is added. Initialize at startup by calling
//! [`register_op_class`] once per class; there is no de-registration.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::errors::MeshError;

/// Decodes a class-specific payload from its canonical bytes into a boxed
/// value the caller downcasts to the concrete payload type registered for
/// that class name.
pub type PayloadDecoder = fn(&[u8]) -> Result<Box<dyn Any + Send + Sync>, MeshError>;

fn registry() -> &'static RwLock<HashMap<&'static str, PayloadDecoder>> {
    static REGISTRY: OnceLock<RwLock<HashMap<&'static str, PayloadDecoder>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a mutation-op class's payload decoder. Intended to run at
/// process startup, before any op of this class is received; calling this
/// again for the same `class_name` replaces its decoder (there is no
/// supported way to remove a class once registered).
pub fn register_op_class(class_name: &'static str, decoder: PayloadDecoder) {
    let mut guard = registry().write().unwrap_or_else(|e| e.into_inner());
    guard.insert(class_name, decoder);
}

/// Decode `payload` using the decoder registered under `class_name`.
pub fn decode_op_payload(
    class_name: &str,
    payload: &[u8],
) -> Result<Box<dyn Any + Send + Sync>, MeshError> {
    let guard = registry().read().unwrap_or_else(|e| e.into_inner());
    let decoder = guard
        .get(class_name)
        .ok_or_else(|| MeshError::UnacceptableOp(format!("no decoder registered for {class_name}")))?;
    decoder(payload)
}

/// Whether `class_name` has a registered payload decoder.
pub fn is_registered(class_name: &str) -> bool {
    registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .contains_key(class_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct AddUserPayload {
        user: String,
    }

    fn decode_add_user(bytes: &[u8]) -> Result<Box<dyn Any + Send + Sync>, MeshError> {
        let user = String::from_utf8(bytes.to_vec())
            .map_err(|e| MeshError::Serialization(e.to_string()))?;
        Ok(Box::new(AddUserPayload { user }))
    }

    #[test]
    fn register_then_decode_round_trips() {
        register_op_class("AddUser", decode_add_user);
        assert!(is_registered("AddUser"));

        let decoded = decode_op_payload("AddUser", b"alice").unwrap();
        let payload = decoded.downcast_ref::<AddUserPayload>().unwrap();
        assert_eq!(payload.user, "alice");
    }

    #[test]
    fn unregistered_class_is_rejected() {
        assert!(!is_registered("NoSuchClass"));
        assert!(decode_op_payload("NoSuchClass", b"x").is_err());
    }
}
