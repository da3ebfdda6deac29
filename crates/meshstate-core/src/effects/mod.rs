//! Infrastructure effect trait definitions (interfaces only; implementations
//! live in `meshstate-store` and `meshstate-agent`).

pub mod network;
pub mod storage;

pub use network::{NetworkError, PeerMessaging};
pub use storage::{StorageEffects, StorageError};
