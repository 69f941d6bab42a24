//! Durable storage tier for graph elements.
//!
//! [`DurableStore`] keeps bincode-encoded vertices, edges and property
//! definitions in redb tables. The in-memory graph writes its dirty elements
//! here on every flush and reloads them on open.

pub mod durable;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

pub use durable::{DurableStore, Table, WriteOp};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Encode a record for storage.
pub fn encode<T: Serialize>(what: &str, value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization {
        message: format!("failed to serialize {what}: {e}"),
    })
}

/// Decode a stored record.
pub fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization {
        message: format!("failed to deserialize {what}: {e}"),
    })
}
