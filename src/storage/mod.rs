//! Key/value storage backends
//!
//! - Memory: default backend, also used throughout the tests
//! - Postgres: durable JSONB-backed store
//!
//! Keys are slash-delimited resource paths. Writers publish [`KvEvent`]s on a
//! broadcast channel so watch sockets can stream changes.

mod memory;
mod postgres;

pub use memory::MemoryStorage;
pub use postgres::{PostgresConfig, PostgresStorage};

pub use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A change observed on the store
#[derive(Debug, Clone, Serialize)]
pub struct KvEvent {
    pub key: String,
    pub op: KvOp,
    /// Present for `set`, absent for `delete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KvOp {
    Set,
    Delete,
}

/// Trait for key/value storage
///
/// Each operation is atomic with respect to itself; `set_if_absent` is the
/// atomic insert primitive registration relies on.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the value at `key`.
    async fn get(&self, key: &str) -> Result<serde_json::Value, StorageError>;

    /// Write `value` at `key`, overwriting any existing value.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError>;

    /// Write `value` at `key` only if the key does not exist yet.
    async fn set_if_absent(&self, key: &str, value: serde_json::Value)
        -> Result<(), StorageError>;

    /// Remove the value at `key`.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// All keys starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Subscribe to change events.
    fn watch(&self) -> broadcast::Receiver<KvEvent>;
}
