//! # Durable Store Contract
//!
//! The key-value contract the offline queue persists through.
//!
//! ## Guarantees Expected From Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  • A call that returns Ok has been made durable                        │
//! │  • A call that returns Err has changed nothing                         │
//! │  • write_batch applies every write or none of them                     │
//! │  • list_prefix returns entries sorted by key                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;

use crate::error::DbResult;

/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Put { key: String, value: String },
    Delete { key: String },
}

impl KvWrite {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        KvWrite::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        KvWrite::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            KvWrite::Put { key, .. } | KvWrite::Delete { key } => key,
        }
    }
}

/// Local durable key-value persistence that survives process restarts.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Reads one value.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Inserts or replaces one value.
    async fn put(&self, key: &str, value: &str) -> DbResult<()>;

    /// Deletes one value. Returns false if the key was absent.
    async fn delete(&self, key: &str) -> DbResult<bool>;

    /// Lists every entry whose key starts with `prefix`, sorted by key.
    async fn list_prefix(&self, prefix: &str) -> DbResult<Vec<(String, String)>>;

    /// Deletes every entry whose key starts with `prefix`. Returns the count.
    async fn delete_prefix(&self, prefix: &str) -> DbResult<u64>;

    /// Applies all writes atomically, in order.
    async fn write_batch(&self, writes: Vec<KvWrite>) -> DbResult<()>;
}
