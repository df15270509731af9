//! Namespaced key/value storage.
//!
//! Every durable byte of this system lives behind [`KeyValueStore`]: the
//! per-project file trees (one namespace per project) and the repo
//! metadata records. Namespaces are fully isolated from each other.

mod lmdb_store;
mod memory_store;

pub use lmdb_store::LmdbStore;
pub use memory_store::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during key/value store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database error (e.g., from LMDB).
    #[error("database error: {0}")]
    Database(String),

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for key/value store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

// =============================================================================
// KeyValueStore Trait
// =============================================================================

/// A namespaced key/value store.
///
/// Writes are strongly consistent within a namespace: a completed `put`
/// is visible to any subsequent `get` on the same store, from any caller.
/// Keys within a namespace are unique; `keys` enumerates them in
/// lexicographic order.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value for a key, returning `None` if not present.
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Set a key to a value, creating or overwriting.
    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key. Deleting an absent key is a no-op.
    async fn delete(&self, namespace: &str, key: &str) -> Result<()>;

    /// List keys in a namespace starting with `prefix`, sorted.
    ///
    /// An empty prefix lists every key in the namespace.
    async fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>>;

    /// Delete every key in a namespace.
    async fn clear(&self, namespace: &str) -> Result<()>;
}
