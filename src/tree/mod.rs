//! The virtual file-tree abstraction.
//!
//! A [`Tree`] is a namespaced mapping from normalized paths to file
//! contents. No directory entities are stored; directories are inferred
//! from the path prefixes of existing files. The contract below must
//! hold for every backend, whether it is a durable key/value store
//! ([`PersistentTree`]) or a remote HTTP service ([`RemoteTree`]), so
//! calling code never branches on which backend it was given.

mod caching_remote_tree;
pub mod path;
mod persistent_tree;
mod remote_tree;

pub use caching_remote_tree::CachingRemoteTree;
pub use persistent_tree::PersistentTree;
pub use remote_tree::RemoteTree;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during tree operations.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The path is malformed; rejected before any I/O.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    /// A remote backend call returned a non-2xx status.
    #[error("remote error (status {status}): {body}")]
    Remote { status: u16, body: String },

    /// The underlying key/value store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A transport-level HTTP failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for tree operations.
pub type Result<T> = std::result::Result<T, TreeError>;

// =============================================================================
// Types
// =============================================================================

/// One entry in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    /// Base name of the file or directory.
    pub name: String,
    /// Whether the entry is a directory (inferred from path prefixes).
    #[serde(rename = "isDirectory")]
    pub is_directory: bool,
}

// =============================================================================
// Tree Trait
// =============================================================================

/// The uniform file-tree contract.
///
/// All paths are validated with [`path::normalize_path`] before any I/O.
/// Within one instance, operations issued sequentially observe
/// read-your-writes consistency.
#[async_trait]
pub trait Tree: Send + Sync {
    /// Read a file's contents.
    ///
    /// Returns `Ok(None)` if the file does not exist. An existing empty
    /// file returns `Ok(Some(vec![]))`, which is distinct from absence.
    async fn get_file_contents(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Create or overwrite a file.
    async fn set_file(&self, path: &str, content: Vec<u8>) -> Result<()>;

    /// Move a file.
    ///
    /// Returns [`TreeError::NotFound`] if `old_path` does not exist.
    /// Observably equivalent to read-old, write-new, delete-old.
    async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()>;

    /// Delete a file, or every file under a directory-shaped path.
    ///
    /// Deleting a non-existent path is a no-op, not an error.
    async fn delete_path(&self, path: &str) -> Result<()>;

    /// List the immediate children of a directory (`None` for the root).
    ///
    /// Directory names are deduplicated; entries are in lexicographic
    /// order.
    async fn list_directory(&self, path: Option<&str>) -> Result<Vec<ListEntry>>;

    /// Remove every file in the tree.
    ///
    /// Used before bulk population so partial prior state cannot leak
    /// into a freshly imported project.
    async fn clear(&self) -> Result<()>;
}

// =============================================================================
// Listing Helper
// =============================================================================

/// Derive the immediate children of `dir` from a flat set of stored
/// paths.
///
/// `dir` is a normalized directory path, or `None` for the root. A name
/// that appears both as a file and as a directory prefix is reported as
/// a directory.
pub(crate) fn derive_listing<'a>(
    paths: impl IntoIterator<Item = &'a str>,
    dir: Option<&str>,
) -> Vec<ListEntry> {
    let prefix = match dir {
        Some(d) => format!("{}/", d),
        None => String::new(),
    };

    let mut children: BTreeMap<String, bool> = BTreeMap::new();
    for path in paths {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.split_once('/') {
            Some((name, _)) => {
                children.insert(name.to_string(), true);
            }
            None => {
                children.entry(rest.to_string()).or_insert(false);
            }
        }
    }

    children
        .into_iter()
        .map(|(name, is_directory)| ListEntry { name, is_directory })
        .collect()
}
