//! Repo collections: discovery and population.
//!
//! A [`RepoCollection`] discovers the importable repositories behind a
//! collection url and can populate a target [`Tree`] from one of them.
//! Two variants exist: a local template directory
//! ([`FilesystemRepoCollection`]) and an external hosting API
//! ([`HostingRepoCollection`]). The variant is selected once, from the
//! url shape, at construction time.

mod fetch;
mod filesystem;
mod hosting;

pub use fetch::{ClientCredential, Fetch, FetchError, FetchResponse, ReqwestFetcher};
pub use filesystem::FilesystemRepoCollection;
pub use hosting::{HostingRepoCollection, RepoNameFilter};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Settings;
use crate::model::{collection_kind_for_url, CollectionKind, Repo};
use crate::tree::{Tree, TreeError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during discovery and population.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The collection url does not identify a usable source.
    #[error("invalid collection url: {0}")]
    InvalidUrl(String),

    /// A required fetch (repo list, file list) failed with a bad status.
    #[error("fetch {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    /// A required fetch failed at the transport level.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A hosting-API payload could not be parsed.
    #[error("malformed payload from {url}: {source}")]
    MalformedPayload {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Writing into the target tree failed.
    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// A filesystem read failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, CollectionError>;

// =============================================================================
// Types
// =============================================================================

/// A repository discovered in a collection, before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSpec {
    /// Unique source url for the repo.
    pub url: String,
    pub name: String,
    pub description: String,
}

// =============================================================================
// RepoCollection Trait
// =============================================================================

/// A discoverable source of importable repositories.
#[async_trait]
pub trait RepoCollection: Send + Sync {
    /// The collection url this instance reads from.
    fn collection_url(&self) -> &str;

    /// List the importable repositories behind the collection url.
    ///
    /// Discovery performs no writes, so a failed discovery is always
    /// safe for the task layer to retry.
    async fn discover(&self) -> Result<Vec<RepoSpec>>;

    /// Copy one discovered repo's files into the target tree.
    ///
    /// Clears the tree first so partial prior state cannot leak into the
    /// import. Per-file failures are logged and skipped; only a failure
    /// to enumerate the repo's files fails the job.
    async fn populate(&self, tree: &dyn Tree, repo: &Repo) -> Result<()>;
}

// =============================================================================
// Variant Dispatch
// =============================================================================

/// Builds the right [`RepoCollection`] variant for a collection url.
pub struct SettingsCollectionFactory {
    settings: Settings,
    fetcher: Arc<dyn Fetch>,
}

impl SettingsCollectionFactory {
    pub fn new(settings: Settings, fetcher: Arc<dyn Fetch>) -> Self {
        Self { settings, fetcher }
    }

    /// Build a factory whose fetcher carries the configured hosting-API
    /// credential, if any.
    pub fn from_settings(settings: Settings) -> Self {
        let credential = match (&settings.hosting.client_id, &settings.hosting.client_secret) {
            (Some(id), Some(secret)) => Some(ClientCredential {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        };
        let fetcher = Arc::new(ReqwestFetcher::new().with_credential(credential));
        Self::new(settings, fetcher)
    }

    /// Select the variant from the url shape.
    pub fn collection_for(&self, url: &str) -> Result<Box<dyn RepoCollection>> {
        match collection_kind_for_url(url) {
            CollectionKind::Filesystem => Ok(Box::new(FilesystemRepoCollection::new(
                url,
                self.settings.skip_extensions.clone(),
            ))),
            CollectionKind::HostingApi => Ok(Box::new(HostingRepoCollection::new(
                url,
                &self.settings.hosting.api_base,
                RepoNameFilter::from_settings(&self.settings.hosting),
                self.fetcher.clone(),
            )?)),
        }
    }
}
