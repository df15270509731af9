//! Repo and repo-collection records.
//!
//! Records are serde_json documents in a dedicated metadata namespace of
//! the key/value store. Every write is an upsert: the background
//! discovery task runs with at-least-once semantics, so re-creating a
//! repo or collection with the same url must converge rather than
//! duplicate. Listings are read-through cached with a bounded TTL.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::ExpiringCache;
use crate::store::{KeyValueStore, StoreError};

/// Store namespace holding all metadata records.
pub const META_NAMESPACE: &str = "playground-meta";

const COLLECTION_KEY_PREFIX: &str = "collection:";
const REPO_KEY_PREFIX: &str = "repo:";

const COLLECTIONS_CACHE_KEY: &str = "collections";

// Project names must fit in front of '-dot-appid' style hostnames.
const MAX_PROJECT_NAME_LEN: usize = 50;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during metadata operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored record could not be encoded or decoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for metadata operations.
pub type Result<T> = std::result::Result<T, ModelError>;

// =============================================================================
// Records
// =============================================================================

/// Which kind of source a repo collection is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// A local directory of template projects.
    Filesystem,
    /// An external code-hosting API.
    HostingApi,
}

/// A discoverable source of importable repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCollectionRecord {
    /// The collection url; unique id.
    pub url: String,
    pub kind: CollectionKind,
}

/// One importable repository or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    /// The repo's source url; unique id.
    pub url: String,
    pub name: String,
    pub description: String,
    /// Url of the owning collection.
    pub collection_url: String,
}

/// Infer the collection kind from the url shape: absolute http(s) urls
/// are hosting APIs, everything else is a filesystem path.
pub fn collection_kind_for_url(url: &str) -> CollectionKind {
    if url.starts_with("http://") || url.starts_with("https://") {
        CollectionKind::HostingApi
    } else {
        CollectionKind::Filesystem
    }
}

/// Derive the project namespace a repo imports into.
///
/// Valid project names are lowercase `[a-z0-9-]`, at most 50 characters.
pub fn project_namespace_for(repo_url: &str) -> String {
    let mut name = String::with_capacity(repo_url.len());
    for c in repo_url.chars() {
        match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => name.push(c),
            _ => {
                if !name.ends_with('-') {
                    name.push('-');
                }
            }
        }
    }
    let name = name.trim_matches('-');
    let start = name.len().saturating_sub(MAX_PROJECT_NAME_LEN);
    // keep the tail, which carries the repo name rather than the scheme
    name[start..].trim_matches('-').to_string()
}

// =============================================================================
// Metadata Service
// =============================================================================

/// Access to repo and collection records.
pub struct Metadata {
    store: Arc<dyn KeyValueStore>,
    cache: ExpiringCache,
}

impl Metadata {
    pub fn new(store: Arc<dyn KeyValueStore>, cache: ExpiringCache) -> Self {
        Self { store, cache }
    }

    fn collection_key(url: &str) -> String {
        format!("{}{}", COLLECTION_KEY_PREFIX, url)
    }

    fn repo_key(url: &str) -> String {
        format!("{}{}", REPO_KEY_PREFIX, url)
    }

    fn repos_cache_key(collection_url: &str) -> String {
        format!("repos:{}", collection_url)
    }

    /// Look up a collection record by url.
    pub async fn get_collection(&self, url: &str) -> Result<Option<RepoCollectionRecord>> {
        match self
            .store
            .get(META_NAMESPACE, &Self::collection_key(url))
            .await?
        {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Get a collection record, creating it lazily on first reference.
    pub async fn get_or_create_collection(&self, url: &str) -> Result<RepoCollectionRecord> {
        let key = Self::collection_key(url);
        if let Some(raw) = self.store.get(META_NAMESPACE, &key).await? {
            return Ok(serde_json::from_slice(&raw)?);
        }

        let record = RepoCollectionRecord {
            url: url.to_string(),
            kind: collection_kind_for_url(url),
        };
        self.store
            .put(META_NAMESPACE, &key, serde_json::to_vec(&record)?)
            .await?;
        self.cache.invalidate(COLLECTIONS_CACHE_KEY);
        Ok(record)
    }

    /// Create or update a repo record. Idempotent by url: re-creation
    /// after a partially failed discovery converges to the same state.
    pub async fn create_repo(
        &self,
        url: &str,
        name: &str,
        description: &str,
        collection_url: &str,
    ) -> Result<Repo> {
        let repo = Repo {
            url: url.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            collection_url: collection_url.to_string(),
        };
        self.store
            .put(
                META_NAMESPACE,
                &Self::repo_key(url),
                serde_json::to_vec(&repo)?,
            )
            .await?;
        self.cache.invalidate(&Self::repos_cache_key(collection_url));
        Ok(repo)
    }

    /// Look up a repo by url.
    pub async fn get_repo(&self, url: &str) -> Result<Option<Repo>> {
        match self.store.get(META_NAMESPACE, &Self::repo_key(url)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// List the repos of one collection, sorted by name
    /// (case-insensitive). Served from the expiring cache when possible.
    pub async fn list_repos(&self, collection_url: &str) -> Result<Vec<Repo>> {
        let cache_key = Self::repos_cache_key(collection_url);
        if let Some(raw) = self.cache.get(&cache_key) {
            if let Ok(repos) = serde_json::from_slice::<Vec<Repo>>(&raw) {
                return Ok(repos);
            }
            // an undecodable cache entry is treated as a miss
        }

        let mut repos = Vec::new();
        for key in self.store.keys(META_NAMESPACE, REPO_KEY_PREFIX).await? {
            if let Some(raw) = self.store.get(META_NAMESPACE, &key).await? {
                let repo: Repo = serde_json::from_slice(&raw)?;
                if repo.collection_url == collection_url {
                    repos.push(repo);
                }
            }
        }
        repos.sort_by_key(|r| r.name.to_lowercase());

        self.cache.put(&cache_key, serde_json::to_vec(&repos)?);
        Ok(repos)
    }

    /// List every known collection, sorted by url.
    pub async fn list_collections(&self) -> Result<Vec<RepoCollectionRecord>> {
        if let Some(raw) = self.cache.get(COLLECTIONS_CACHE_KEY) {
            if let Ok(collections) = serde_json::from_slice::<Vec<RepoCollectionRecord>>(&raw) {
                return Ok(collections);
            }
        }

        let mut collections = Vec::new();
        for key in self
            .store
            .keys(META_NAMESPACE, COLLECTION_KEY_PREFIX)
            .await?
        {
            if let Some(raw) = self.store.get(META_NAMESPACE, &key).await? {
                collections.push(serde_json::from_slice::<RepoCollectionRecord>(&raw)?);
            }
        }
        collections.sort_by(|a, b| a.url.cmp(&b.url));

        self.cache
            .put(COLLECTIONS_CACHE_KEY, serde_json::to_vec(&collections)?);
        Ok(collections)
    }

    /// Administrative purge: delete every collection and repo record and
    /// flush all derived caches.
    pub async fn purge_collections(&self) -> Result<()> {
        for prefix in [COLLECTION_KEY_PREFIX, REPO_KEY_PREFIX] {
            for key in self.store.keys(META_NAMESPACE, prefix).await? {
                self.store.delete(META_NAMESPACE, &key).await?;
            }
        }
        self.cache.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn metadata() -> Metadata {
        Metadata::new(
            Arc::new(MemoryStore::new()),
            ExpiringCache::new(Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn test_collection_created_lazily_with_inferred_kind() {
        let meta = metadata();

        let fs = meta.get_or_create_collection("templates/").await.unwrap();
        assert_eq!(fs.kind, CollectionKind::Filesystem);

        let hosted = meta
            .get_or_create_collection("https://github.com/example")
            .await
            .unwrap();
        assert_eq!(hosted.kind, CollectionKind::HostingApi);

        // second reference returns the same record, no duplicate
        meta.get_or_create_collection("templates/").await.unwrap();
        assert_eq!(meta.list_collections().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_repo_is_idempotent() {
        let meta = metadata();
        let url = "https://github.com/example/appengine-demo-python";

        meta.create_repo(url, "demo", "a demo", "https://github.com/example")
            .await
            .unwrap();
        meta.create_repo(url, "demo", "a demo", "https://github.com/example")
            .await
            .unwrap();

        let repos = meta.list_repos("https://github.com/example").await.unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "demo");
    }

    #[tokio::test]
    async fn test_list_repos_sorted_case_insensitive() {
        let meta = metadata();
        meta.create_repo("u1", "Zebra", "", "c").await.unwrap();
        meta.create_repo("u2", "apple", "", "c").await.unwrap();
        meta.create_repo("u3", "other", "", "other-collection")
            .await
            .unwrap();

        let names: Vec<String> = meta
            .list_repos("c")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["apple", "Zebra"]);
    }

    #[tokio::test]
    async fn test_cache_invalidated_on_create() {
        let meta = metadata();
        meta.create_repo("u1", "first", "", "c").await.unwrap();

        // prime the cache
        assert_eq!(meta.list_repos("c").await.unwrap().len(), 1);

        meta.create_repo("u2", "second", "", "c").await.unwrap();
        assert_eq!(meta.list_repos("c").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_collections() {
        let meta = metadata();
        meta.get_or_create_collection("templates/").await.unwrap();
        meta.create_repo("u1", "first", "", "templates/")
            .await
            .unwrap();

        meta.purge_collections().await.unwrap();

        assert!(meta.list_collections().await.unwrap().is_empty());
        assert!(meta.list_repos("templates/").await.unwrap().is_empty());
        assert_eq!(meta.get_repo("u1").await.unwrap(), None);
    }

    #[test]
    fn test_project_namespace_for() {
        let ns = project_namespace_for("https://github.com/example/appengine-demo-python");
        assert_eq!(ns, "https-github-com-example-appengine-demo-python");
        assert!(ns.len() <= 50);

        let long = project_namespace_for(&format!(
            "https://github.com/example/{}",
            "x".repeat(80)
        ));
        assert!(long.len() <= 50);
    }
}
