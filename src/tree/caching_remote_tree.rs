//! Request-scoped caching decorator for remote trees.
//!
//! Remote reads are expensive, and a single request frequently reads the
//! same path more than once. This decorator memoizes `get_file_contents`
//! results (including "absent") for the lifetime of one inbound request.
//! The cache captures the request id at construction and re-checks it on
//! every access: handler instances can be reused across requests by the
//! serving layer, and a cache that silently outlived its request would
//! serve one user's reads from another user's request state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::request::{RequestId, RequestScope};

use super::path::normalize_path;
use super::{ListEntry, Result, Tree};

/// A [`Tree`] decorator adding a request-scoped read cache.
///
/// Wraps any tree (in production, a [`super::RemoteTree`]); owns only the
/// transient cache map, never the remote data itself.
pub struct CachingRemoteTree {
    inner: Arc<dyn Tree>,
    scope: RequestScope,
    /// Request identity recorded when this cache was created.
    request_id: Option<RequestId>,
    /// Cached reads, including `None` for known-absent paths.
    file_cache: Mutex<HashMap<String, Option<Vec<u8>>>>,
}

impl CachingRemoteTree {
    /// Wrap `inner`, binding the cache to the current request.
    pub fn new(inner: Arc<dyn Tree>, scope: RequestScope) -> Self {
        let request_id = scope.current();
        Self {
            inner,
            scope,
            request_id,
            file_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Panics if the ambient request id no longer matches the one this
    /// cache was created under. A mismatch is a programming-contract
    /// violation, not a recoverable condition.
    fn assert_same_request(&self) {
        let current = self.scope.current();
        assert!(
            current == self.request_id,
            "request-scoped file cache reused across requests: created under {:?}, accessed under {:?}",
            self.request_id,
            current
        );
    }
}

#[async_trait]
impl Tree for CachingRemoteTree {
    async fn get_file_contents(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path)?;

        self.assert_same_request();
        if let Some(cached) = self.file_cache.lock().unwrap().get(&path) {
            return Ok(cached.clone());
        }

        let contents = self.inner.get_file_contents(&path).await?;

        self.assert_same_request();
        self.file_cache
            .lock()
            .unwrap()
            .insert(path, contents.clone());
        Ok(contents)
    }

    async fn set_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let path = normalize_path(path)?;
        self.inner.set_file(&path, content).await?;

        // Evict so the next read within this request re-fetches.
        self.assert_same_request();
        self.file_cache.lock().unwrap().remove(&path);
        Ok(())
    }

    async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;
        self.inner.move_file(&old_path, &new_path).await?;

        self.assert_same_request();
        let mut cache = self.file_cache.lock().unwrap();
        cache.remove(&old_path);
        cache.remove(&new_path);
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;
        self.inner.delete_path(&path).await?;

        // A directory-shaped delete affects everything under the prefix.
        self.assert_same_request();
        let prefix = format!("{}/", path);
        let mut cache = self.file_cache.lock().unwrap();
        cache.remove(&path);
        cache.retain(|cached_path, _| !cached_path.starts_with(&prefix));
        Ok(())
    }

    async fn list_directory(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        self.inner.list_directory(path).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;

        self.assert_same_request();
        self.file_cache.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::FixedRequestSource;
    use crate::store::MemoryStore;
    use crate::tree::{PersistentTree, TreeError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A tree that counts underlying reads, standing in for a remote
    /// backend.
    struct CountingTree {
        inner: PersistentTree,
        reads: AtomicUsize,
    }

    impl CountingTree {
        fn new() -> Self {
            Self {
                inner: PersistentTree::new(Arc::new(MemoryStore::new()), "proj"),
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Tree for CountingTree {
        async fn get_file_contents(&self, path: &str) -> Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get_file_contents(path).await
        }

        async fn set_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
            self.inner.set_file(path, content).await
        }

        async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
            self.inner.move_file(old_path, new_path).await
        }

        async fn delete_path(&self, path: &str) -> Result<()> {
            self.inner.delete_path(path).await
        }

        async fn list_directory(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
            self.inner.list_directory(path).await
        }

        async fn clear(&self) -> Result<()> {
            self.inner.clear().await
        }
    }

    fn scoped(source: Arc<FixedRequestSource>) -> RequestScope {
        RequestScope::new(source)
    }

    #[tokio::test]
    async fn test_second_read_is_served_from_cache() {
        let counting = Arc::new(CountingTree::new());
        counting.set_file("a.txt", b"data".to_vec()).await.unwrap();

        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting.clone(), scoped(source));

        assert_eq!(
            tree.get_file_contents("a.txt").await.unwrap(),
            Some(b"data".to_vec())
        );
        assert_eq!(
            tree.get_file_contents("a.txt").await.unwrap(),
            Some(b"data".to_vec())
        );
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_absence_is_cached_too() {
        let counting = Arc::new(CountingTree::new());
        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting.clone(), scoped(source));

        assert_eq!(tree.get_file_contents("missing.txt").await.unwrap(), None);
        assert_eq!(tree.get_file_contents("missing.txt").await.unwrap(), None);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_evicts_cached_path() {
        let counting = Arc::new(CountingTree::new());
        counting.set_file("a.txt", b"v1".to_vec()).await.unwrap();

        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting.clone(), scoped(source));

        assert_eq!(
            tree.get_file_contents("a.txt").await.unwrap(),
            Some(b"v1".to_vec())
        );
        tree.set_file("a.txt", b"v2".to_vec()).await.unwrap();
        assert_eq!(
            tree.get_file_contents("a.txt").await.unwrap(),
            Some(b"v2".to_vec())
        );
        // first read plus the post-write re-fetch
        assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_evicts_prefix_entries() {
        let counting = Arc::new(CountingTree::new());
        counting.set_file("a/one.txt", b"1".to_vec()).await.unwrap();

        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting.clone(), scoped(source));

        assert!(tree.get_file_contents("a/one.txt").await.unwrap().is_some());
        tree.delete_path("a").await.unwrap();
        assert_eq!(tree.get_file_contents("a/one.txt").await.unwrap(), None);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "request-scoped file cache reused across requests")]
    async fn test_access_after_request_change_panics() {
        let counting = Arc::new(CountingTree::new());
        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting, scoped(source.clone()));

        let _ = tree.get_file_contents("a.txt").await;

        // a pooled worker starts handling a different request
        source.set(Some(RequestId::new("req-2")));
        let _ = tree.get_file_contents("a.txt").await;
    }

    #[tokio::test]
    async fn test_move_does_not_serve_stale_reads() {
        let counting = Arc::new(CountingTree::new());
        counting.set_file("old.txt", b"data".to_vec()).await.unwrap();

        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting.clone(), scoped(source));

        assert!(tree.get_file_contents("old.txt").await.unwrap().is_some());
        tree.move_file("old.txt", "new.txt").await.unwrap();

        assert_eq!(tree.get_file_contents("old.txt").await.unwrap(), None);
        assert_eq!(
            tree.get_file_contents("new.txt").await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn test_move_missing_propagates_not_found() {
        let counting = Arc::new(CountingTree::new());
        let source = Arc::new(FixedRequestSource::new(RequestId::new("req-1")));
        let tree = CachingRemoteTree::new(counting, scoped(source));

        let err = tree.move_file("missing.txt", "new.txt").await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound(_)));
    }
}
