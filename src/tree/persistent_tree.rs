use std::sync::Arc;

use async_trait::async_trait;

use crate::store::KeyValueStore;

use super::path::normalize_path;
use super::{derive_listing, ListEntry, Result, Tree, TreeError};

/// A [`Tree`] backed by a namespaced durable key/value store.
///
/// This is the reference backend and the source of truth whenever this
/// deployment is authoritative for project storage. File paths map
/// directly to store keys within the project's namespace, so listings
/// are derived by a sorted prefix scan.
pub struct PersistentTree {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl PersistentTree {
    /// Create a tree over the given project namespace.
    pub fn new(store: Arc<dyn KeyValueStore>, project_name: impl Into<String>) -> Self {
        Self {
            store,
            namespace: project_name.into(),
        }
    }

    /// The project namespace this tree reads and writes.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl Tree for PersistentTree {
    async fn get_file_contents(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let path = normalize_path(path)?;
        Ok(self.store.get(&self.namespace, &path).await?)
    }

    async fn set_file(&self, path: &str, content: Vec<u8>) -> Result<()> {
        let path = normalize_path(path)?;
        self.store.put(&self.namespace, &path, content).await?;
        Ok(())
    }

    async fn move_file(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_path = normalize_path(old_path)?;
        let new_path = normalize_path(new_path)?;

        let content = self
            .store
            .get(&self.namespace, &old_path)
            .await?
            .ok_or_else(|| TreeError::NotFound(old_path.clone()))?;
        self.store.put(&self.namespace, &new_path, content).await?;
        self.store.delete(&self.namespace, &old_path).await?;
        Ok(())
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        let path = normalize_path(path)?;

        // Exact file, plus everything under the directory of that name.
        self.store.delete(&self.namespace, &path).await?;
        let prefix = format!("{}/", path);
        for key in self.store.keys(&self.namespace, &prefix).await? {
            self.store.delete(&self.namespace, &key).await?;
        }
        Ok(())
    }

    async fn list_directory(&self, path: Option<&str>) -> Result<Vec<ListEntry>> {
        let dir = match path {
            Some(p) => Some(normalize_path(p)?),
            None => None,
        };
        let prefix = match &dir {
            Some(d) => format!("{}/", d),
            None => String::new(),
        };
        let keys = self.store.keys(&self.namespace, &prefix).await?;
        Ok(derive_listing(keys.iter().map(String::as_str), dir.as_deref()))
    }

    async fn clear(&self) -> Result<()> {
        self.store.clear(&self.namespace).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn tree() -> PersistentTree {
        PersistentTree::new(Arc::new(MemoryStore::new()), "proj")
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let tree = tree();

        tree.set_file("app.yaml", b"runtime: python".to_vec())
            .await
            .unwrap();
        assert_eq!(
            tree.get_file_contents("app.yaml").await.unwrap(),
            Some(b"runtime: python".to_vec())
        );
    }

    #[tokio::test]
    async fn test_absent_file_is_none_not_error() {
        let tree = tree();
        assert_eq!(tree.get_file_contents("missing.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_content_is_distinct_from_absent() {
        let tree = tree();
        tree.set_file("empty.txt", Vec::new()).await.unwrap();
        assert_eq!(
            tree.get_file_contents("empty.txt").await.unwrap(),
            Some(Vec::new())
        );
    }

    #[tokio::test]
    async fn test_move_file() {
        let tree = tree();
        tree.set_file("old.txt", b"data".to_vec()).await.unwrap();

        tree.move_file("old.txt", "new.txt").await.unwrap();

        assert_eq!(tree.get_file_contents("old.txt").await.unwrap(), None);
        assert_eq!(
            tree.get_file_contents("new.txt").await.unwrap(),
            Some(b"data".to_vec())
        );
    }

    #[tokio::test]
    async fn test_move_missing_file_is_not_found() {
        let tree = tree();
        let err = tree.move_file("missing.txt", "new.txt").await.unwrap_err();
        assert!(matches!(err, TreeError::NotFound(p) if p == "missing.txt"));
    }

    #[tokio::test]
    async fn test_delete_absent_path_is_noop() {
        let tree = tree();
        tree.delete_path("missing.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_directory_shaped_path() {
        let tree = tree();
        tree.set_file("a/one.txt", b"1".to_vec()).await.unwrap();
        tree.set_file("a/sub/two.txt", b"2".to_vec()).await.unwrap();
        tree.set_file("ab.txt", b"3".to_vec()).await.unwrap();

        tree.delete_path("a").await.unwrap();

        assert_eq!(tree.get_file_contents("a/one.txt").await.unwrap(), None);
        assert_eq!(tree.get_file_contents("a/sub/two.txt").await.unwrap(), None);
        // "ab.txt" shares a string prefix but not a path prefix
        assert_eq!(
            tree.get_file_contents("ab.txt").await.unwrap(),
            Some(b"3".to_vec())
        );
    }

    #[tokio::test]
    async fn test_list_directory_dedupes_and_sorts() {
        let tree = tree();
        tree.set_file("a/b.txt", b"1".to_vec()).await.unwrap();
        tree.set_file("a/c.txt", b"2".to_vec()).await.unwrap();

        let root = tree.list_directory(None).await.unwrap();
        assert_eq!(
            root,
            vec![ListEntry {
                name: "a".to_string(),
                is_directory: true
            }]
        );

        let sub = tree.list_directory(Some("a")).await.unwrap();
        assert_eq!(
            sub,
            vec![
                ListEntry {
                    name: "b.txt".to_string(),
                    is_directory: false
                },
                ListEntry {
                    name: "c.txt".to_string(),
                    is_directory: false
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let tree = tree();
        tree.set_file("a.txt", b"1".to_vec()).await.unwrap();
        tree.set_file("b/c.txt", b"2".to_vec()).await.unwrap();

        tree.clear().await.unwrap();

        assert_eq!(tree.get_file_contents("a.txt").await.unwrap(), None);
        assert!(tree.list_directory(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_path_rejected_before_io() {
        let tree = tree();
        let err = tree.set_file("../escape", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, TreeError::InvalidPath { .. }));
    }
}
