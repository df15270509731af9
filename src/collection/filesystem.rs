//! Filesystem repo collection.
//!
//! The collection url is a local directory; each immediate subdirectory
//! is one repo (a project template). A subdirectory may carry a
//! `__playground.json` manifest naming and describing the template;
//! without one, the directory name is used for both.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::model::Repo;
use crate::tree::path::extension;
use crate::tree::Tree;

use super::{RepoCollection, RepoSpec, Result};

/// Manifest file at the root of a template directory.
pub const MANIFEST_FILE: &str = "__playground.json";

#[derive(Debug, Deserialize, Default)]
struct Manifest {
    template_name: Option<String>,
    template_description: Option<String>,
}

/// A [`RepoCollection`] over a local directory of template projects.
pub struct FilesystemRepoCollection {
    collection_url: String,
    root: PathBuf,
    skip_extensions: Vec<String>,
}

impl FilesystemRepoCollection {
    pub fn new(collection_url: impl Into<String>, skip_extensions: Vec<String>) -> Self {
        let collection_url = collection_url.into();
        Self {
            root: PathBuf::from(&collection_url),
            collection_url,
            skip_extensions,
        }
    }

    async fn read_manifest(dir: &Path) -> Manifest {
        match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_default(),
            Err(_) => Manifest::default(),
        }
    }

    fn should_skip(&self, name: &str) -> bool {
        if name == MANIFEST_FILE {
            return true;
        }
        // A skip entry may name a whole file or directory (".git",
        // ".svn"), not just an extension.
        if self.skip_extensions.iter().any(|s| s == name) {
            return true;
        }
        match extension(name) {
            Some(ext) => self.skip_extensions.iter().any(|s| s == &ext),
            None => false,
        }
    }
}

#[async_trait]
impl RepoCollection for FilesystemRepoCollection {
    fn collection_url(&self) -> &str {
        &self.collection_url
    }

    async fn discover(&self) -> Result<Vec<RepoSpec>> {
        let mut specs = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dirname = entry.file_name().to_string_lossy().to_string();
            let dirpath = entry.path();

            let manifest = Self::read_manifest(&dirpath).await;
            let name = manifest.template_name.unwrap_or_else(|| dirname.clone());
            let description = manifest
                .template_description
                .unwrap_or_else(|| dirname.clone());

            specs.push(RepoSpec {
                url: dirpath.to_string_lossy().into_owned(),
                name,
                description,
            });
        }

        // read_dir order is platform-dependent
        specs.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(specs)
    }

    async fn populate(&self, tree: &dyn Tree, repo: &Repo) -> Result<()> {
        let repo_root = PathBuf::from(&repo.url);
        tree.clear().await?;

        // Iterative walk; (absolute dir, relative prefix) pairs.
        let mut pending: VecDeque<(PathBuf, String)> = VecDeque::new();
        pending.push_back((repo_root.clone(), String::new()));

        while let Some((dir, rel_prefix)) = pending.pop_front() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if self.should_skip(&name) {
                    debug!(path = %name, "skipping");
                    continue;
                }
                let rel_path = if rel_prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", rel_prefix, name)
                };

                if entry.file_type().await?.is_dir() {
                    pending.push_back((entry.path(), rel_path));
                } else {
                    let content = tokio::fs::read(entry.path()).await?;
                    info!(path = %rel_path, "importing file");
                    tree.set_file(&rel_path, content).await?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tree::PersistentTree;
    use std::sync::Arc;

    fn skip_list() -> Vec<String> {
        vec![".pyc".to_string(), ".swp".to_string(), ".git".to_string()]
    }

    async fn write(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(path, content).await.unwrap();
    }

    #[tokio::test]
    async fn test_discover_reads_manifest_or_falls_back_to_dirname() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("proj1").join(MANIFEST_FILE),
            br#"{"template_name": "Proj One"}"#,
        )
        .await;
        tokio::fs::create_dir_all(dir.path().join("proj2"))
            .await
            .unwrap();
        // loose files at the collection root are not repos
        write(&dir.path().join("README"), b"ignored").await;

        let collection = FilesystemRepoCollection::new(
            dir.path().to_string_lossy().into_owned(),
            skip_list(),
        );
        let specs = collection.discover().await.unwrap();

        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "Proj One");
        // manifest without a description falls back to the dirname
        assert_eq!(specs[0].description, "proj1");
        assert_eq!(specs[1].name, "proj2");
        assert_eq!(specs[1].description, "proj2");
    }

    #[tokio::test]
    async fn test_populate_copies_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("proj1");
        write(&repo_dir.join("app.yaml"), b"runtime: python").await;
        write(&repo_dir.join("src/main.py"), b"print('hi')").await;
        write(&repo_dir.join(MANIFEST_FILE), b"{}").await;
        write(&repo_dir.join("src/main.pyc"), b"\x00").await;

        let collection = FilesystemRepoCollection::new(
            dir.path().to_string_lossy().into_owned(),
            skip_list(),
        );
        let tree = PersistentTree::new(Arc::new(MemoryStore::new()), "proj");
        // stale state from an earlier partial import must not survive
        tree.set_file("stale.txt", b"old".to_vec()).await.unwrap();

        let repo = Repo {
            url: repo_dir.to_string_lossy().into_owned(),
            name: "proj1".to_string(),
            description: "proj1".to_string(),
            collection_url: dir.path().to_string_lossy().into_owned(),
        };
        collection.populate(&tree, &repo).await.unwrap();

        assert_eq!(
            tree.get_file_contents("app.yaml").await.unwrap(),
            Some(b"runtime: python".to_vec())
        );
        assert_eq!(
            tree.get_file_contents("src/main.py").await.unwrap(),
            Some(b"print('hi')".to_vec())
        );
        assert_eq!(tree.get_file_contents(MANIFEST_FILE).await.unwrap(), None);
        assert_eq!(tree.get_file_contents("src/main.pyc").await.unwrap(), None);
        assert_eq!(tree.get_file_contents("stale.txt").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_populate_skips_vcs_metadata_directory() {
        let dir = tempfile::tempdir().unwrap();
        let repo_dir = dir.path().join("proj1");
        write(&repo_dir.join("main.py"), b"print('hi')").await;
        write(&repo_dir.join(".git/config"), b"[core]").await;
        write(&repo_dir.join(".git/objects/ab/cdef"), b"\x00").await;

        let collection = FilesystemRepoCollection::new(
            dir.path().to_string_lossy().into_owned(),
            skip_list(),
        );
        let tree = PersistentTree::new(Arc::new(MemoryStore::new()), "proj");
        let repo = Repo {
            url: repo_dir.to_string_lossy().into_owned(),
            name: "proj1".to_string(),
            description: "proj1".to_string(),
            collection_url: dir.path().to_string_lossy().into_owned(),
        };
        collection.populate(&tree, &repo).await.unwrap();

        assert!(tree.get_file_contents("main.py").await.unwrap().is_some());
        assert_eq!(tree.get_file_contents(".git/config").await.unwrap(), None);
        assert!(tree.list_directory(Some(".git")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discover_missing_directory_fails() {
        let collection =
            FilesystemRepoCollection::new("definitely/not/a/dir".to_string(), skip_list());
        assert!(collection.discover().await.is_err());
    }
}
