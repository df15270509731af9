use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{KeyValueStore, Result};

/// An in-memory implementation of [`KeyValueStore`], intended primarily
/// for testing and development deployments.
pub struct MemoryStore {
    // BTreeMap per namespace keeps `keys` ordered without a sort pass.
    namespaces: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let namespaces = self.namespaces.read().unwrap();
        Ok(namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        if let Some(ns) = namespaces.get_mut(namespace) {
            ns.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let namespaces = self.namespaces.read().unwrap();
        let keys = match namespaces.get(namespace) {
            Some(ns) => ns
                .range(prefix.to_string()..)
                .take_while(|(k, _)| k.starts_with(prefix))
                .map(|(k, _)| k.clone())
                .collect(),
            None => Vec::new(),
        };
        Ok(keys)
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let mut namespaces = self.namespaces.write().unwrap();
        namespaces.remove(namespace);
        Ok(())
    }
}
