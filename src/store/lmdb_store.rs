//! LMDB-based key/value store implementation.
//!
//! Uses the heed crate to provide a persistent store backed by LMDB.
//! Namespace and key are joined with a NUL separator into the LMDB key;
//! NUL cannot appear in either part, which namespace and path validation
//! already guarantee.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use super::{KeyValueStore, Result, StoreError};

const SEPARATOR: u8 = 0;

fn full_key(namespace: &str, key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(namespace.len() + 1 + key.len());
    out.extend_from_slice(namespace.as_bytes());
    out.push(SEPARATOR);
    out.extend_from_slice(key.as_bytes());
    out
}

/// An LMDB-backed [`KeyValueStore`].
///
/// All LMDB transactions run on the blocking thread pool.
pub struct LmdbStore {
    env: Arc<Env>,
    db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open (or create) an LMDB store at the given directory.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1024 * 1024 * 1024) // 1GB max size
                .max_dbs(1)
                .open(path)
                .map_err(|e| StoreError::Database(e.to_string()))?
        };

        let mut wtxn = env
            .write_txn()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        wtxn.commit()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            env: Arc::new(env),
            db,
        })
    }
}

#[async_trait]
impl KeyValueStore for LmdbStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let env = self.env.clone();
        let db = self.db;
        let key = full_key(namespace, key);

        tokio::task::spawn_blocking(move || {
            let rtxn = env
                .read_txn()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let value = db
                .get(&rtxn, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?
                .map(|v| v.to_vec());
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn put(&self, namespace: &str, key: &str, value: Vec<u8>) -> Result<()> {
        let env = self.env.clone();
        let db = self.db;
        let key = full_key(namespace, key);

        tokio::task::spawn_blocking(move || {
            let mut wtxn = env
                .write_txn()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            db.put(&mut wtxn, &key, &value)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            wtxn.commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<()> {
        let env = self.env.clone();
        let db = self.db;
        let key = full_key(namespace, key);

        tokio::task::spawn_blocking(move || {
            let mut wtxn = env
                .write_txn()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            db.delete(&mut wtxn, &key)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            wtxn.commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let env = self.env.clone();
        let db = self.db;
        let full_prefix = full_key(namespace, prefix);
        let skip = namespace.len() + 1;

        tokio::task::spawn_blocking(move || {
            let rtxn = env
                .read_txn()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let iter = db
                .prefix_iter(&rtxn, &full_prefix)
                .map_err(|e| StoreError::Database(e.to_string()))?;

            // LMDB iterates in key order, which matches lexicographic
            // order of the suffix within a single namespace.
            let mut keys = Vec::new();
            for entry in iter {
                let (k, _) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
                let suffix = &k[skip..];
                let key = std::str::from_utf8(suffix)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?
                    .to_string();
                keys.push(key);
            }
            Ok(keys)
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }

    async fn clear(&self, namespace: &str) -> Result<()> {
        let env = self.env.clone();
        let db = self.db;
        let full_prefix = full_key(namespace, "");

        tokio::task::spawn_blocking(move || {
            let mut wtxn = env
                .write_txn()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            let keys: Vec<Vec<u8>> = {
                let iter = db
                    .prefix_iter(&wtxn, &full_prefix)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
                let mut keys = Vec::new();
                for entry in iter {
                    let (k, _) = entry.map_err(|e| StoreError::Database(e.to_string()))?;
                    keys.push(k.to_vec());
                }
                keys
            };
            for key in keys {
                db.delete(&mut wtxn, &key)
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
            wtxn.commit()
                .map_err(|e| StoreError::Database(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
    }
}
