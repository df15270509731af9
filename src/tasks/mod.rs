//! Background population tasks.
//!
//! Discovery and per-repo import run as two independently schedulable
//! units so one repo's failure never blocks or retries the whole
//! collection's discovery. Tasks execute with at-least-once semantics:
//! any unhandled error fails the attempt and the queue retries the whole
//! task with backoff. All task side effects are upserts or idempotent
//! per-path writes, so a retry after partial failure converges.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collection::{CollectionError, SettingsCollectionFactory};
use crate::model::{project_namespace_for, Metadata, ModelError};
use crate::store::KeyValueStore;
use crate::tree::{PersistentTree, Tree, TreeError};

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur inside a background task.
///
/// Any of these failing an attempt makes the whole task eligible for the
/// queue's retry policy.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    /// A repo task referenced a url with no stored record.
    #[error("unknown repo: {0}")]
    UnknownRepo(String),

    /// The queue is shut down.
    #[error("task queue closed")]
    QueueClosed,
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, TaskError>;

// =============================================================================
// Tasks
// =============================================================================

/// One unit of background work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PopulateTask {
    /// Discover a collection's repos and defer one import per repo.
    Collection { url: String },
    /// Import one repo's files into its project tree.
    Repo { url: String },
}

/// Accepts tasks for background execution with at-least-once delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: PopulateTask) -> Result<()>;
}

/// Executes one task, returning follow-up tasks to defer.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &PopulateTask) -> Result<Vec<PopulateTask>>;
}

/// Builds the target tree for a project namespace.
///
/// Deployment configuration decides the backend once; task code never
/// inspects which one it got.
pub trait TreeFactory: Send + Sync {
    fn tree_for_project(&self, project_name: &str) -> Arc<dyn Tree>;
}

/// [`TreeFactory`] producing [`PersistentTree`]s over a shared store.
pub struct StoreTreeFactory {
    store: Arc<dyn KeyValueStore>,
}

impl StoreTreeFactory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }
}

impl TreeFactory for StoreTreeFactory {
    fn tree_for_project(&self, project_name: &str) -> Arc<dyn Tree> {
        Arc::new(PersistentTree::new(self.store.clone(), project_name))
    }
}

// =============================================================================
// Seeding
// =============================================================================

/// Ensure the configured collection sources exist, scheduling a
/// discovery task for each collection seen for the first time.
///
/// Safe to call on every boot: known collections are left alone, so
/// their discovery is not re-run spuriously.
pub async fn seed_collections(
    metadata: &Metadata,
    queue: &dyn TaskQueue,
    sources: &[String],
) -> Result<()> {
    for url in sources {
        if metadata.get_collection(url).await?.is_some() {
            continue;
        }
        metadata.get_or_create_collection(url).await?;
        info!(collection_url = %url, "scheduling discovery for new collection source");
        queue
            .enqueue(PopulateTask::Collection { url: url.clone() })
            .await?;
    }
    Ok(())
}

// =============================================================================
// PopulateRunner
// =============================================================================

/// Executes populate tasks against the metadata store and collections.
pub struct PopulateRunner {
    metadata: Arc<Metadata>,
    collections: Arc<SettingsCollectionFactory>,
    trees: Arc<dyn TreeFactory>,
}

impl PopulateRunner {
    pub fn new(
        metadata: Arc<Metadata>,
        collections: Arc<SettingsCollectionFactory>,
        trees: Arc<dyn TreeFactory>,
    ) -> Self {
        Self {
            metadata,
            collections,
            trees,
        }
    }

    async fn populate_collection(&self, url: &str) -> Result<Vec<PopulateTask>> {
        info!(collection_url = %url, "populating repo collection");
        let record = self.metadata.get_or_create_collection(url).await?;
        let collection = self.collections.collection_for(&record.url)?;

        // Discovery has no side effects of its own; a failure here fails
        // the attempt before anything was written.
        let specs = collection.discover().await?;

        let mut followups = Vec::with_capacity(specs.len());
        for spec in specs {
            self.metadata
                .create_repo(&spec.url, &spec.name, &spec.description, url)
                .await?;
            followups.push(PopulateTask::Repo { url: spec.url });
        }
        info!(collection_url = %url, repos = followups.len(), "discovery complete");
        Ok(followups)
    }

    async fn populate_repo(&self, url: &str) -> Result<Vec<PopulateTask>> {
        info!(repo_url = %url, "populating repo");
        let repo = self
            .metadata
            .get_repo(url)
            .await?
            .ok_or_else(|| TaskError::UnknownRepo(url.to_string()))?;

        let collection = self.collections.collection_for(&repo.collection_url)?;
        let tree = self.trees.tree_for_project(&project_namespace_for(url));
        collection.populate(tree.as_ref(), &repo).await?;
        info!(repo_url = %url, "repo populated");
        Ok(Vec::new())
    }
}

#[async_trait]
impl TaskRunner for PopulateRunner {
    async fn run(&self, task: &PopulateTask) -> Result<Vec<PopulateTask>> {
        match task {
            PopulateTask::Collection { url } => self.populate_collection(url).await,
            PopulateTask::Repo { url } => self.populate_repo(url).await,
        }
    }
}

// =============================================================================
// InProcessTaskQueue
// =============================================================================

/// Retry policy for the in-process queue.
#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    /// Attempts per task before giving up.
    pub max_attempts: u32,
    /// Base delay between attempts; doubled per retry.
    pub retry_base: Duration,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base: Duration::from_millis(250),
        }
    }
}

/// An in-process [`TaskQueue`] with automatic retry on unhandled failure.
///
/// A single worker drains the channel; follow-up tasks returned by the
/// runner are executed before new external tasks. The worker stops when
/// every queue handle has been dropped and the backlog is drained.
pub struct InProcessTaskQueue {
    tx: mpsc::UnboundedSender<PopulateTask>,
}

impl InProcessTaskQueue {
    /// Start the worker. The returned handle completes after shutdown.
    pub fn start(
        runner: Arc<dyn TaskRunner>,
        config: TaskQueueConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<PopulateTask>();

        let worker = tokio::spawn(async move {
            let mut backlog: VecDeque<PopulateTask> = VecDeque::new();
            loop {
                let task = match backlog.pop_front() {
                    Some(task) => task,
                    None => match rx.recv().await {
                        Some(task) => task,
                        None => break,
                    },
                };

                match Self::run_with_retries(runner.as_ref(), &task, &config).await {
                    Ok(followups) => backlog.extend(followups),
                    Err(e) => {
                        error!(?task, error = %e, "task failed after all retries");
                    }
                }
            }
        });

        (Self { tx }, worker)
    }

    async fn run_with_retries(
        runner: &dyn TaskRunner,
        task: &PopulateTask,
        config: &TaskQueueConfig,
    ) -> Result<Vec<PopulateTask>> {
        let mut attempt = 0;
        loop {
            match runner.run(task).await {
                Ok(followups) => return Ok(followups),
                Err(e) => {
                    attempt += 1;
                    if attempt >= config.max_attempts {
                        return Err(e);
                    }
                    let delay = config.retry_base * 2u32.saturating_pow(attempt - 1);
                    warn!(?task, attempt, error = %e, "task attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl TaskQueue for InProcessTaskQueue {
    async fn enqueue(&self, task: PopulateTask) -> Result<()> {
        self.tx.send(task).map_err(|_| TaskError::QueueClosed)
    }
}
