//! playground-rs - virtual project file trees and repo population.
//!
//! The two central abstractions are:
//!
//! - [`Tree`]: a uniform file-tree contract (read, write, move, delete,
//!   list, clear) over interchangeable backends: a namespaced durable
//!   key/value store ([`PersistentTree`]), a remote HTTP tree service
//!   ([`RemoteTree`]), and a request-scoped caching decorator over the
//!   latter ([`CachingRemoteTree`]).
//! - [`RepoCollection`]: a discoverable source of importable repositories
//!   (a local template directory or an external hosting API) that can
//!   populate a target tree from one discovered repo, using concurrent
//!   fetches with per-file failure tolerance.
//!
//! Discovery and per-repo import run as independently retryable
//! background tasks (see [`tasks`]); all of their side effects are
//! upserts or idempotent per-path writes, so re-execution after a
//! partial failure converges to the same end state.

pub mod cache;
pub mod collection;
pub mod config;
pub mod logging;
pub mod model;
pub mod request;
pub mod store;
pub mod tasks;
pub mod tree;

pub use cache::ExpiringCache;
pub use collection::{
    ClientCredential, CollectionError, Fetch, FetchError, FetchResponse,
    FilesystemRepoCollection, HostingRepoCollection, RepoCollection, RepoNameFilter, RepoSpec,
    ReqwestFetcher, SettingsCollectionFactory,
};
pub use config::{ConfigError, HostingSettings, Settings};
pub use model::{CollectionKind, Metadata, ModelError, Repo, RepoCollectionRecord};
pub use request::{FixedRequestSource, RequestId, RequestIdSource, RequestScope};
pub use store::{KeyValueStore, LmdbStore, MemoryStore, StoreError};
pub use tasks::{
    seed_collections, InProcessTaskQueue, PopulateRunner, PopulateTask, StoreTreeFactory,
    TaskError, TaskQueue, TaskQueueConfig, TaskRunner, TreeFactory,
};
pub use tree::{CachingRemoteTree, ListEntry, PersistentTree, RemoteTree, Tree, TreeError};
