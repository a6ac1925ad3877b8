//! # Resource store
//!
//! Persistence for documents, containers and their side records (content
//! type and ACL blob). The [`Store`] trait is the only thing the rest of
//! the crate sees; backends are picked from a [`StoreConfig`] when the
//! service starts.
//!
//! Every backend enforces the same tree invariants:
//!
//! - the root container `/` always exists
//! - every other resource has exactly one parent, an existing container
//! - a container can only be deleted once it is empty
//! - a name is either a document or a container, never both
//! - hidden (dot-prefixed) segments are reserved and rejected
//!
//! Backends do not lock across calls. Callers that need read-modify-write
//! sequences to be atomic use [`PathLocks`].

mod fs;
mod locks;
mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::path::ResourcePath;

pub use fs::FsStore;
pub use locks::{PathLocks, ReadGuard, WriteGuard};
pub use memory::MemoryStore;

/// Content type recorded for containers.
pub const CONTAINER_CONTENT_TYPE: &str = "text/turtle";
/// Content type recorded for documents stored without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("resource not found: {0}")]
    NotFound(ResourcePath),
    #[error("not a container: {0}")]
    NotContainer(ResourcePath),
    #[error("resource is a container: {0}")]
    IsContainer(ResourcePath),
    #[error("resource already exists: {0}")]
    AlreadyExists(ResourcePath),
    #[error("container not empty: {0}")]
    ContainerNotEmpty(ResourcePath),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Backend failure. The message never names physical locations.
    #[error("storage failure: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// What the store knows about a resource besides its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMetadata {
    pub path: ResourcePath,
    pub content_type: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
    pub is_container: bool,
}

impl ResourceMetadata {
    /// A weak validator derived from size and modification time.
    pub fn etag(&self) -> String {
        format!(
            "W/\"{:x}-{:x}\"",
            self.size,
            self.last_modified.timestamp_micros()
        )
    }
}

/// A document's bytes and recorded content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub data: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync {
    /// Create or replace a document. The parent must exist and be a container.
    async fn put(&self, path: &ResourcePath, data: Bytes, content_type: &str) -> Result<()>;

    async fn get(&self, path: &ResourcePath) -> Result<Document>;

    async fn exists(&self, path: &ResourcePath) -> Result<bool>;

    /// Remove a document or an empty container together with its side records.
    async fn delete(&self, path: &ResourcePath) -> Result<()>;

    async fn metadata(&self, path: &ResourcePath) -> Result<ResourceMetadata>;

    /// Create a single container. Missing ancestors are not created.
    async fn create_container(&self, path: &ResourcePath) -> Result<()>;

    /// Children of a container, ordered by path.
    async fn list_container(&self, path: &ResourcePath) -> Result<Vec<ResourceMetadata>>;

    async fn put_acl(&self, path: &ResourcePath, data: Bytes) -> Result<()>;

    /// The ACL blob of an existing resource. `NotFound` when either the
    /// resource or its ACL is missing. An empty blob means "no rules here".
    async fn get_acl(&self, path: &ResourcePath) -> Result<Bytes>;

    /// Drop the ACL blob so the resource inherits again.
    async fn delete_acl(&self, path: &ResourcePath) -> Result<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process memory, lost on restart
    #[default]
    Memory,
    /// A directory tree on local disk
    Filesystem {
        /// Root of the data directory
        path: PathBuf,
    },
}

impl StoreConfig {
    pub async fn build(&self, clock: Arc<dyn Clock>) -> Result<Arc<dyn Store>> {
        Ok(match self {
            StoreConfig::Memory => Arc::new(MemoryStore::new(clock)),
            StoreConfig::Filesystem { path } => Arc::new(FsStore::open(path, clock).await?),
        })
    }
}

/// Reject names the store reserves for itself.
pub(crate) fn check_visible(path: &ResourcePath) -> Result<()> {
    if path.is_hidden() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// The next modification time for a resource last touched at `previous`.
/// Moves forward by a microsecond when the clock has not.
pub(crate) fn next_modified(clock: &dyn Clock, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = clock.now().trunc_subsecs(6);
    match previous {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    }
}
