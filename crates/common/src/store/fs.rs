//! Filesystem backend.
//!
//! ```text
//! <root>/a/b.txt                  document bytes
//! <root>/a/                       container
//! <root>/.metadata/a/b.txt.type   content type of /a/b.txt
//! <root>/.metadata/a/b.txt.acl    ACL of /a/b.txt
//! <root>/.metadata/a/.type        side records of the container /a/
//! <root>/.metadata/a/.acl
//! ```
//!
//! Every file is written to a hidden sibling first and renamed into
//! place. Modification times are stamped on the data file (documents) or
//! the `.type` record (containers) so they survive restarts.
//!
//! Checks and writes are separate syscalls here; callers serialize
//! conflicting mutations through [`super::PathLocks`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use super::{
    check_visible, next_modified, Document, ResourceMetadata, Result, Store, StoreError,
    CONTAINER_CONTENT_TYPE, DEFAULT_CONTENT_TYPE,
};
use crate::clock::Clock;
use crate::path::ResourcePath;

const METADATA_DIR: &str = ".metadata";
const TYPE_EXT: &str = "type";
const ACL_EXT: &str = "acl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    File,
    Dir,
}

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    clock: Arc<dyn Clock>,
    temp_counter: AtomicU64,
}

fn io_error(err: std::io::Error) -> StoreError {
    tracing::error!(kind = ?err.kind(), "filesystem store: io failure");
    StoreError::Internal(format!("io failure ({:?})", err.kind()))
}

fn join_failed(err: tokio::task::JoinError) -> StoreError {
    StoreError::Internal(format!("blocking task failed: {}", err))
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(e)),
    }
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(root.join(METADATA_DIR))
            .await
            .map_err(io_error)?;
        let store = Self {
            root,
            clock,
            temp_counter: AtomicU64::new(0),
        };
        let root_type = store.side_path(&ResourcePath::root(), TYPE_EXT);
        if tokio::fs::metadata(&root_type).await.is_err() {
            let stamp = next_modified(store.clock.as_ref(), None);
            store
                .write_atomic(root_type, Bytes::from_static(CONTAINER_CONTENT_TYPE.as_bytes()), stamp)
                .await?;
        }
        tracing::info!("filesystem store opened");
        Ok(store)
    }

    fn data_path(&self, path: &ResourcePath) -> PathBuf {
        let mut out = self.root.clone();
        for segment in path.segments() {
            out.push(segment);
        }
        out
    }

    fn side_path(&self, path: &ResourcePath, ext: &str) -> PathBuf {
        let mut out = self.root.join(METADATA_DIR);
        if path.is_container() {
            for segment in path.segments() {
                out.push(segment);
            }
            out.push(format!(".{}", ext));
        } else {
            let segments: Vec<&str> = path.segments().collect();
            let (name, dirs) = segments
                .split_last()
                .map(|(n, d)| (*n, d))
                .unwrap_or(("", &[]));
            for segment in dirs {
                out.push(segment);
            }
            out.push(format!("{}.{}", name, ext));
        }
        out
    }

    fn temp_path(&self, target: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        target.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
    }

    /// Write `data` to `target` via a temporary sibling and a rename.
    async fn write_atomic(&self, target: PathBuf, data: Bytes, modified: DateTime<Utc>) -> Result<()> {
        let tmp = self.temp_path(&target);
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            if let Some(dir) = target.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let mut file = std::fs::File::create(&tmp)?;
            let written = file
                .write_all(&data)
                .and_then(|_| file.set_modified(SystemTime::from(modified)))
                .and_then(|_| file.sync_all());
            drop(file);
            written
                .and_then(|_| std::fs::rename(&tmp, &target))
                .inspect_err(|_| {
                    let _ = std::fs::remove_file(&tmp);
                })
        })
        .await
        .map_err(join_failed)?
        .map_err(io_error)
    }

    async fn kind(&self, path: &ResourcePath) -> Result<Option<Kind>> {
        match tokio::fs::metadata(self.data_path(path)).await {
            Ok(meta) if meta.is_dir() => Ok(Some(Kind::Dir)),
            Ok(_) => Ok(Some(Kind::File)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotADirectory => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    /// True if the resource exists with the shape its path claims.
    async fn present(&self, path: &ResourcePath) -> Result<bool> {
        Ok(match self.kind(path).await? {
            Some(Kind::Dir) => path.is_container(),
            Some(Kind::File) => path.is_document(),
            None => false,
        })
    }

    async fn require(&self, path: &ResourcePath) -> Result<()> {
        if self.present(path).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(path.clone()))
        }
    }

    async fn check_parent(&self, path: &ResourcePath) -> Result<ResourcePath> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::AlreadyExists(ResourcePath::root()))?;
        match self.kind(&parent).await? {
            Some(Kind::Dir) => Ok(parent),
            Some(Kind::File) => Err(StoreError::NotContainer(parent)),
            None => Err(StoreError::NotFound(parent)),
        }
    }

    async fn mtime(file: &Path) -> Result<Option<DateTime<Utc>>> {
        match tokio::fs::metadata(file).await {
            Ok(meta) => Ok(Some(meta.modified().map_err(io_error)?.into())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e)),
        }
    }

    async fn read_type(&self, path: &ResourcePath) -> Result<String> {
        match tokio::fs::read_to_string(self.side_path(path, TYPE_EXT)).await {
            Ok(ct) if !ct.trim().is_empty() => Ok(ct.trim().to_string()),
            Ok(_) => Ok(DEFAULT_CONTENT_TYPE.to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(DEFAULT_CONTENT_TYPE.to_string())
            }
            Err(e) => Err(io_error(e)),
        }
    }

    /// Bump a container's modification time after its membership changed.
    async fn touch(&self, container: &ResourcePath) -> Result<()> {
        let side = self.side_path(container, TYPE_EXT);
        let previous = Self::mtime(&side).await?;
        let stamp = next_modified(self.clock.as_ref(), previous);
        self.write_atomic(side, Bytes::from_static(CONTAINER_CONTENT_TYPE.as_bytes()), stamp)
            .await
    }

    async fn container_metadata(&self, path: &ResourcePath) -> Result<ResourceMetadata> {
        let modified = match Self::mtime(&self.side_path(path, TYPE_EXT)).await? {
            Some(m) => m,
            None => Self::mtime(&self.data_path(path))
                .await?
                .unwrap_or_else(|| self.clock.now()),
        };
        Ok(ResourceMetadata {
            path: path.clone(),
            content_type: CONTAINER_CONTENT_TYPE.to_string(),
            size: 0,
            last_modified: modified,
            is_container: true,
        })
    }

    async fn document_metadata(&self, path: &ResourcePath) -> Result<ResourceMetadata> {
        let meta = tokio::fs::metadata(self.data_path(path))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NotFound(path.clone()),
                _ => io_error(e),
            })?;
        Ok(ResourceMetadata {
            path: path.clone(),
            content_type: self.read_type(path).await?,
            size: meta.len(),
            last_modified: meta.modified().map_err(io_error)?.into(),
            is_container: false,
        })
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put(&self, path: &ResourcePath, data: Bytes, content_type: &str) -> Result<()> {
        check_visible(path)?;
        if path.is_container() {
            return Err(StoreError::IsContainer(path.clone()));
        }
        if self.kind(path).await? == Some(Kind::Dir) {
            return Err(StoreError::IsContainer(path.as_container()));
        }
        let parent = self.check_parent(path).await?;

        let target = self.data_path(path);
        let previous = Self::mtime(&target).await?;
        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            content_type
        };
        let stamp = next_modified(self.clock.as_ref(), previous);

        // type record first, put back if the data never lands
        let type_path = self.side_path(path, TYPE_EXT);
        let previous_type = match tokio::fs::read(&type_path).await {
            Ok(old) => Some(Bytes::from(old)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(e)),
        };
        self.write_atomic(
            type_path.clone(),
            Bytes::copy_from_slice(content_type.as_bytes()),
            stamp,
        )
        .await?;
        if let Err(e) = self.write_atomic(target, data, stamp).await {
            let restored = match previous_type {
                Some(old) => self.write_atomic(type_path, old, stamp).await,
                None => tokio::fs::remove_file(&type_path).await.map_err(io_error),
            };
            if let Err(restore) = restored {
                tracing::error!(%path, error = %restore, "could not restore content type after failed write");
            }
            return Err(e);
        }
        if previous.is_none() {
            self.touch(&parent).await?;
        }
        Ok(())
    }

    async fn get(&self, path: &ResourcePath) -> Result<Document> {
        check_visible(path)?;
        match self.kind(path).await? {
            Some(Kind::Dir) => Err(StoreError::IsContainer(path.as_container())),
            Some(Kind::File) if path.is_document() => {
                let data = tokio::fs::read(self.data_path(path))
                    .await
                    .map_err(io_error)?;
                Ok(Document {
                    data: Bytes::from(data),
                    content_type: self.read_type(path).await?,
                })
            }
            _ => Err(StoreError::NotFound(path.clone())),
        }
    }

    async fn exists(&self, path: &ResourcePath) -> Result<bool> {
        if path.is_hidden() {
            return Ok(false);
        }
        self.present(path).await
    }

    async fn delete(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        if path.is_root() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        self.require(path).await?;

        let data = self.data_path(path);
        if path.is_container() {
            let mut entries = tokio::fs::read_dir(&data).await.map_err(io_error)?;
            while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
                if !entry.file_name().to_string_lossy().starts_with('.') {
                    return Err(StoreError::ContainerNotEmpty(path.clone()));
                }
            }
            tokio::fs::remove_dir_all(&data).await.map_err(io_error)?;
            let mut side_dir = self.root.join(METADATA_DIR);
            for segment in path.segments() {
                side_dir.push(segment);
            }
            match tokio::fs::remove_dir_all(&side_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(e)),
            }
        } else {
            tokio::fs::remove_file(&data).await.map_err(io_error)?;
            remove_if_present(&self.side_path(path, TYPE_EXT)).await?;
            remove_if_present(&self.side_path(path, ACL_EXT)).await?;
        }

        if let Some(parent) = path.parent() {
            self.touch(&parent).await?;
        }
        Ok(())
    }

    async fn metadata(&self, path: &ResourcePath) -> Result<ResourceMetadata> {
        check_visible(path)?;
        self.require(path).await?;
        if path.is_container() {
            self.container_metadata(path).await
        } else {
            self.document_metadata(path).await
        }
    }

    async fn create_container(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        let path = path.as_container();
        if self.kind(&path).await?.is_some() {
            return Err(StoreError::AlreadyExists(path));
        }
        let parent = self.check_parent(&path).await?;
        match tokio::fs::create_dir(self.data_path(&path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(path));
            }
            Err(e) => return Err(io_error(e)),
        }
        let stamp = next_modified(self.clock.as_ref(), None);
        self.write_atomic(
            self.side_path(&path, TYPE_EXT),
            Bytes::from_static(CONTAINER_CONTENT_TYPE.as_bytes()),
            stamp,
        )
        .await?;
        self.touch(&parent).await
    }

    async fn list_container(&self, path: &ResourcePath) -> Result<Vec<ResourceMetadata>> {
        check_visible(path)?;
        match (self.kind(path).await?, path.is_container()) {
            (Some(Kind::Dir), true) => {}
            (Some(Kind::File), false) => return Err(StoreError::NotContainer(path.clone())),
            _ => return Err(StoreError::NotFound(path.clone())),
        }

        let mut children = Vec::new();
        let mut entries = tokio::fs::read_dir(self.data_path(path))
            .await
            .map_err(io_error)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map_err(io_error)?.is_dir();
            let Ok(child) = path.child(&name, is_dir) else {
                continue;
            };
            let meta = if is_dir {
                self.container_metadata(&child).await?
            } else {
                self.document_metadata(&child).await?
            };
            children.push(meta);
        }
        children.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(children)
    }

    async fn put_acl(&self, path: &ResourcePath, data: Bytes) -> Result<()> {
        check_visible(path)?;
        self.require(path).await?;
        let stamp = next_modified(self.clock.as_ref(), None);
        self.write_atomic(self.side_path(path, ACL_EXT), data, stamp)
            .await
    }

    async fn get_acl(&self, path: &ResourcePath) -> Result<Bytes> {
        check_visible(path)?;
        self.require(path).await?;
        match tokio::fs::read(self.side_path(path, ACL_EXT)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.clone()))
            }
            Err(e) => Err(io_error(e)),
        }
    }

    async fn delete_acl(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        self.require(path).await?;
        match tokio::fs::remove_file(self.side_path(path, ACL_EXT)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(path.clone()))
            }
            Err(e) => Err(io_error(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;
    use crate::clock::SystemClock;

    async fn store(dir: &tempfile::TempDir) -> FsStore {
        FsStore::open(dir.path(), Arc::new(SystemClock)).await.unwrap()
    }

    #[tokio::test]
    async fn test_contract() {
        for case in 0..6 {
            let dir = tempfile::tempdir().unwrap();
            let store = store(&dir).await;
            match case {
                0 => contract::put_get_roundtrip(&store).await,
                1 => contract::hierarchy(&store).await,
                2 => contract::listing_and_delete(&store).await,
                3 => contract::acl_records(&store).await,
                4 => contract::hidden_names(&store).await,
                _ => contract::monotonic_modification(&store).await,
            }
        }
    }

    #[tokio::test]
    async fn test_layout_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let c = ResourcePath::parse("/a/").unwrap();
        let doc = ResourcePath::parse("/a/b.txt").unwrap();
        store.create_container(&c).await.unwrap();
        store
            .put(&doc, Bytes::from_static(b"hi"), "text/plain")
            .await
            .unwrap();
        store.put_acl(&doc, Bytes::from_static(b"")).await.unwrap();
        store.put_acl(&c, Bytes::from_static(b"")).await.unwrap();

        let root = dir.path();
        assert_eq!(std::fs::read(root.join("a/b.txt")).unwrap(), b"hi");
        assert_eq!(
            std::fs::read_to_string(root.join(".metadata/a/b.txt.type")).unwrap(),
            "text/plain"
        );
        assert!(root.join(".metadata/a/b.txt.acl").exists());
        assert!(root.join(".metadata/a/.type").exists());
        assert!(root.join(".metadata/a/.acl").exists());

        // no temporary files left behind
        let leftovers: Vec<_> = std::fs::read_dir(root.join("a"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_type() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let doc = ResourcePath::parse("/a.txt").unwrap();
        store
            .put(&doc, Bytes::from_static(b"v1"), "text/plain")
            .await
            .unwrap();

        // the type record takes the next temp name, block the data's one
        let n = store.temp_counter.load(Ordering::Relaxed) + 1;
        let blocker = dir
            .path()
            .join(format!(".a.txt.{}.{}.tmp", std::process::id(), n));
        std::fs::create_dir(&blocker).unwrap();

        assert!(store
            .put(&doc, Bytes::from_static(b"v2"), "text/html")
            .await
            .is_err());
        let current = store.get(&doc).await.unwrap();
        assert_eq!(current.data, Bytes::from_static(b"v1"));
        assert_eq!(current.content_type, "text/plain");

        // a fresh document leaves no type record behind
        let fresh = ResourcePath::parse("/b.txt").unwrap();
        let n = store.temp_counter.load(Ordering::Relaxed) + 1;
        std::fs::create_dir(
            dir.path()
                .join(format!(".b.txt.{}.{}.tmp", std::process::id(), n)),
        )
        .unwrap();
        assert!(store
            .put(&fresh, Bytes::from_static(b"x"), "text/html")
            .await
            .is_err());
        assert!(!dir.path().join(".metadata/b.txt.type").exists());
        assert!(!store.exists(&fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let doc = ResourcePath::parse("/doc.ttl").unwrap();
        let before = {
            let store = store(&dir).await;
            store
                .put(&doc, Bytes::from_static(b"<> a <#T> ."), "text/turtle")
                .await
                .unwrap();
            store.metadata(&doc).await.unwrap()
        };
        let store = store(&dir).await;
        assert_eq!(store.metadata(&doc).await.unwrap(), before);
        assert_eq!(store.get(&doc).await.unwrap().content_type, "text/turtle");
    }

    #[tokio::test]
    async fn test_errors_hide_physical_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store
            .get(&ResourcePath::parse("/missing").unwrap())
            .await
            .unwrap_err();
        assert!(!err.to_string().contains(&*dir.path().to_string_lossy()));
    }
}
