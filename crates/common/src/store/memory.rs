use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::{
    check_visible, next_modified, Document, ResourceMetadata, Result, Store, StoreError,
    CONTAINER_CONTENT_TYPE, DEFAULT_CONTENT_TYPE,
};
use crate::clock::Clock;
use crate::path::ResourcePath;

#[derive(Debug, Clone)]
enum Body {
    Document { data: Bytes, content_type: String },
    Container,
}

#[derive(Debug, Clone)]
struct Entry {
    body: Body,
    modified: DateTime<Utc>,
    acl: Option<Bytes>,
}

impl Entry {
    fn metadata(&self, path: &ResourcePath) -> ResourceMetadata {
        match &self.body {
            Body::Document { data, content_type } => ResourceMetadata {
                path: path.clone(),
                content_type: content_type.clone(),
                size: data.len() as u64,
                last_modified: self.modified,
                is_container: false,
            },
            Body::Container => ResourceMetadata {
                path: path.clone(),
                content_type: CONTAINER_CONTENT_TYPE.to_string(),
                size: 0,
                last_modified: self.modified,
                is_container: true,
            },
        }
    }
}

/// An in-process store. Each call takes the map lock once, so its checks
/// and its write are atomic with respect to every other call.
#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<ResourcePath, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            ResourcePath::root(),
            Entry {
                body: Body::Container,
                modified: clock.now(),
                acl: None,
            },
        );
        Self {
            entries: RwLock::new(entries),
            clock,
        }
    }

    /// The name a path would clash with if the other kind existed.
    fn twin(path: &ResourcePath) -> ResourcePath {
        if path.is_container() {
            path.as_document()
        } else {
            path.as_container()
        }
    }

    fn check_parent(
        entries: &BTreeMap<ResourcePath, Entry>,
        path: &ResourcePath,
    ) -> Result<ResourcePath> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::AlreadyExists(ResourcePath::root()))?;
        match entries.get(&parent) {
            Some(Entry {
                body: Body::Container,
                ..
            }) => Ok(parent),
            _ if entries.contains_key(&parent.as_document()) => {
                Err(StoreError::NotContainer(parent))
            }
            _ => Err(StoreError::NotFound(parent)),
        }
    }

    fn touch(&self, entries: &mut BTreeMap<ResourcePath, Entry>, path: &ResourcePath) {
        if let Some(entry) = entries.get_mut(path) {
            entry.modified = next_modified(self.clock.as_ref(), Some(entry.modified));
        }
    }

    fn has_children(entries: &BTreeMap<ResourcePath, Entry>, container: &ResourcePath) -> bool {
        entries
            .range(container.clone()..)
            .skip(1)
            .take_while(|(p, _)| p.as_str().starts_with(container.as_str()))
            .next()
            .is_some()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put(&self, path: &ResourcePath, data: Bytes, content_type: &str) -> Result<()> {
        check_visible(path)?;
        if path.is_container() {
            return Err(StoreError::IsContainer(path.clone()));
        }
        let mut entries = self.entries.write();
        let twin = Self::twin(path);
        if entries.contains_key(&twin) {
            return Err(StoreError::IsContainer(twin));
        }
        let parent = Self::check_parent(&entries, path)?;

        let content_type = if content_type.is_empty() {
            DEFAULT_CONTENT_TYPE.to_string()
        } else {
            content_type.to_string()
        };
        let previous = entries.get(path);
        let modified = next_modified(self.clock.as_ref(), previous.map(|e| e.modified));
        let acl = previous.and_then(|e| e.acl.clone());
        let created = previous.is_none();
        entries.insert(
            path.clone(),
            Entry {
                body: Body::Document { data, content_type },
                modified,
                acl,
            },
        );
        if created {
            self.touch(&mut entries, &parent);
        }
        Ok(())
    }

    async fn get(&self, path: &ResourcePath) -> Result<Document> {
        check_visible(path)?;
        let entries = self.entries.read();
        match entries.get(path) {
            Some(Entry {
                body: Body::Document { data, content_type },
                ..
            }) => Ok(Document {
                data: data.clone(),
                content_type: content_type.clone(),
            }),
            Some(_) => Err(StoreError::IsContainer(path.clone())),
            None if path.is_document() && entries.contains_key(&path.as_container()) => {
                Err(StoreError::IsContainer(path.as_container()))
            }
            None => Err(StoreError::NotFound(path.clone())),
        }
    }

    async fn exists(&self, path: &ResourcePath) -> Result<bool> {
        if path.is_hidden() {
            return Ok(false);
        }
        Ok(self.entries.read().contains_key(path))
    }

    async fn delete(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        if path.is_root() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        let mut entries = self.entries.write();
        match entries.get(path) {
            None => return Err(StoreError::NotFound(path.clone())),
            Some(Entry {
                body: Body::Container,
                ..
            }) if Self::has_children(&entries, path) => {
                return Err(StoreError::ContainerNotEmpty(path.clone()));
            }
            Some(_) => {}
        }
        entries.remove(path);
        if let Some(parent) = path.parent() {
            self.touch(&mut entries, &parent);
        }
        Ok(())
    }

    async fn metadata(&self, path: &ResourcePath) -> Result<ResourceMetadata> {
        check_visible(path)?;
        self.entries
            .read()
            .get(path)
            .map(|e| e.metadata(path))
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    async fn create_container(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        let path = path.as_container();
        let mut entries = self.entries.write();
        if entries.contains_key(&path) || entries.contains_key(&path.as_document()) {
            return Err(StoreError::AlreadyExists(path));
        }
        let parent = Self::check_parent(&entries, &path)?;
        entries.insert(
            path.clone(),
            Entry {
                body: Body::Container,
                modified: next_modified(self.clock.as_ref(), None),
                acl: None,
            },
        );
        self.touch(&mut entries, &parent);
        Ok(())
    }

    async fn list_container(&self, path: &ResourcePath) -> Result<Vec<ResourceMetadata>> {
        check_visible(path)?;
        let entries = self.entries.read();
        match entries.get(path) {
            Some(Entry {
                body: Body::Container,
                ..
            }) => {}
            Some(_) => return Err(StoreError::NotContainer(path.clone())),
            None => return Err(StoreError::NotFound(path.clone())),
        }
        Ok(entries
            .range(path.clone()..)
            .skip(1)
            .take_while(|(p, _)| p.as_str().starts_with(path.as_str()))
            .filter(|(p, _)| p.parent().as_ref() == Some(path))
            .map(|(p, e)| e.metadata(p))
            .collect())
    }

    async fn put_acl(&self, path: &ResourcePath, data: Bytes) -> Result<()> {
        check_visible(path)?;
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.clone()))?;
        entry.acl = Some(data);
        Ok(())
    }

    async fn get_acl(&self, path: &ResourcePath) -> Result<Bytes> {
        check_visible(path)?;
        self.entries
            .read()
            .get(path)
            .and_then(|e| e.acl.clone())
            .ok_or_else(|| StoreError::NotFound(path.clone()))
    }

    async fn delete_acl(&self, path: &ResourcePath) -> Result<()> {
        check_visible(path)?;
        let mut entries = self.entries.write();
        match entries.get_mut(path) {
            Some(entry) if entry.acl.is_some() => {
                entry.acl = None;
                Ok(())
            }
            _ => Err(StoreError::NotFound(path.clone())),
        }
    }
}
