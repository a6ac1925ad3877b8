//! # LDP operations
//!
//! [`LdpEngine`] turns an authorized request into store operations and
//! change events. Access control has already happened by the time a
//! request gets here; the engine only enforces the resource model:
//! containers hold members, documents hold bytes, ACL documents are side
//! records of the resource they govern.
//!
//! Locking follows one order everywhere, ancestor before descendant:
//!
//! - reads take a read lock on the target
//! - `POST` takes the container's write lock, then the new child's
//! - `PUT`, `PATCH` and `DELETE` take the parent's read lock, then the
//!   target's write lock
//!
//! Events are dispatched before the target lock is released, so per-path
//! event order is commit order.

mod container;
mod patch;
mod slug;

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderMap, Method};

use crate::acl::{AclDocument, AclError};
use crate::agent::Agent;
use crate::clock::Clock;
use crate::deadline::{Deadline, TimedOut};
use crate::events::{Dispatcher, Event, EventKind};
use crate::path::{AclSuffix, PodBase, ResourcePath, Target};
use crate::store::{
    PathLocks, ReadGuard, ResourceMetadata, Store, StoreError, WriteGuard,
    CONTAINER_CONTENT_TYPE, DEFAULT_CONTENT_TYPE,
};

pub use container::listing;
pub use patch::{N3PatchEngine, PatchEngine, PatchError, N3_CONTENT_TYPE};
pub use slug::{sanitize, ClockSlugGenerator, SlugGenerator};

pub const LDP_RESOURCE: &str = "http://www.w3.org/ns/ldp#Resource";
pub const LDP_CONTAINER: &str = "http://www.w3.org/ns/ldp#Container";
pub const LDP_BASIC_CONTAINER: &str = "http://www.w3.org/ns/ldp#BasicContainer";

/// Content type of `POST`ed documents that arrive without one.
pub const DEFAULT_POST_CONTENT_TYPE: &str = "text/plain";

#[derive(Debug, thiserror::Error)]
pub enum LdpError {
    #[error("not found: {0}")]
    NotFound(ResourcePath),
    #[error("already exists: {0}")]
    AlreadyExists(ResourcePath),
    #[error("method not allowed on {0}")]
    MethodNotAllowed(ResourcePath),
    #[error("container not empty: {0}")]
    ContainerNotEmpty(ResourcePath),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("precondition failed")]
    PreconditionFailed,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
    #[error("storage failure: {0}")]
    Internal(String),
}

impl From<StoreError> for LdpError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => LdpError::NotFound(path),
            StoreError::NotContainer(path) | StoreError::IsContainer(path) => {
                LdpError::MethodNotAllowed(path)
            }
            StoreError::AlreadyExists(path) => LdpError::AlreadyExists(path),
            StoreError::ContainerNotEmpty(path) => LdpError::ContainerNotEmpty(path),
            StoreError::InvalidPath(path) => LdpError::BadRequest(format!("invalid path {}", path)),
            StoreError::Internal(message) => LdpError::Internal(message),
        }
    }
}

impl From<PatchError> for LdpError {
    fn from(e: PatchError) -> Self {
        match e {
            PatchError::BadRequest(m) => LdpError::BadRequest(m),
            PatchError::Conflict(m) => LdpError::Conflict(m),
            PatchError::UnsupportedMediaType(m) => LdpError::UnsupportedMediaType(m),
        }
    }
}

/// What the engine needs to know about a request.
#[derive(Debug, Clone)]
pub struct LdpRequest {
    pub method: Method,
    pub target: Target,
    pub agent: Agent,
    pub body: Bytes,
    /// Media type without parameters, lowercased.
    pub content_type: Option<String>,
    pub slug: Option<String>,
    /// Targets of `Link: <...>; rel="type"` headers.
    pub link_types: Vec<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

impl LdpRequest {
    pub fn new(method: Method, target: Target, agent: Agent) -> Self {
        Self {
            method,
            target,
            agent,
            body: Bytes::new(),
            content_type: None,
            slug: None,
            link_types: Vec::new(),
            if_match: None,
            if_none_match: None,
        }
    }

    pub fn from_headers(
        method: Method,
        target: Target,
        agent: Agent,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Self {
        let text = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            body,
            content_type: text(header::CONTENT_TYPE).and_then(|ct| media_type(&ct)),
            slug: text(header::HeaderName::from_static("slug")),
            link_types: headers
                .get_all(header::LINK)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(type_links)
                .collect(),
            if_match: text(header::IF_MATCH),
            if_none_match: text(header::IF_NONE_MATCH),
            ..Self::new(method, target, agent)
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>, content_type: &str) -> Self {
        self.body = body.into();
        self.content_type = media_type(content_type);
        self
    }

    pub fn with_slug(mut self, slug: &str) -> Self {
        self.slug = Some(slug.to_string());
        self
    }

    fn wants_container(&self) -> bool {
        self.link_types
            .iter()
            .any(|t| t == LDP_BASIC_CONTAINER || t == LDP_CONTAINER)
    }
}

/// `text/turtle; charset=utf-8` -> `text/turtle`
fn media_type(raw: &str) -> Option<String> {
    let essence = raw.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() {
        None
    } else {
        Some(essence.to_ascii_lowercase())
    }
}

/// The `rel="type"` targets in one `Link` header value.
fn type_links(value: &str) -> Vec<String> {
    value
        .split(',')
        .filter_map(|link| {
            let mut parts = link.split(';');
            let target = parts.next()?.trim();
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            let is_type = parts.any(|param| {
                let param = param.trim().replace(' ', "");
                param.eq_ignore_ascii_case("rel=\"type\"") || param.eq_ignore_ascii_case("rel=type")
            });
            is_type.then(|| target.to_string())
        })
        .collect()
}

/// A resource as returned by `GET`.
#[derive(Debug, Clone)]
pub struct Representation {
    pub data: Bytes,
    pub content_type: String,
    pub is_container: bool,
    /// Absent for ACL documents, which carry no metadata of their own.
    pub metadata: Option<ResourceMetadata>,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Read(Representation),
    Created { location: ResourcePath },
    Updated,
    Deleted,
    Options { allow: Vec<Method> },
}

/// Methods a target supports, decided by its shape alone.
pub fn allowed_methods(target: &Target) -> Vec<Method> {
    let mut allow = vec![Method::GET, Method::HEAD, Method::OPTIONS, Method::PUT];
    match target {
        Target::Acl { .. } => {}
        Target::Resource(path) => {
            if path.is_container() {
                allow.push(Method::POST);
            }
            allow.push(Method::PATCH);
        }
    }
    allow.push(Method::DELETE);
    allow
}

#[derive(Debug, Clone)]
pub struct LdpEngine {
    store: Arc<dyn Store>,
    locks: Arc<PathLocks>,
    dispatcher: Arc<Dispatcher>,
    clock: Arc<dyn Clock>,
    base: PodBase,
    suffix: AclSuffix,
    slugs: Arc<dyn SlugGenerator>,
    patcher: Arc<dyn PatchEngine>,
    auto_create_containers: bool,
}

impl LdpEngine {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<PathLocks>,
        dispatcher: Arc<Dispatcher>,
        clock: Arc<dyn Clock>,
        base: PodBase,
    ) -> Self {
        Self {
            slugs: Arc::new(ClockSlugGenerator::new(clock.clone())),
            patcher: Arc::new(N3PatchEngine),
            suffix: AclSuffix::default(),
            auto_create_containers: false,
            store,
            locks,
            dispatcher,
            clock,
            base,
        }
    }

    pub fn with_acl_suffix(mut self, suffix: AclSuffix) -> Self {
        self.suffix = suffix;
        self
    }

    pub fn with_slug_generator(mut self, slugs: Arc<dyn SlugGenerator>) -> Self {
        self.slugs = slugs;
        self
    }

    pub fn with_patch_engine(mut self, patcher: Arc<dyn PatchEngine>) -> Self {
        self.patcher = patcher;
        self
    }

    /// Create missing containers on the way to a `POST` or `PUT` target
    /// instead of answering 404.
    pub fn with_auto_create_containers(mut self, enabled: bool) -> Self {
        self.auto_create_containers = enabled;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<PathLocks> {
        &self.locks
    }

    pub async fn handle(&self, request: LdpRequest, deadline: &Deadline) -> Result<Outcome, LdpError> {
        let path = match &request.target {
            Target::Acl { document, resource } => {
                return self.handle_acl(&request, document, resource, deadline).await
            }
            Target::Resource(path) => path.clone(),
        };
        match request.method {
            Method::GET | Method::HEAD => self.get(&path, deadline).await,
            Method::OPTIONS => Ok(Outcome::Options {
                allow: allowed_methods(&request.target),
            }),
            Method::POST => self.post(&path, &request, deadline).await,
            Method::PUT => self.put(&path, &request, deadline).await,
            Method::PATCH => self.patch(&path, &request, deadline).await,
            Method::DELETE => self.delete(&path, &request, deadline).await,
            _ => Err(LdpError::MethodNotAllowed(path)),
        }
    }

    fn emit(&self, kind: EventKind, path: &ResourcePath, agent: &Agent) {
        self.emit_event(Event::new(kind, path.clone(), self.clock.now(), agent.event_label()));
    }

    fn emit_event(&self, event: Event) {
        tracing::debug!(kind = %event.kind, path = %event.path, "dispatching event");
        self.dispatcher.dispatch(event);
    }

    /// Parent read lock, then target write lock.
    async fn lock_for_write(
        &self,
        path: &ResourcePath,
        deadline: &Deadline,
    ) -> Result<(Option<ReadGuard>, WriteGuard), LdpError> {
        let parent = match path.parent() {
            Some(parent) => Some(self.locks.read(&parent, deadline).await?),
            None => None,
        };
        let target = self.locks.write(path, deadline).await?;
        Ok((parent, target))
    }

    async fn current(&self, path: &ResourcePath) -> Result<Option<ResourceMetadata>, LdpError> {
        match self.store.metadata(path).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// A missing parent and a document parent both read as "not found".
    async fn check_parent(&self, path: &ResourcePath) -> Result<(), LdpError> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match self.current(&parent).await? {
            Some(metadata) if metadata.is_container => Ok(()),
            _ => Err(LdpError::NotFound(parent)),
        }
    }

    /// Create `container` and any missing ancestors, root first.
    async fn ensure_containers(
        &self,
        container: &ResourcePath,
        agent: &Agent,
        deadline: &Deadline,
    ) -> Result<(), LdpError> {
        let mut chain = container.ancestors();
        chain.reverse();
        chain.push(container.clone());

        for path in chain.into_iter().filter(|p| !p.is_root()) {
            let _guards = self.lock_for_write(&path, deadline).await?;
            match self.store.create_container(&path).await {
                Ok(()) => self.emit(EventKind::ContainerCreated, &path, agent),
                Err(StoreError::AlreadyExists(_)) => {}
                Err(StoreError::NotContainer(parent)) => return Err(LdpError::NotFound(parent)),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn get(&self, path: &ResourcePath, deadline: &Deadline) -> Result<Outcome, LdpError> {
        let _guard = self.locks.read(path, deadline).await?;
        let metadata = self.store.metadata(path).await?;

        let representation = if metadata.is_container {
            let children = self.store.list_container(path).await?;
            let body = listing(&self.base.url_for(path), &metadata, &children);
            Representation {
                data: Bytes::from(body),
                content_type: CONTAINER_CONTENT_TYPE.to_string(),
                is_container: true,
                metadata: Some(metadata),
            }
        } else {
            let document = self.store.get(path).await?;
            Representation {
                data: document.data,
                content_type: document.content_type,
                is_container: false,
                metadata: Some(metadata),
            }
        };
        Ok(Outcome::Read(representation))
    }

    async fn post(
        &self,
        container: &ResourcePath,
        request: &LdpRequest,
        deadline: &Deadline,
    ) -> Result<Outcome, LdpError> {
        if container.is_document() {
            return match self.store.exists(container).await? {
                true => Err(LdpError::MethodNotAllowed(container.clone())),
                false => Err(LdpError::NotFound(container.clone())),
            };
        }
        if self.auto_create_containers {
            self.ensure_containers(container, &request.agent, deadline).await?;
        }

        let _container_guard = self.locks.write(container, deadline).await?;
        if !self.store.metadata(container).await?.is_container {
            return Err(LdpError::MethodNotAllowed(container.clone()));
        }

        let taken: HashSet<String> = self
            .store
            .list_container(container)
            .await?
            .iter()
            .filter_map(|child| child.path.name().map(str::to_string))
            .collect();
        let requested = request.slug.as_deref().map(sanitize).unwrap_or_default();
        let usable = !requested.is_empty()
            && !taken.contains(&requested)
            && !requested.ends_with(self.suffix.as_str());
        let name = if usable {
            requested
        } else {
            self.slugs.fresh(&requested, &taken)
        };

        let as_container = request.wants_container();
        let child = container
            .child(&name, as_container)
            .map_err(|e| LdpError::BadRequest(e.to_string()))?;
        let _child_guard = self.locks.write(&child, deadline).await?;

        if as_container {
            self.store.create_container(&child).await?;
            self.emit(EventKind::ContainerCreated, &child, &request.agent);
        } else {
            let content_type = request
                .content_type
                .as_deref()
                .unwrap_or(DEFAULT_POST_CONTENT_TYPE);
            self.store.put(&child, request.body.clone(), content_type).await?;
            self.emit(EventKind::ResourceCreated, &child, &request.agent);
        }
        tracing::debug!(container = %container, child = %child, "created member");
        Ok(Outcome::Created { location: child })
    }

    async fn put(
        &self,
        path: &ResourcePath,
        request: &LdpRequest,
        deadline: &Deadline,
    ) -> Result<Outcome, LdpError> {
        if self.auto_create_containers {
            if let Some(parent) = path.parent() {
                self.ensure_containers(&parent, &request.agent, deadline).await?;
            }
        }

        let _guards = self.lock_for_write(path, deadline).await?;
        let current = self.current(path).await?;
        check_preconditions(request, current.as_ref())?;

        if path.is_container() {
            if current.is_some() {
                return Err(LdpError::MethodNotAllowed(path.clone()));
            }
            self.check_parent(path).await?;
            self.store.create_container(path).await?;
            self.emit(EventKind::ContainerCreated, path, &request.agent);
            return Ok(Outcome::Created {
                location: path.clone(),
            });
        }

        self.check_parent(path).await?;
        let content_type = request.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        self.store.put(path, request.body.clone(), content_type).await?;

        if current.is_some() {
            self.emit(EventKind::ResourceUpdated, path, &request.agent);
            Ok(Outcome::Updated)
        } else {
            self.emit(EventKind::ResourceCreated, path, &request.agent);
            Ok(Outcome::Created {
                location: path.clone(),
            })
        }
    }

    async fn patch(
        &self,
        path: &ResourcePath,
        request: &LdpRequest,
        deadline: &Deadline,
    ) -> Result<Outcome, LdpError> {
        let _guards = self.lock_for_write(path, deadline).await?;
        let current = self
            .current(path)
            .await?
            .ok_or_else(|| LdpError::NotFound(path.clone()))?;
        if current.is_container {
            return Err(LdpError::MethodNotAllowed(path.clone()));
        }
        if request.content_type.as_deref() != Some(N3_CONTENT_TYPE) {
            return Err(LdpError::UnsupportedMediaType(
                request.content_type.clone().unwrap_or_default(),
            ));
        }
        check_preconditions(request, Some(&current))?;

        let document = self.store.get(path).await?;
        let patched = self.patcher.apply(
            &self.base.url_for(path),
            &document.data,
            &document.content_type,
            &request.body,
        )?;
        self.store.put(path, patched, &document.content_type).await?;
        self.emit(EventKind::ResourceUpdated, path, &request.agent);
        Ok(Outcome::Updated)
    }

    async fn delete(
        &self,
        path: &ResourcePath,
        request: &LdpRequest,
        deadline: &Deadline,
    ) -> Result<Outcome, LdpError> {
        if path.is_root() {
            return Err(LdpError::Forbidden("the root container cannot be deleted".into()));
        }
        let _guards = self.lock_for_write(path, deadline).await?;
        let current = self
            .current(path)
            .await?
            .ok_or_else(|| LdpError::NotFound(path.clone()))?;
        check_preconditions(request, Some(&current))?;

        self.store.delete(path).await?;
        let kind = if current.is_container {
            EventKind::ContainerDeleted
        } else {
            EventKind::ResourceDeleted
        };
        self.emit(kind, path, &request.agent);
        Ok(Outcome::Deleted)
    }

    async fn handle_acl(
        &self,
        request: &LdpRequest,
        document: &ResourcePath,
        resource: &ResourcePath,
        deadline: &Deadline,
    ) -> Result<Outcome, LdpError> {
        let not_found = |e: StoreError| match e {
            StoreError::NotFound(_) => LdpError::NotFound(document.clone()),
            other => other.into(),
        };

        match request.method {
            Method::GET | Method::HEAD => {
                let _guard = self.locks.read(resource, deadline).await?;
                let data = self.store.get_acl(resource).await.map_err(not_found)?;
                Ok(Outcome::Read(Representation {
                    data,
                    content_type: "text/turtle".to_string(),
                    is_container: false,
                    metadata: None,
                }))
            }
            Method::OPTIONS => Ok(Outcome::Options {
                allow: allowed_methods(&request.target),
            }),
            Method::PUT => {
                if let Some(content_type) = request.content_type.as_deref() {
                    if content_type != "text/turtle" {
                        return Err(LdpError::UnsupportedMediaType(content_type.to_string()));
                    }
                }
                let url = self.base.url_for(document);
                AclDocument::parse(&request.body, &url, &self.base)
                    .and_then(|parsed| parsed.validate())
                    .map_err(|e: AclError| LdpError::BadRequest(e.to_string()))?;

                let _guards = self.lock_for_write(resource, deadline).await?;
                self.store.metadata(resource).await?;
                let existed = self.store.get_acl(resource).await.is_ok();
                self.store.put_acl(resource, request.body.clone()).await?;
                self.emit_acl_changed(document, resource, &request.agent);
                if existed {
                    Ok(Outcome::Updated)
                } else {
                    Ok(Outcome::Created {
                        location: document.clone(),
                    })
                }
            }
            Method::DELETE => {
                let _guards = self.lock_for_write(resource, deadline).await?;
                self.store.delete_acl(resource).await.map_err(not_found)?;
                self.emit_acl_changed(document, resource, &request.agent);
                Ok(Outcome::Deleted)
            }
            _ => Err(LdpError::MethodNotAllowed(document.clone())),
        }
    }

    fn emit_acl_changed(&self, document: &ResourcePath, resource: &ResourcePath, agent: &Agent) {
        let event = Event::new(
            EventKind::AclChanged,
            document.clone(),
            self.clock.now(),
            agent.event_label(),
        )
        .with_extra("resource", resource.as_str());
        self.emit_event(event);
    }
}

fn check_preconditions(
    request: &LdpRequest,
    current: Option<&ResourceMetadata>,
) -> Result<(), LdpError> {
    if let Some(condition) = &request.if_match {
        let holds = current.map_or(false, |m| etag_matches(condition, &m.etag()));
        if !holds {
            return Err(LdpError::PreconditionFailed);
        }
    }
    if let Some(condition) = &request.if_none_match {
        let violated = current.map_or(false, |m| etag_matches(condition, &m.etag()));
        if violated {
            return Err(LdpError::PreconditionFailed);
        }
    }
    Ok(())
}

/// Weak comparison of an `If-Match` style list against `etag`.
fn etag_matches(condition: &str, etag: &str) -> bool {
    let opaque = |tag: &str| tag.trim().trim_start_matches("W/").to_string();
    let etag = opaque(etag);
    condition
        .split(',')
        .any(|candidate| candidate.trim() == "*" || opaque(candidate) == etag)
}
