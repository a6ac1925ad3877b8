//! Shared test utilities for pod integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;
use tempfile::TempDir;
use url::Url;

use ::common::acl::{AccessModes, AclError, AclResolver, GroupCache};
use ::common::agent::{Agent, WebId};
use ::common::clock::SystemClock;
use ::common::deadline::Deadline;
use ::common::events::{Dispatcher, Event, EventKind, Observer};
use ::common::fetch::{FetchError, Fetched, Fetcher, PodFetcher};
use ::common::ldp::{LdpEngine, LdpError, LdpRequest, Outcome};
use ::common::path::{AclSuffix, PodBase, ResourcePath, Target};
use ::common::store::{FsStore, MemoryStore, PathLocks, Store};

pub const BASE: &str = "https://pod.example/";
pub const ALICE: &str = "https://alice.example/#me";
pub const BOB: &str = "https://bob.example/#me";

/// Refuses every URL outside the pod.
#[derive(Debug)]
pub struct Offline;

#[async_trait]
impl Fetcher for Offline {
    async fn get(&self, url: &Url, _deadline: &Deadline) -> Result<Fetched, FetchError> {
        Err(FetchError::NotFound(url.clone()))
    }
}

/// Records every event it is handed.
#[derive(Debug, Default)]
pub struct Recorder(Mutex<Vec<Event>>);

#[async_trait]
impl Observer for Recorder {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self.0.lock().push(event.clone());
        Ok(())
    }
}

impl Recorder {
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().clone()
    }

    pub fn kinds(&self) -> Vec<(EventKind, String)> {
        self.0
            .lock()
            .iter()
            .map(|e| (e.kind, e.path.to_string()))
            .collect()
    }

    /// Wait until at least `n` events arrived, then return them all.
    pub async fn wait_for(&self, n: usize) -> Vec<(EventKind, String)> {
        for _ in 0..400 {
            if self.0.lock().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.kinds()
    }

    /// Give in-flight deliveries a moment, then return what arrived.
    pub async fn settle(&self) -> Vec<(EventKind, String)> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.kinds()
    }
}

/// Why a request never reached the engine, or what the engine said.
#[derive(Debug)]
pub enum Failure {
    Unauthorized,
    Forbidden,
    Acl(AclError),
    Ldp(LdpError),
}

pub struct TestPod {
    pub store: Arc<dyn Store>,
    pub locks: Arc<PathLocks>,
    pub dispatcher: Arc<Dispatcher>,
    pub resolver: AclResolver,
    pub engine: LdpEngine,
    pub recorder: Arc<Recorder>,
    pub base: PodBase,
    observers: Vec<Arc<dyn Observer>>,
    _temp: Option<TempDir>,
}

/// Set up an in-memory pod with a recording observer registered for
/// every event kind.
pub async fn setup_test_env() -> TestPod {
    let clock = Arc::new(SystemClock);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(clock));
    build(store, None)
}

/// Same as [`setup_test_env`] but backed by a filesystem store in a
/// temporary directory.
pub async fn setup_fs_env() -> TestPod {
    let temp_dir = TempDir::new().unwrap();
    let store: Arc<dyn Store> = Arc::new(
        FsStore::open(temp_dir.path(), Arc::new(SystemClock))
            .await
            .unwrap(),
    );
    build(store, Some(temp_dir))
}

fn build(store: Arc<dyn Store>, temp: Option<TempDir>) -> TestPod {
    let clock = Arc::new(SystemClock);
    let base = PodBase::new(Url::parse(BASE).unwrap());
    let locks = Arc::new(PathLocks::new());
    let dispatcher = Arc::new(Dispatcher::default());

    let fetcher = Arc::new(PodFetcher::new(base.clone(), store.clone(), Arc::new(Offline)));
    let groups = Arc::new(GroupCache::new(fetcher, base.clone()));
    let resolver = AclResolver::new(
        store.clone(),
        locks.clone(),
        base.clone(),
        AclSuffix::default(),
        groups.clone(),
    );
    let engine = LdpEngine::new(
        store.clone(),
        locks.clone(),
        dispatcher.clone(),
        clock,
        base.clone(),
    );

    let recorder = Arc::new(Recorder::default());
    let recording: Arc<dyn Observer> = recorder.clone();
    let invalidating: Arc<dyn Observer> = groups;
    dispatcher.register(&recording, &[]);
    dispatcher.register(&invalidating, &[]);

    TestPod {
        store,
        locks,
        dispatcher,
        resolver,
        engine,
        recorder,
        base,
        observers: vec![recording, invalidating],
        _temp: temp,
    }
}

pub fn path(raw: &str) -> ResourcePath {
    ResourcePath::parse(raw).unwrap()
}

pub fn target(raw: &str) -> Target {
    AclSuffix::default().classify(path(raw))
}

pub fn user(webid: &str) -> Agent {
    Agent::User(WebId::parse(webid).unwrap())
}

pub fn alice() -> Agent {
    user(ALICE)
}

pub fn bob() -> Agent {
    user(BOB)
}

impl TestPod {
    pub fn request(&self, method: Method, raw: &str, agent: Agent) -> LdpRequest {
        LdpRequest::new(method, target(raw), agent)
    }

    /// Run a request through the engine with no access check.
    pub async fn run(&self, request: LdpRequest) -> Result<Outcome, LdpError> {
        self.engine.handle(request, &Deadline::none()).await
    }

    /// Authorize, then run. Mirrors what the HTTP layer does.
    pub async fn perform(&self, request: LdpRequest) -> Result<Outcome, Failure> {
        let deadline = Deadline::none();
        let required = AccessModes::required_for(&request.method, request.target.is_acl());
        let allowed = self
            .resolver
            .authorize(request.target.resource(), &request.agent, required, &deadline)
            .await
            .map_err(Failure::Acl)?;
        if !allowed {
            return Err(if request.agent.is_anonymous() {
                Failure::Unauthorized
            } else {
                Failure::Forbidden
            });
        }
        self.engine
            .handle(request, &deadline)
            .await
            .map_err(Failure::Ldp)
    }

    /// Write a document straight into the store, creating parents.
    pub async fn seed(&self, raw: &str, body: &str, content_type: &str) {
        let p = path(raw);
        for ancestor in p.ancestors().into_iter().rev() {
            if !self.store.exists(&ancestor).await.unwrap() {
                self.store.create_container(&ancestor).await.unwrap();
            }
        }
        if p.is_container() {
            if !self.store.exists(&p).await.unwrap() {
                self.store.create_container(&p).await.unwrap();
            }
        } else {
            self.store
                .put(&p, Bytes::copy_from_slice(body.as_bytes()), content_type)
                .await
                .unwrap();
        }
    }

    /// Attach an ACL to an existing resource without going through the engine.
    pub async fn seed_acl(&self, raw: &str, turtle: &str) {
        self.store
            .put_acl(&path(raw), Bytes::copy_from_slice(turtle.as_bytes()))
            .await
            .unwrap();
    }

    pub async fn body(&self, raw: &str) -> Option<(Bytes, String)> {
        match self.store.get(&path(raw)).await {
            Ok(doc) => Some((doc.data, doc.content_type)),
            Err(_) => None,
        }
    }

    pub fn temp_root(&self) -> Option<&std::path::Path> {
        self._temp.as_ref().map(TempDir::path)
    }

    pub async fn exists(&self, raw: &str) -> bool {
        self.store.exists(&path(raw)).await.unwrap()
    }
}
