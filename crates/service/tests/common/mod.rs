//! Shared test utilities for pod server integration tests
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::{Method, Request, Response};
use parking_lot::Mutex;
use tower::ServiceExt;
use url::Url;

use ::common::events::{Event, EventKind, Observer};
use ::common::path::ResourcePath;
use ::common::store::StoreConfig;
use service::http::{router as pod_router, Config as HttpConfig};
use service::{Config, ServiceState, VerifierConfig};

pub const BASE: &str = "http://pod.example/";
pub const ALICE: &str = "https://alice.example/#me";
pub const BOB: &str = "https://bob.example/#me";
pub const ALICE_TOKEN: &str = "alice-token";
pub const BOB_TOKEN: &str = "bob-token";

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
    pub fn kinds(&self) -> Vec<(EventKind, String)> {
        self.0
            .lock()
            .iter()
            .map(|e| (e.kind, e.path.to_string()))
            .collect()
    }

    /// Give in-flight deliveries a moment, then return what arrived.
    pub async fn settle(&self) -> Vec<(EventKind, String)> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.kinds()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

pub struct TestServer {
    pub state: ServiceState,
    pub router: Router,
    pub recorder: Arc<Recorder>,
    _observer: Arc<dyn Observer>,
}

/// Config for an in-memory pod at [`BASE`] where Alice and Bob hold
/// static tokens.
pub fn test_config() -> Config {
    let mut tokens = BTreeMap::new();
    tokens.insert(ALICE_TOKEN.to_string(), ALICE.to_string());
    tokens.insert(BOB_TOKEN.to_string(), BOB.to_string());
    Config {
        base_url: Some(Url::parse(BASE).unwrap()),
        store: StoreConfig::Memory,
        verifier: Some(VerifierConfig::Static { tokens }),
        ..Config::default()
    }
}

/// Set up a pod server with no ACLs at all.
pub async fn setup_test_env() -> TestServer {
    setup_with(test_config()).await
}

pub async fn setup_with(config: Config) -> TestServer {
    let state = ServiceState::from_config(&config).await.unwrap();
    let http_config = HttpConfig::new(config.listen_addr, config.cors_origin.clone(), config.max_body_bytes);
    let router = pod_router(state.clone(), &http_config);

    let recorder = Arc::new(Recorder::default());
    let observer: Arc<dyn Observer> = recorder.clone();
    state.dispatcher().register(&observer, &[]);

    TestServer {
        state,
        router,
        recorder,
        _observer: observer,
    }
}

pub fn path(raw: &str) -> ResourcePath {
    ResourcePath::parse(raw).unwrap()
}

pub struct Call {
    builder: http::request::Builder,
    body: Bytes,
}

impl Call {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
            body: Bytes::new(),
        }
    }

    pub fn token(mut self, token: &str) -> Self {
        self.builder = self
            .builder
            .header("authorization", format!("Bearer {}", token));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn body(mut self, body: &str, content_type: &str) -> Self {
        self.builder = self.builder.header("content-type", content_type);
        self.body = Bytes::copy_from_slice(body.as_bytes());
        self
    }
}

impl TestServer {
    pub async fn send(&self, call: Call) -> Response<Body> {
        let request = call.builder.body(Body::from(call.body)).unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Write a document straight into the store, creating missing
    /// containers on the way.
    pub async fn seed(&self, raw: &str, body: &str, content_type: &str) {
        let store = self.state.store();
        let target = path(raw);
        let mut ancestors = target.ancestors();
        ancestors.reverse();
        for ancestor in ancestors {
            if !store.exists(&ancestor).await.unwrap() {
                store.create_container(&ancestor).await.unwrap();
            }
        }
        if target.is_container() {
            if !store.exists(&target).await.unwrap() {
                store.create_container(&target).await.unwrap();
            }
        } else {
            store
                .put(&target, Bytes::copy_from_slice(body.as_bytes()), content_type)
                .await
                .unwrap();
        }
    }

    pub async fn seed_acl(&self, raw: &str, turtle: &str) {
        self.state
            .store()
            .put_acl(&path(raw), Bytes::copy_from_slice(turtle.as_bytes()))
            .await
            .unwrap();
    }

    pub async fn stored(&self, raw: &str) -> Option<String> {
        self.state
            .store()
            .get(&path(raw))
            .await
            .ok()
            .map(|doc| String::from_utf8(doc.data.to_vec()).unwrap())
    }
}

pub async fn text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
