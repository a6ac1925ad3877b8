//! Dereferencing remote documents: group lists and WebID profiles.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use url::Url;

use crate::deadline::{Deadline, TimedOut};
use crate::path::PodBase;
use crate::store::{Store, StoreError};

const ACCEPT_TURTLE: &str = "text/turtle, application/n-triples;q=0.8, */*;q=0.1";
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest remote document read by default (1 MiB).
pub const DEFAULT_MAX_FETCH_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("document not found: {0}")]
    NotFound(Url),
    #[error("fetching {0} returned status {1}")]
    Status(Url, u16),
    #[error("fetching {0} failed: {1}")]
    Transport(Url, String),
    #[error("document at {0} is larger than {1} bytes")]
    TooLarge(Url, usize),
    #[error("reading {0} from the pod failed: {1}")]
    Store(Url, StoreError),
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub data: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait Fetcher: std::fmt::Debug + Send + Sync {
    async fn get(&self, url: &Url, deadline: &Deadline) -> Result<Fetched, FetchError>;
}

/// Fetches over HTTP(S) with reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Caps the size of fetched documents. Longer bodies fail with
    /// `FetchError::TooLarge`.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pod-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: DEFAULT_MAX_FETCH_BYTES,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url, deadline: &Deadline) -> Result<Fetched, FetchError> {
        let mut doc = url.clone();
        doc.set_fragment(None);
        tracing::debug!(url = %doc, "fetching remote document");

        let response = deadline
            .run(
                self.client
                    .get(doc.clone())
                    .header(reqwest::header::ACCEPT, ACCEPT_TURTLE)
                    .send(),
            )
            .await?
            .map_err(|e| FetchError::Transport(doc.clone(), e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(doc));
        }
        if !status.is_success() {
            return Err(FetchError::Status(doc, status.as_u16()));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "text/turtle".to_string());
        let data = deadline.run(self.read_capped(&doc, response)).await??;
        Ok(Fetched { data, content_type })
    }
}

impl HttpFetcher {
    async fn read_capped(&self, doc: &Url, mut response: reqwest::Response) -> Result<Bytes, FetchError> {
        let too_large = || FetchError::TooLarge(doc.clone(), self.max_bytes);
        if let Some(length) = response.content_length() {
            if length > self.max_bytes as u64 {
                return Err(too_large());
            }
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Transport(doc.clone(), e.to_string()))?
        {
            if data.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            data.extend_from_slice(&chunk);
        }
        Ok(data.freeze())
    }
}

/// Serves URLs under the pod's base URL straight from the store and hands
/// everything else to `fallback`.
///
/// Reads go around the path locks. Group and profile documents are read
/// while no lock is held, and single store calls never observe a torn write.
#[derive(Debug, Clone)]
pub struct PodFetcher {
    base: PodBase,
    store: Arc<dyn Store>,
    fallback: Arc<dyn Fetcher>,
}

impl PodFetcher {
    pub fn new(base: PodBase, store: Arc<dyn Store>, fallback: Arc<dyn Fetcher>) -> Self {
        Self {
            base,
            store,
            fallback,
        }
    }
}

#[async_trait]
impl Fetcher for PodFetcher {
    async fn get(&self, url: &Url, deadline: &Deadline) -> Result<Fetched, FetchError> {
        let Some(path) = self.base.path_for(url) else {
            return self.fallback.get(url, deadline).await;
        };
        deadline.check()?;
        match self.store.get(&path).await {
            Ok(doc) => Ok(Fetched {
                data: doc.data,
                content_type: doc.content_type,
            }),
            Err(StoreError::NotFound(_))
            | Err(StoreError::IsContainer(_))
            | Err(StoreError::InvalidPath(_)) => Err(FetchError::NotFound(url.clone())),
            Err(e) => Err(FetchError::Store(url.clone(), e)),
        }
    }
}
