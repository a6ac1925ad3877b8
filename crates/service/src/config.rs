use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use common::credentials::DEFAULT_DPOP_SKEW_SECS;
use common::events::DEFAULT_QUEUE_CAPACITY;
use common::fetch::DEFAULT_MAX_FETCH_BYTES;
use common::store::StoreConfig;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum request body size in bytes (100 MB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;

/// One stage of the credential pipeline. Stages run in order and their
/// findings are merged, earlier stages winning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `Authorization: DPoP <token>` with a `DPoP` proof header
    Dpop,
    /// Client certificate forwarded by a TLS terminating proxy
    WebidTls,
    /// Every request acts as the public agent
    Public,
    /// Every request acts as the given WebID. Development only.
    Constant { webid: String },
}

/// How access tokens are turned into WebIDs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerifierConfig {
    /// A fixed token to WebID table
    Static { tokens: BTreeMap<String, String> },
    /// Signed JWTs checked against an RS256 public key or an HS256 secret
    Jwt {
        #[serde(default)]
        public_key_path: Option<PathBuf>,
        #[serde(default)]
        secret: Option<String>,
        #[serde(default)]
        issuer: Option<String>,
        #[serde(default)]
        audience: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration
    /// address for the pod server to listen on
    pub listen_addr: SocketAddr,
    /// public URL of the pod root, used when a request carries no
    ///  usable Host header and for every URL the pod hands out.
    ///  if not set then http://localhost:<port>/ will be used
    pub base_url: Option<Url>,
    /// origin allowed by CORS, any origin if not set
    pub cors_origin: Option<String>,
    /// largest request body accepted
    pub max_body_bytes: usize,
    /// header a TLS terminating proxy puts the client certificate in
    pub client_cert_header: Option<String>,

    // resource model
    pub store: StoreConfig,
    /// suffix that turns a resource path into its ACL document path
    pub acl_suffix: String,
    /// create missing containers on POST and PUT instead of answering 404
    pub auto_create_containers: bool,
    pub request_timeout: Duration,
    /// capacity of each observer's event queue
    pub event_queue_capacity: usize,

    // authentication
    pub extractors: Vec<ExtractorConfig>,
    pub verifier: Option<VerifierConfig>,
    /// accepted clock difference for DPoP proofs, in seconds
    pub dpop_skew_secs: i64,
    /// largest remote profile or group document read
    pub max_fetch_bytes: usize,
    /// WebID granted full control of the root when it has no ACL yet
    pub owner: Option<String>,

    // misc
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 3000);
        Self {
            listen_addr,
            base_url: None,
            cors_origin: None,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            client_cert_header: None,
            store: StoreConfig::default(),
            acl_suffix: ".acl".to_string(),
            auto_create_containers: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            extractors: vec![ExtractorConfig::Bearer, ExtractorConfig::Dpop],
            verifier: None,
            dpop_skew_secs: DEFAULT_DPOP_SKEW_SECS,
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
            owner: None,
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}

impl Config {
    /// The configured base URL, or the local listen port.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        match &self.base_url {
            Some(url) => Ok(url.clone()),
            None => Ok(Url::parse(&format!(
                "http://localhost:{}/",
                self.listen_addr.port()
            ))?),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    WebId(#[from] common::agent::WebIdError),
    #[error("jwt verifier needs exactly one of public_key_path or secret")]
    JwtKey,
    #[error("reading {}: {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
    #[error(transparent)]
    Verifier(#[from] common::credentials::VerifyError),
    #[error("invalid base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}
