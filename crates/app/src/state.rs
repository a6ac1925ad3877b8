use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use common::store::StoreConfig;
use service::{ExtractorConfig, VerifierConfig};

pub const APP_NAME: &str = "pod";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATA_DIR_NAME: &str = "data";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Port the pod server listens on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of the pod root (defaults to http://localhost:<port>/)
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Where resources live
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default = "default_acl_suffix")]
    pub acl_suffix: String,
    /// Origin allowed by CORS (any origin if not set)
    #[serde(default)]
    pub cors_origin: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Events buffered per observer before the oldest are dropped
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Create missing containers on POST and PUT
    #[serde(default)]
    pub auto_create_containers: bool,
    /// WebID given full control of the pod on first start
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default = "default_extractors")]
    pub extractors: Vec<ExtractorConfig>,
    #[serde(default)]
    pub verifier: Option<VerifierConfig>,
    #[serde(default = "default_dpop_skew_secs")]
    pub dpop_skew_secs: i64,
    /// Largest remote WebID profile or group document the pod will read
    #[serde(default = "default_max_fetch_bytes")]
    pub max_fetch_bytes: usize,
    /// Header a TLS terminating proxy forwards the client certificate in
    #[serde(default)]
    pub client_cert_header: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    3000
}

fn default_acl_suffix() -> String {
    common::path::DEFAULT_ACL_SUFFIX.to_string()
}

fn default_request_timeout_secs() -> u64 {
    service::config::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_max_body_bytes() -> usize {
    service::config::DEFAULT_MAX_BODY_BYTES
}

fn default_event_queue_capacity() -> usize {
    common::events::DEFAULT_QUEUE_CAPACITY
}

fn default_extractors() -> Vec<ExtractorConfig> {
    vec![ExtractorConfig::Bearer, ExtractorConfig::Dpop]
}

fn default_dpop_skew_secs() -> i64 {
    common::credentials::DEFAULT_DPOP_SKEW_SECS
}

fn default_max_fetch_bytes() -> usize {
    common::fetch::DEFAULT_MAX_FETCH_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            base_url: None,
            store: StoreConfig::default(),
            acl_suffix: default_acl_suffix(),
            cors_origin: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
            event_queue_capacity: default_event_queue_capacity(),
            auto_create_containers: false,
            owner: None,
            extractors: default_extractors(),
            verifier: None,
            dpop_skew_secs: default_dpop_skew_secs(),
            max_fetch_bytes: default_max_fetch_bytes(),
            client_cert_header: None,
            log_level: default_log_level(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the pod directory (~/.pod)
    pub pod_dir: PathBuf,
    /// Path to the default resource directory
    pub data_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the pod directory path (custom or default ~/.pod)
    pub fn pod_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new pod state directory. Without an explicit config
    /// the pod stores resources on disk under the data directory.
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let pod_dir = Self::pod_dir(custom_path)?;

        if pod_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&pod_dir)?;

        let data_path = pod_dir.join(DATA_DIR_NAME);
        fs::create_dir_all(&data_path)?;

        let config = config.unwrap_or_else(|| AppConfig {
            store: StoreConfig::Filesystem {
                path: data_path.clone(),
            },
            ..AppConfig::default()
        });
        let config_path = pod_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            pod_dir,
            data_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the pod directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let pod_dir = Self::pod_dir(custom_path)?;

        if !pod_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let data_path = pod_dir.join(DATA_DIR_NAME);
        let config_path = pod_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            pod_dir,
            data_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("pod directory not initialized. Run 'pod init' first")]
    NotInitialized,

    #[error("pod directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
