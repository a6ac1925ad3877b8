use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use clap::Args;

use service::{spawn_service, Config};

use crate::state::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct Serve {
    /// Override the listen port (default from config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Override the log level (default from config)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("state error: {0}")]
    StateError(#[from] crate::state::StateError),

    #[error("invalid log level: {0}")]
    LogLevel(String),
}

impl Serve {
    /// The runtime service config: file values with command line overrides.
    fn service_config(&self, config: &AppConfig) -> Result<Config, ServeError> {
        let port = self.port.unwrap_or(config.port);
        let level = self.log_level.as_deref().unwrap_or(&config.log_level);
        let log_level =
            tracing::Level::from_str(level).map_err(|_| ServeError::LogLevel(level.to_string()))?;

        Ok(Config {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            base_url: config.base_url.clone(),
            cors_origin: config.cors_origin.clone(),
            max_body_bytes: config.max_body_bytes,
            client_cert_header: config.client_cert_header.clone(),
            store: config.store.clone(),
            acl_suffix: config.acl_suffix.clone(),
            auto_create_containers: config.auto_create_containers,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            event_queue_capacity: config.event_queue_capacity,
            extractors: config.extractors.clone(),
            verifier: config.verifier.clone(),
            dpop_skew_secs: config.dpop_skew_secs,
            max_fetch_bytes: config.max_fetch_bytes,
            owner: config.owner.clone(),
            log_level,
            log_dir: self.log_dir.clone().or_else(|| config.log_dir.clone()),
        })
    }
}

#[async_trait::async_trait]
impl crate::op::Op for Serve {
    type Error = ServeError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let config = self.service_config(&state.config)?;

        spawn_service(&config).await;
        Ok("pod server stopped".to_string())
    }
}
