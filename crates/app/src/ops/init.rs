use clap::Args;

use common::store::StoreConfig;

use crate::state::AppConfig;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port the pod server listens on
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Public URL of the pod root (defaults to http://localhost:<port>/)
    #[arg(long)]
    pub base_url: Option<url::Url>,

    /// WebID that owns the pod and gets full control on first start
    #[arg(long)]
    pub owner: Option<String>,

    /// Keep resources in memory instead of the data directory
    #[arg(long)]
    pub in_memory: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let pod_dir = ctx.pod_dir()?;
        let store = if self.in_memory {
            StoreConfig::Memory
        } else {
            StoreConfig::Filesystem {
                path: pod_dir.join(crate::state::DATA_DIR_NAME),
            }
        };
        let config = AppConfig {
            port: self.port,
            base_url: self.base_url.clone(),
            owner: self.owner.clone(),
            store,
            ..AppConfig::default()
        };

        let state = ctx.init_state(Some(config))?;

        let store_str = match &state.config.store {
            StoreConfig::Memory => "memory (lost on restart)".to_string(),
            StoreConfig::Filesystem { path } => path.display().to_string(),
        };
        let owner_str = state
            .config
            .owner
            .clone()
            .unwrap_or_else(|| "none (add an ACL to the root before use)".to_string());

        let output = format!(
            "Initialized pod directory at: {}\n\
             - Config: {}\n\
             - Store: {}\n\
             - Port: {}\n\
             - Owner: {}",
            state.pod_dir.display(),
            state.config_path.display(),
            store_str,
            state.config.port,
            owner_str
        );

        Ok(output)
    }
}
