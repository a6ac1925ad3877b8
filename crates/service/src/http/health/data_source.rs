use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use http::request::Parts;

use common::path::ResourcePath;
use common::store::Store;

use crate::ServiceState;

/// What `/readyz` asks before the pod takes traffic.
#[async_trait]
pub trait DataSource {
    /// Which dependency this source checks, reported on failure.
    fn component(&self) -> &'static str;

    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("the pod root container is missing")]
    RootMissing,
    #[error("the resource store is not answering")]
    StoreUnavailable,
}

pub type DynDataSource = Arc<dyn DataSource + Send + Sync>;

pub struct StateDataSource(DynDataSource);

impl Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataSource").finish()
    }
}

impl StateDataSource {
    #[cfg(test)]
    pub fn new(dds: DynDataSource) -> Self {
        Self(dds)
    }
}

impl Deref for StateDataSource {
    type Target = DynDataSource;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Ready once the store answers for the pod root.
struct StoreSource {
    store: Arc<dyn Store>,
}

#[async_trait]
impl DataSource for StoreSource {
    fn component(&self) -> &'static str {
        "store"
    }

    async fn is_ready(&self) -> Result<(), DataSourceError> {
        match self.store.exists(&ResourcePath::root()).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::warn!("pod root is missing from the store");
                Err(DataSourceError::RootMissing)
            }
            Err(e) => {
                tracing::warn!(error = %e, "store readiness check failed");
                Err(DataSourceError::StoreUnavailable)
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<ServiceState> for StateDataSource {
    type Rejection = ();

    async fn from_request_parts(
        _parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource(Arc::new(StoreSource {
            store: state.store().clone(),
        })))
    }
}
