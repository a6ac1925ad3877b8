use async_trait::async_trait;

use super::{CredentialError, CredentialExtractor, RequestInfo};
use crate::agent::{Credentials, WebId, PUBLIC_AGENT};
use crate::deadline::Deadline;

/// Hands every request the public agent `foaf:Agent`.
#[derive(Debug, Clone, Default)]
pub struct PublicExtractor;

#[async_trait]
impl CredentialExtractor for PublicExtractor {
    async fn extract(
        &self,
        _request: &RequestInfo,
        _deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        let webid = WebId::parse(PUBLIC_AGENT)
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        Ok(Credentials::for_agent(webid))
    }
}

/// Hands every request the same configured WebID. Single-user setups and
/// tests only.
#[derive(Debug, Clone)]
pub struct ConstantExtractor {
    webid: WebId,
}

impl ConstantExtractor {
    pub fn new(webid: WebId) -> Self {
        Self { webid }
    }
}

#[async_trait]
impl CredentialExtractor for ConstantExtractor {
    async fn extract(
        &self,
        _request: &RequestInfo,
        _deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        Ok(Credentials::for_agent(self.webid.clone()))
    }
}
