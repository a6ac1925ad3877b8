//! # Credential pipeline
//!
//! Extractors look at one aspect of a request (a bearer token, a DPoP
//! proof, a client certificate) and produce a partial [`Credentials`].
//! A [`UnionExtractor`] runs several and merges their output. The result
//! is resolved into an [`Agent`](crate::agent::Agent) by the caller.
//!
//! Extractors return empty credentials when the request carries nothing
//! they understand, and an error only when it carries something they
//! understand and reject.

mod bearer;
mod fixed;
mod union;
mod verifier;
mod webid_tls;

use async_trait::async_trait;
use http::{HeaderMap, Method};
use url::Url;

use crate::agent::Credentials;
use crate::deadline::{Deadline, TimedOut};
use crate::fetch::FetchError;

pub use bearer::{BearerExtractor, DpopExtractor, DEFAULT_DPOP_SKEW_SECS};
pub use fixed::{ConstantExtractor, PublicExtractor};
pub use union::UnionExtractor;
pub use verifier::{JwtTokenVerifier, StaticTokenVerifier, TokenVerifier, VerifyError};
pub use webid_tls::WebIdTlsExtractor;

/// The parts of a request extractors may look at.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    /// The absolute URL the client addressed.
    pub url: Url,
    pub headers: HeaderMap,
    /// DER encoded client certificate, when TLS terminated with one.
    pub peer_certificate: Option<Vec<u8>>,
}

impl RequestInfo {
    pub fn new(method: Method, url: Url, headers: HeaderMap) -> Self {
        Self {
            method,
            url,
            headers,
            peer_certificate: None,
        }
    }

    /// The `Authorization` header split into scheme and value.
    pub(crate) fn authorization(&self) -> Option<(&str, &str)> {
        let raw = self.headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
        let (scheme, value) = raw.trim().split_once(' ')?;
        Some((scheme, value.trim()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("malformed credentials: {0}")]
    Malformed(String),
    #[error("credentials rejected: {0}")]
    Rejected(String),
    #[error("no token verifier configured")]
    NoVerifier,
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("profile lookup failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
    #[error("every credential extractor failed, last error: {0}")]
    AllFailed(Box<CredentialError>),
}

#[async_trait]
pub trait CredentialExtractor: std::fmt::Debug + Send + Sync {
    async fn extract(
        &self,
        request: &RequestInfo,
        deadline: &Deadline,
    ) -> Result<Credentials, CredentialError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn request(method: Method, url: &str, headers: &[(&str, &str)]) -> RequestInfo {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        RequestInfo::new(method, Url::parse(url).unwrap(), map)
    }

    #[test]
    fn test_authorization_split() {
        let req = request(
            Method::GET,
            "https://pod.example/",
            &[("authorization", "Bearer  abc.def ")],
        );
        assert_eq!(req.authorization(), Some(("Bearer", "abc.def")));
        let req = request(Method::GET, "https://pod.example/", &[]);
        assert_eq!(req.authorization(), None);
    }
}
