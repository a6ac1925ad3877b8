use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use url::Url;

use super::{CredentialError, CredentialExtractor, RequestInfo, TokenVerifier};
use crate::agent::Credentials;
use crate::clock::Clock;
use crate::deadline::Deadline;

/// Allowed distance between a DPoP proof's `iat` and our clock.
pub const DEFAULT_DPOP_SKEW_SECS: i64 = 300;

/// `Authorization: Bearer <token>`. Without a verifier every token is
/// refused.
#[derive(Debug, Clone)]
pub struct BearerExtractor {
    verifier: Option<Arc<dyn TokenVerifier>>,
}

impl BearerExtractor {
    pub fn new(verifier: Option<Arc<dyn TokenVerifier>>) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl CredentialExtractor for BearerExtractor {
    async fn extract(
        &self,
        request: &RequestInfo,
        deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        let token = match request.authorization() {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token,
            _ => return Ok(Credentials::default()),
        };
        let verifier = self.verifier.as_ref().ok_or(CredentialError::NoVerifier)?;
        Ok(deadline.run(verifier.verify(token, Some(&request.url))).await??)
    }
}

#[derive(Debug, Deserialize)]
struct ProofClaims {
    htm: String,
    htu: String,
    iat: i64,
}

/// `Authorization: DPoP <token>` with a `DPoP` proof header binding the
/// token to this method and URL.
#[derive(Debug, Clone)]
pub struct DpopExtractor {
    verifier: Option<Arc<dyn TokenVerifier>>,
    clock: Arc<dyn Clock>,
    skew: chrono::Duration,
}

impl DpopExtractor {
    pub fn new(verifier: Option<Arc<dyn TokenVerifier>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier,
            clock,
            skew: chrono::Duration::seconds(DEFAULT_DPOP_SKEW_SECS),
        }
    }

    pub fn with_skew(mut self, skew: chrono::Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Check the proof's signature and claims against the request.
    fn check_proof(&self, proof: &str, request: &RequestInfo) -> Result<(), CredentialError> {
        let header = decode_header(proof)
            .map_err(|e| CredentialError::Malformed(format!("DPoP proof header: {}", e)))?;
        if header.typ.as_deref() != Some("dpop+jwt") {
            return Err(CredentialError::Rejected("DPoP proof typ must be dpop+jwt".into()));
        }
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(CredentialError::Rejected(
                "DPoP proof must use an asymmetric algorithm".into(),
            ));
        }
        let jwk = header
            .jwk
            .as_ref()
            .ok_or_else(|| CredentialError::Malformed("DPoP proof carries no jwk".into()))?;
        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| CredentialError::Malformed(format!("DPoP proof jwk: {}", e)))?;

        let mut validation = Validation::new(header.alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_aud = false;
        let claims = decode::<ProofClaims>(proof, &key, &validation)
            .map_err(|e| CredentialError::Rejected(format!("DPoP proof: {}", e)))?
            .claims;

        if claims.htm != request.method.as_str() {
            return Err(CredentialError::Rejected(format!(
                "DPoP htm {} does not match {}",
                claims.htm, request.method
            )));
        }
        let htu = Url::parse(&claims.htu)
            .map_err(|e| CredentialError::Malformed(format!("DPoP htu: {}", e)))?;
        if strip(htu) != strip(request.url.clone()) {
            return Err(CredentialError::Rejected("DPoP htu does not match the request".into()));
        }
        let now = self.clock.now().timestamp();
        if (now - claims.iat).abs() > self.skew.num_seconds() {
            return Err(CredentialError::Rejected("DPoP proof iat outside allowed skew".into()));
        }
        Ok(())
    }
}

fn strip(mut url: Url) -> Url {
    url.set_query(None);
    url.set_fragment(None);
    url
}

#[async_trait]
impl CredentialExtractor for DpopExtractor {
    async fn extract(
        &self,
        request: &RequestInfo,
        deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        let token = match request.authorization() {
            Some((scheme, token)) if scheme.eq_ignore_ascii_case("dpop") => token,
            _ => return Ok(Credentials::default()),
        };
        let proof = request
            .headers
            .get("dpop")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CredentialError::Malformed("missing DPoP proof header".into()))?;
        self.check_proof(proof, request)?;

        let verifier = self.verifier.as_ref().ok_or(CredentialError::NoVerifier)?;
        Ok(deadline.run(verifier.verify(token, Some(&request.url))).await??)
    }
}
