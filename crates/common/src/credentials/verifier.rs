use std::collections::HashMap;

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use url::Url;

use crate::agent::{Credentials, WebId};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("unknown token")]
    UnknownToken,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token does not name a WebID")]
    NoWebId,
    #[error("verifier misconfigured: {0}")]
    Config(String),
}

/// Turns an access token into the credentials it vouches for.
///
/// `target` is the URL the token is being presented to, for verifiers
/// that bind tokens to an audience or a resource.
#[async_trait]
pub trait TokenVerifier: std::fmt::Debug + Send + Sync {
    async fn verify(&self, token: &str, target: Option<&Url>) -> Result<Credentials, VerifyError>;
}

/// A fixed token to WebID table, for development and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, WebId>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, webid: WebId) -> Self {
        self.tokens.insert(token.into(), webid);
        self
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str, _target: Option<&Url>) -> Result<Credentials, VerifyError> {
        self.tokens
            .get(token)
            .cloned()
            .map(Credentials::for_agent)
            .ok_or(VerifyError::UnknownToken)
    }
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    webid: Option<String>,
    sub: Option<String>,
    iss: Option<String>,
    azp: Option<String>,
    client_id: Option<String>,
}

/// Verifies signed JWT access tokens against a single key.
pub struct JwtTokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtTokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .field("issuer", &self.validation.iss)
            .finish()
    }
}

impl JwtTokenVerifier {
    /// RS256 tokens signed by the holder of `pem`'s private half.
    pub fn rsa_pem(pem: &str, issuer: Option<&str>, audience: Option<&str>) -> Result<Self, VerifyError> {
        let key = DecodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| VerifyError::Config(e.to_string()))?;
        Ok(Self::new(key, Algorithm::RS256, issuer, audience))
    }

    /// HS256 tokens signed with a shared secret.
    pub fn hmac_secret(secret: &[u8], issuer: Option<&str>, audience: Option<&str>) -> Self {
        Self::new(DecodingKey::from_secret(secret), Algorithm::HS256, issuer, audience)
    }

    fn new(key: DecodingKey, alg: Algorithm, issuer: Option<&str>, audience: Option<&str>) -> Self {
        let mut validation = Validation::new(alg);
        match issuer {
            Some(iss) => {
                validation.set_issuer(&[iss]);
                validation.set_required_spec_claims(&["exp", "iss"]);
            }
            None => validation.set_required_spec_claims(&["exp"]),
        }
        match audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        Self { key, validation }
    }
}

fn http_uri(raw: Option<&str>) -> Option<Url> {
    raw.and_then(|s| Url::parse(s).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

#[async_trait]
impl TokenVerifier for JwtTokenVerifier {
    async fn verify(&self, token: &str, _target: Option<&Url>) -> Result<Credentials, VerifyError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation)?;
        let claims = data.claims;

        let webid = claims
            .webid
            .as_deref()
            .or(claims.sub.as_deref().filter(|s| http_uri(Some(s)).is_some()))
            .ok_or(VerifyError::NoWebId)
            .and_then(|raw| WebId::parse(raw).map_err(|_| VerifyError::NoWebId))?;

        Ok(Credentials {
            agent: Some(webid),
            client: http_uri(claims.azp.as_deref().or(claims.client_id.as_deref())),
            issuer: http_uri(claims.iss.as_deref()),
        })
    }
}
