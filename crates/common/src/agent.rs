//! # Agents
//!
//! An [`Agent`] is the principal behind a request once credentials have
//! been resolved. Credentials themselves are a loose bag of optional
//! fields ([`Credentials`]) produced by the extractors in
//! [`crate::credentials`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// `foaf:Agent`, the class of everyone. Also the WebID the public
/// extractor hands out.
pub const PUBLIC_AGENT: &str = "http://xmlns.com/foaf/0.1/Agent";

/// `acl:AuthenticatedAgent`, the class of anyone with a WebID.
pub const AUTHENTICATED_AGENT: &str = "http://www.w3.org/ns/auth/acl#AuthenticatedAgent";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebIdError {
    #[error("invalid WebID {0}: {1}")]
    Invalid(String, url::ParseError),
    #[error("WebID must be an http(s) URI: {0}")]
    Scheme(String),
}

/// An absolute HTTP(S) URI identifying an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WebId(Url);

impl WebId {
    pub fn parse(raw: &str) -> Result<Self, WebIdError> {
        let url = Url::parse(raw).map_err(|e| WebIdError::Invalid(raw.to_string(), e))?;
        Self::from_url(url)
    }

    pub fn from_url(url: Url) -> Result<Self, WebIdError> {
        match url.scheme() {
            "http" | "https" => Ok(Self(url)),
            _ => Err(WebIdError::Scheme(url.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The profile document the WebID dereferences to.
    pub fn document(&self) -> Url {
        let mut url = self.0.clone();
        url.set_fragment(None);
        url
    }

    pub fn is_public(&self) -> bool {
        self.as_str() == PUBLIC_AGENT
    }

    pub fn is_authenticated_class(&self) -> bool {
        self.as_str() == AUTHENTICATED_AGENT
    }
}

impl fmt::Display for WebId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebId {
    type Err = WebIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WebId {
    type Error = WebIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<WebId> for String {
    fn from(value: WebId) -> Self {
        value.0.into()
    }
}

/// The resolved principal behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Agent {
    /// No WebID was presented.
    Anonymous,
    /// A specific agent identified by its WebID.
    User(WebId),
    /// Someone authenticated, with only the class known.
    Authenticated(WebId),
    /// A group of agents, identified by the group URI.
    Group(Url),
}

impl Agent {
    /// The WebID this agent presents, if any.
    pub fn webid(&self) -> Option<&WebId> {
        match self {
            Agent::User(webid) | Agent::Authenticated(webid) => Some(webid),
            Agent::Anonymous | Agent::Group(_) => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Agent::Anonymous)
    }

    /// Resolve credentials into an agent. Group membership is never
    /// decided here; the ACL resolver looks it up when a rule needs it.
    pub fn from_credentials(credentials: &Credentials) -> Self {
        match &credentials.agent {
            None => Agent::Anonymous,
            Some(webid) if webid.is_public() => Agent::Anonymous,
            Some(webid) if webid.is_authenticated_class() => Agent::Authenticated(webid.clone()),
            Some(webid) => Agent::User(webid.clone()),
        }
    }

    /// The WebID string recorded on events, empty for anonymous agents.
    pub fn event_label(&self) -> String {
        match self {
            Agent::Group(url) => url.to_string(),
            other => other
                .webid()
                .map(|w| w.to_string())
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Anonymous => write!(f, "anonymous"),
            Agent::User(webid) => write!(f, "{}", webid),
            Agent::Authenticated(webid) => write!(f, "authenticated({})", webid),
            Agent::Group(url) => write!(f, "group({})", url),
        }
    }
}

/// Credential fragments gathered from a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub agent: Option<WebId>,
    pub client: Option<Url>,
    pub issuer: Option<Url>,
}

impl Credentials {
    pub fn for_agent(webid: WebId) -> Self {
        Self {
            agent: Some(webid),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.agent.is_none() && self.client.is_none() && self.issuer.is_none()
    }

    /// Fill any field still unset from `other`. Fields already set win.
    pub fn merge(&mut self, other: Credentials) {
        if self.agent.is_none() {
            self.agent = other.agent;
        }
        if self.client.is_none() {
            self.client = other.client;
        }
        if self.issuer.is_none() {
            self.issuer = other.issuer;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webid_requires_http() {
        assert!(WebId::parse("https://alice.example/#me").is_ok());
        assert!(matches!(
            WebId::parse("mailto:alice@example.org"),
            Err(WebIdError::Scheme(_))
        ));
        assert!(WebId::parse("not a uri").is_err());
    }

    #[test]
    fn test_resolution() {
        let alice = WebId::parse("https://alice.example/#me").unwrap();
        assert_eq!(
            Agent::from_credentials(&Credentials::default()),
            Agent::Anonymous
        );
        assert_eq!(
            Agent::from_credentials(&Credentials::for_agent(WebId::parse(PUBLIC_AGENT).unwrap())),
            Agent::Anonymous
        );
        assert_eq!(
            Agent::from_credentials(&Credentials::for_agent(alice.clone())),
            Agent::User(alice)
        );
        assert!(matches!(
            Agent::from_credentials(&Credentials::for_agent(
                WebId::parse(AUTHENTICATED_AGENT).unwrap()
            )),
            Agent::Authenticated(_)
        ));
    }

    #[test]
    fn test_merge_prefers_existing() {
        let alice = WebId::parse("https://alice.example/#me").unwrap();
        let bob = WebId::parse("https://bob.example/#me").unwrap();
        let issuer = Url::parse("https://idp.example/").unwrap();

        let mut merged = Credentials::for_agent(alice.clone());
        merged.merge(Credentials {
            agent: Some(bob),
            client: None,
            issuer: Some(issuer.clone()),
        });
        assert_eq!(merged.agent, Some(alice));
        assert_eq!(merged.issuer, Some(issuer));
        assert!(merged.client.is_none());
    }
}
