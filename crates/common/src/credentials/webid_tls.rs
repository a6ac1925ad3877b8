//! WebID-TLS: the client certificate names a WebID, and the WebID's
//! profile vouches for the certificate's public key.

use std::sync::Arc;

use async_trait::async_trait;
use x509_parser::prelude::{FromDer, GeneralName, X509Certificate};
use x509_parser::public_key::PublicKey;

use super::{CredentialError, CredentialExtractor, RequestInfo};
use crate::agent::{Credentials, WebId};
use crate::deadline::Deadline;
use crate::fetch::Fetcher;
use crate::rdf::{ns, parse_turtle, Graph, Term};

#[derive(Debug, Clone)]
pub struct WebIdTlsExtractor {
    fetcher: Arc<dyn Fetcher>,
}

/// What we need out of the certificate.
#[derive(Debug)]
struct Presented {
    candidates: Vec<WebId>,
    modulus: String,
    exponent: u64,
}

impl WebIdTlsExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }

    fn inspect(der: &[u8]) -> Result<Presented, CredentialError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| CredentialError::Malformed(format!("client certificate: {}", e)))?;
        if !cert.validity().is_valid() {
            return Err(CredentialError::Rejected("client certificate expired".into()));
        }

        let mut candidates = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::URI(uri) = name {
                    if let Ok(webid) = WebId::parse(uri) {
                        candidates.push(webid);
                    }
                }
            }
        }
        if candidates.is_empty() {
            let cn = cert
                .subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok());
            if let Some(webid) = cn.and_then(|cn| WebId::parse(cn).ok()) {
                candidates.push(webid);
            }
        }
        if candidates.is_empty() {
            return Err(CredentialError::Malformed(
                "client certificate names no WebID".into(),
            ));
        }

        let (modulus, exponent) = match cert.public_key().parsed() {
            Ok(PublicKey::RSA(rsa)) => (hex_digits(rsa.modulus), be_u64(rsa.exponent)?),
            _ => {
                return Err(CredentialError::Rejected(
                    "client certificate key is not RSA".into(),
                ))
            }
        };
        Ok(Presented {
            candidates,
            modulus,
            exponent,
        })
    }

    /// True if the profile declares a `cert:key` for `webid` with the
    /// presented modulus and exponent.
    fn profile_vouches(profile: &Graph, webid: &WebId, presented: &Presented) -> bool {
        let subject = Term::iri(webid.as_str());
        let key_predicate = format!("{}key", ns::CERT);
        let modulus_predicate = format!("{}modulus", ns::CERT);
        let exponent_predicate = format!("{}exponent", ns::CERT);

        let vouched = profile.objects(&subject, &key_predicate).any(|key| {
            let modulus_ok = profile
                .objects(key, &modulus_predicate)
                .filter_map(Term::as_literal)
                .any(|m| normalize_hex(&m.value) == presented.modulus);
            let exponent_ok = profile
                .objects(key, &exponent_predicate)
                .filter_map(Term::as_literal)
                .any(|e| e.value.trim().parse::<u64>().ok() == Some(presented.exponent));
            modulus_ok && exponent_ok
        });
        vouched
    }
}

/// Lowercase hex with leading zeros stripped.
fn hex_digits(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let trimmed = hex.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Profiles write moduli with arbitrary case, separators and padding.
fn normalize_hex(raw: &str) -> String {
    let digits: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn be_u64(bytes: &[u8]) -> Result<u64, CredentialError> {
    let significant: Vec<u8> = bytes.iter().copied().skip_while(|b| *b == 0).collect();
    if significant.len() > 8 {
        return Err(CredentialError::Rejected("RSA exponent too large".into()));
    }
    Ok(significant.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

#[async_trait]
impl CredentialExtractor for WebIdTlsExtractor {
    async fn extract(
        &self,
        request: &RequestInfo,
        deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        let Some(der) = request.peer_certificate.as_deref() else {
            return Ok(Credentials::default());
        };
        let presented = Self::inspect(der)?;

        for webid in &presented.candidates {
            let document = webid.document();
            let fetched = match self.fetcher.get(&document, deadline).await {
                Ok(fetched) => fetched,
                Err(crate::fetch::FetchError::TimedOut(t)) => return Err(t.into()),
                Err(e) => {
                    tracing::debug!(webid = %webid, error = %e, "WebID profile unavailable");
                    continue;
                }
            };
            let text = String::from_utf8_lossy(&fetched.data);
            let profile = match parse_turtle(&text, &document) {
                Ok(profile) => profile,
                Err(e) => {
                    tracing::debug!(webid = %webid, error = %e, "WebID profile unparseable");
                    continue;
                }
            };
            if Self::profile_vouches(&profile, webid, &presented) {
                return Ok(Credentials::for_agent(webid.clone()));
            }
        }

        Err(CredentialError::Rejected(
            "no WebID profile vouches for the certificate key".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::super::tests::request;
    use super::*;
    use crate::fetch::tests::StaticFetcher;

    const ALICE_CERT: &[u8] = include_bytes!("../../tests/fixtures/alice.cert.der");
    const ALICE_MODULUS: &str = include_str!("../../tests/fixtures/alice.modulus.hex");
    const MALLORY_CERT: &[u8] = include_bytes!("../../tests/fixtures/mallory.cert.der");
    const MALLORY_MODULUS: &str = include_str!("../../tests/fixtures/mallory.modulus.hex");

    fn profile(modulus: &str) -> String {
        format!(
            r#"@prefix cert: <http://www.w3.org/ns/auth/cert#>.
@prefix xsd: <http://www.w3.org/2001/XMLSchema#>.
<#me> cert:key [
    a cert:RSAPublicKey;
    cert:modulus "00{}"^^xsd:hexBinary;
    cert:exponent 65537
] ."#,
            modulus.trim().to_uppercase()
        )
    }

    fn tls_request(cert: &[u8]) -> RequestInfo {
        let mut req = request(Method::GET, "https://pod.example/", &[]);
        req.peer_certificate = Some(cert.to_vec());
        req
    }

    #[tokio::test]
    async fn test_san_uri_with_matching_key() {
        let fetcher = Arc::new(StaticFetcher::with(
            "https://alice.example/profile",
            &profile(ALICE_MODULUS),
        ));
        let extractor = WebIdTlsExtractor::new(fetcher);
        let creds = extractor
            .extract(&tls_request(ALICE_CERT), &Deadline::none())
            .await
            .unwrap();
        assert_eq!(
            creds.agent.unwrap().as_str(),
            "https://alice.example/profile#me"
        );
    }

    #[tokio::test]
    async fn test_common_name_fallback() {
        let fetcher = Arc::new(StaticFetcher::with(
            "https://mallory.example/profile",
            &profile(MALLORY_MODULUS),
        ));
        let extractor = WebIdTlsExtractor::new(fetcher);
        let creds = extractor
            .extract(&tls_request(MALLORY_CERT), &Deadline::none())
            .await
            .unwrap();
        assert_eq!(
            creds.agent.unwrap().as_str(),
            "https://mallory.example/profile#me"
        );
    }

    #[tokio::test]
    async fn test_profile_with_other_key_rejected() {
        // alice's profile lists mallory's key
        let fetcher = Arc::new(StaticFetcher::with(
            "https://alice.example/profile",
            &profile(MALLORY_MODULUS),
        ));
        let extractor = WebIdTlsExtractor::new(fetcher);
        assert!(matches!(
            extractor
                .extract(&tls_request(ALICE_CERT), &Deadline::none())
                .await,
            Err(CredentialError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_no_certificate_is_empty() {
        let extractor = WebIdTlsExtractor::new(Arc::new(StaticFetcher::default()));
        let req = request(Method::GET, "https://pod.example/", &[]);
        assert!(extractor
            .extract(&req, &Deadline::none())
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_hex_normalization() {
        assert_eq!(normalize_hex("00:AB:cd 01"), "abcd01");
        assert_eq!(hex_digits(&[0x00, 0x0a, 0xbc]), "abc");
        assert_eq!(be_u64(&[0x01, 0x00, 0x01]).unwrap(), 65537);
    }
}
