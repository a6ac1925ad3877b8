use std::sync::Arc;

use async_trait::async_trait;

use super::{CredentialError, CredentialExtractor, RequestInfo};
use crate::agent::Credentials;
use crate::deadline::Deadline;

/// Runs extractors in order and merges what they find. Earlier
/// extractors win for each field. Failing members are skipped; the union
/// only fails when every member does.
#[derive(Debug, Clone, Default)]
pub struct UnionExtractor {
    members: Vec<Arc<dyn CredentialExtractor>>,
}

impl UnionExtractor {
    pub fn new(members: Vec<Arc<dyn CredentialExtractor>>) -> Self {
        Self { members }
    }
}

#[async_trait]
impl CredentialExtractor for UnionExtractor {
    async fn extract(
        &self,
        request: &RequestInfo,
        deadline: &Deadline,
    ) -> Result<Credentials, CredentialError> {
        let mut merged = Credentials::default();
        let mut last_error = None;
        let mut any_ok = self.members.is_empty();

        for member in &self.members {
            match member.extract(request, deadline).await {
                Ok(found) => {
                    any_ok = true;
                    merged.merge(found);
                }
                Err(CredentialError::TimedOut(t)) => return Err(CredentialError::TimedOut(t)),
                Err(e) => {
                    tracing::debug!(extractor = ?member, error = %e, "credential extractor failed");
                    last_error = Some(e);
                }
            }
        }

        match (any_ok, last_error) {
            (false, Some(e)) => Err(CredentialError::AllFailed(Box::new(e))),
            _ => Ok(merged),
        }
    }
}

#[cfg(test)]
mod tests {
    use http::Method;

    use super::super::tests::request;
    use super::super::{BearerExtractor, ConstantExtractor, PublicExtractor, StaticTokenVerifier};
    use super::*;
    use crate::agent::{Agent, WebId};

    fn alice() -> WebId {
        WebId::parse("https://alice.example/#me").unwrap()
    }

    #[tokio::test]
    async fn test_first_member_wins() {
        let union = UnionExtractor::new(vec![
            Arc::new(ConstantExtractor::new(alice())),
            Arc::new(PublicExtractor),
        ]);
        let req = request(Method::GET, "https://pod.example/", &[]);
        let creds = union.extract(&req, &Deadline::none()).await.unwrap();
        assert_eq!(creds.agent, Some(alice()));
    }

    #[tokio::test]
    async fn test_failures_skipped_unless_all_fail() {
        let bearer = Arc::new(BearerExtractor::new(Some(Arc::new(
            StaticTokenVerifier::new().with_token("good", alice()),
        ))));
        let union = UnionExtractor::new(vec![bearer.clone(), Arc::new(PublicExtractor)]);
        let req = request(
            Method::GET,
            "https://pod.example/",
            &[("authorization", "Bearer forged")],
        );
        let creds = union.extract(&req, &Deadline::none()).await.unwrap();
        assert_eq!(Agent::from_credentials(&creds), Agent::Anonymous);

        let alone = UnionExtractor::new(vec![bearer]);
        assert!(matches!(
            alone.extract(&req, &Deadline::none()).await,
            Err(CredentialError::AllFailed(_))
        ));
    }
}
