use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderName;

use common::acl::{AclResolver, GroupCache};
use common::agent::WebId;
use common::clock::{Clock, SystemClock};
use common::credentials::{
    BearerExtractor, ConstantExtractor, CredentialExtractor, DpopExtractor, JwtTokenVerifier,
    PublicExtractor, StaticTokenVerifier, TokenVerifier, UnionExtractor, WebIdTlsExtractor,
};
use common::deadline::{Deadline, TimedOut};
use common::events::{Dispatcher, LogObserver, Observer};
use common::fetch::{FetchError, Fetcher, HttpFetcher, PodFetcher};
use common::ldp::LdpEngine;
use common::path::{AclSuffix, PodBase, ResourcePath};
use common::store::{PathLocks, Store, StoreError};

use crate::config::{Config, ConfigError, ExtractorConfig, VerifierConfig};

/// Everything a request needs, shared by all handlers.
#[derive(Clone)]
pub struct State {
    base: PodBase,
    suffix: AclSuffix,
    store: Arc<dyn Store>,
    locks: Arc<PathLocks>,
    dispatcher: Arc<Dispatcher>,
    engine: Arc<LdpEngine>,
    resolver: Arc<AclResolver>,
    extractor: Arc<dyn CredentialExtractor>,
    request_timeout: Duration,
    client_cert_header: Option<HeaderName>,
    // the dispatcher only holds these weakly
    _observers: Arc<Vec<Arc<dyn Observer>>>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let base = PodBase::new(config.base_url()?);
        let suffix = AclSuffix::new(config.acl_suffix.clone());

        // 1. Setup the resource store
        tracing::info!(store = ?config.store, "opening resource store");
        let store = config
            .store
            .build(clock.clone())
            .await
            .map_err(StateSetupError::Store)?;
        let locks = Arc::new(PathLocks::new());

        // 2. Setup fetchers, pod local documents never leave the process
        let http: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new()?.with_max_bytes(config.max_fetch_bytes));
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(PodFetcher::new(base.clone(), store.clone(), http));

        // 3. Setup access control
        let groups = Arc::new(GroupCache::new(fetcher.clone(), base.clone()));
        let resolver = Arc::new(AclResolver::new(
            store.clone(),
            locks.clone(),
            base.clone(),
            suffix.clone(),
            groups.clone(),
        ));

        // 4. Setup events and the engine
        let dispatcher = Arc::new(Dispatcher::new(config.event_queue_capacity));
        let log: Arc<dyn Observer> = Arc::new(LogObserver);
        let invalidate: Arc<dyn Observer> = groups;
        dispatcher.register(&log, &[]);
        dispatcher.register(&invalidate, &[]);

        let engine = Arc::new(
            LdpEngine::new(
                store.clone(),
                locks.clone(),
                dispatcher.clone(),
                clock.clone(),
                base.clone(),
            )
            .with_acl_suffix(suffix.clone())
            .with_auto_create_containers(config.auto_create_containers),
        );

        // 5. Setup the credential pipeline
        let extractor = build_extractor(config, clock, fetcher)?;

        let client_cert_header = config
            .client_cert_header
            .as_deref()
            .map(|name| HeaderName::from_bytes(name.as_bytes()))
            .transpose()
            .map_err(|e| StateSetupError::Header(e.to_string()))?;

        tracing::info!(base = %base.url(), acl_suffix = suffix.as_str(), "pod state ready");

        let state = Self {
            base,
            suffix,
            store,
            locks,
            dispatcher,
            engine,
            resolver,
            extractor,
            request_timeout: config.request_timeout,
            client_cert_header,
            _observers: Arc::new(vec![log, invalidate]),
        };

        if let Some(owner) = &config.owner {
            let owner = WebId::parse(owner).map_err(ConfigError::from)?;
            state.seed_root_acl(&owner).await?;
        }

        Ok(state)
    }

    pub fn base(&self) -> &PodBase {
        &self.base
    }

    pub fn acl_suffix(&self) -> &AclSuffix {
        &self.suffix
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<PathLocks> {
        &self.locks
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn engine(&self) -> &LdpEngine {
        &self.engine
    }

    pub fn resolver(&self) -> &AclResolver {
        &self.resolver
    }

    pub fn extractor(&self) -> &Arc<dyn CredentialExtractor> {
        &self.extractor
    }

    pub fn client_cert_header(&self) -> Option<&HeaderName> {
        self.client_cert_header.as_ref()
    }

    /// A fresh deadline for one request.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }

    /// Give `owner` full control of the pod and everyone read access,
    /// unless the root already has an ACL. Returns whether one was written.
    pub async fn seed_root_acl(&self, owner: &WebId) -> Result<bool, StateSetupError> {
        let root = ResourcePath::root();
        let _guard = self.locks.write(&root, &Deadline::none()).await?;
        match self.store.get_acl(&root).await {
            Ok(_) => return Ok(false),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(StateSetupError::Store(e)),
        }

        self.store
            .put_acl(&root, Bytes::from(root_acl(owner)))
            .await
            .map_err(StateSetupError::Store)?;
        tracing::info!(owner = %owner, "seeded root ACL");
        Ok(true)
    }
}

fn root_acl(owner: &WebId) -> String {
    format!(
        "@prefix acl: <http://www.w3.org/ns/auth/acl#>.\n\
         @prefix foaf: <http://xmlns.com/foaf/0.1/>.\n\
         \n\
         <#owner> a acl:Authorization;\n    \
             acl:agent <{}>;\n    \
             acl:accessTo <./>;\n    \
             acl:default <./>;\n    \
             acl:mode acl:Read, acl:Write, acl:Control.\n\
         \n\
         <#public> a acl:Authorization;\n    \
             acl:agentClass foaf:Agent;\n    \
             acl:accessTo <./>;\n    \
             acl:default <./>;\n    \
             acl:mode acl:Read.\n",
        owner
    )
}

fn build_verifier(config: &VerifierConfig) -> Result<Arc<dyn TokenVerifier>, ConfigError> {
    match config {
        VerifierConfig::Static { tokens } => {
            let mut verifier = StaticTokenVerifier::new();
            for (token, webid) in tokens {
                verifier = verifier.with_token(token.clone(), WebId::parse(webid)?);
            }
            Ok(Arc::new(verifier))
        }
        VerifierConfig::Jwt {
            public_key_path,
            secret,
            issuer,
            audience,
        } => {
            let verifier = match (public_key_path, secret) {
                (Some(path), None) => {
                    let pem = std::fs::read_to_string(path)
                        .map_err(|e| ConfigError::Io(path.clone(), e))?;
                    JwtTokenVerifier::rsa_pem(&pem, issuer.as_deref(), audience.as_deref())?
                }
                (None, Some(secret)) => JwtTokenVerifier::hmac_secret(
                    secret.as_bytes(),
                    issuer.as_deref(),
                    audience.as_deref(),
                ),
                _ => return Err(ConfigError::JwtKey),
            };
            Ok(Arc::new(verifier))
        }
    }
}

fn build_extractor(
    config: &Config,
    clock: Arc<dyn Clock>,
    fetcher: Arc<dyn Fetcher>,
) -> Result<Arc<dyn CredentialExtractor>, ConfigError> {
    let verifier = config.verifier.as_ref().map(build_verifier).transpose()?;

    let mut members: Vec<Arc<dyn CredentialExtractor>> = Vec::new();
    for stage in &config.extractors {
        let member: Arc<dyn CredentialExtractor> = match stage {
            ExtractorConfig::Bearer => Arc::new(BearerExtractor::new(verifier.clone())),
            ExtractorConfig::Dpop => Arc::new(
                DpopExtractor::new(verifier.clone(), clock.clone())
                    .with_skew(chrono::Duration::seconds(config.dpop_skew_secs)),
            ),
            ExtractorConfig::WebidTls => Arc::new(WebIdTlsExtractor::new(fetcher.clone())),
            ExtractorConfig::Public => Arc::new(PublicExtractor),
            ExtractorConfig::Constant { webid } => {
                Arc::new(ConstantExtractor::new(WebId::parse(webid)?))
            }
        };
        members.push(member);
    }
    tracing::debug!(stages = ?config.extractors, "credential pipeline");
    Ok(Arc::new(UnionExtractor::new(members)))
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("http client error: {0}")]
    Fetcher(#[from] FetchError),
    #[error("invalid client certificate header: {0}")]
    Header(String),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}
