use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use url::Url;

use super::AclError;
use crate::agent::WebId;
use crate::deadline::Deadline;
use crate::events::{Event, Observer};
use crate::fetch::Fetcher;
use crate::path::PodBase;
use crate::rdf::{ns, parse_turtle, Term};

type Members = Arc<HashSet<String>>;

/// Group membership lists, fetched on first use and cached by group URI.
///
/// Lookups never hold the cache lock across a fetch. Two concurrent misses
/// may both fetch; whichever lands first is kept.
#[derive(Debug)]
pub struct GroupCache {
    fetcher: Arc<dyn Fetcher>,
    base: PodBase,
    cache: RwLock<HashMap<Url, Members>>,
}

impl GroupCache {
    pub fn new(fetcher: Arc<dyn Fetcher>, base: PodBase) -> Self {
        Self {
            fetcher,
            base,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// True if the group document lists `webid` via `vcard:hasMember`.
    pub async fn is_member(
        &self,
        group: &Url,
        webid: &WebId,
        deadline: &Deadline,
    ) -> Result<bool, AclError> {
        let members = match self.cached(group) {
            Some(members) => members,
            None => {
                let fetched = self.load(group, deadline).await?;
                self.cache
                    .write()
                    .entry(group.clone())
                    .or_insert(fetched)
                    .clone()
            }
        };
        Ok(members.contains(webid.as_str()))
    }

    fn cached(&self, group: &Url) -> Option<Members> {
        self.cache.read().get(group).cloned()
    }

    async fn load(&self, group: &Url, deadline: &Deadline) -> Result<Members, AclError> {
        let mut document = group.clone();
        document.set_fragment(None);
        let fetched = self.fetcher.get(&document, deadline).await?;
        let text = String::from_utf8_lossy(&fetched.data);
        let graph = parse_turtle(&text, &document).map_err(|source| AclError::Parse {
            document: document.to_string(),
            source,
        })?;

        let has_member = format!("{}hasMember", ns::VCARD);
        let members: HashSet<String> = graph
            .objects(&Term::iri(group.as_str()), &has_member)
            .filter_map(Term::as_iri)
            .map(str::to_string)
            .collect();
        tracing::debug!(group = %group, members = members.len(), "loaded group");
        Ok(Arc::new(members))
    }

    pub fn invalidate_group(&self, group: &Url) {
        self.cache.write().remove(group);
    }

    pub fn clear_group_cache(&self) {
        self.cache.write().clear();
    }

    /// Forget every group defined in the document at `document`.
    pub fn invalidate_document(&self, document: &Url) {
        let mut document = document.clone();
        document.set_fragment(None);
        self.cache.write().retain(|group, _| {
            let mut defined_in = group.clone();
            defined_in.set_fragment(None);
            defined_in != document
        });
    }

    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pod-local group documents change under us; drop them when they do.
#[async_trait]
impl Observer for GroupCache {
    async fn on_event(&self, event: &Event) -> anyhow::Result<()> {
        self.invalidate_document(&self.base.url_for(&event.path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::events::EventKind;
    use crate::fetch::tests::StaticFetcher;
    use crate::path::ResourcePath;

    const GROUPS: &str = r#"
        @prefix vcard: <http://www.w3.org/2006/vcard/ns#>.
        <#friends> a vcard:Group;
            vcard:hasMember <https://alice.example/#me>, <https://bob.example/#me>.
        <#family> a vcard:Group;
            vcard:hasMember <https://carol.example/#me>.
    "#;

    fn setup() -> (Arc<StaticFetcher>, GroupCache) {
        let fetcher = Arc::new(StaticFetcher::with("https://pod.example/groups", GROUPS));
        let cache = GroupCache::new(
            fetcher.clone(),
            PodBase::new(Url::parse("https://pod.example/").unwrap()),
        );
        (fetcher, cache)
    }

    fn webid(s: &str) -> WebId {
        WebId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_membership_is_cached() {
        let (fetcher, cache) = setup();
        let friends = Url::parse("https://pod.example/groups#friends").unwrap();
        let none = Deadline::none();

        assert!(cache
            .is_member(&friends, &webid("https://alice.example/#me"), &none)
            .await
            .unwrap());
        assert!(!cache
            .is_member(&friends, &webid("https://carol.example/#me"), &none)
            .await
            .unwrap());
        assert_eq!(*fetcher.hits.lock(), 1);

        cache.invalidate_group(&friends);
        cache
            .is_member(&friends, &webid("https://bob.example/#me"), &none)
            .await
            .unwrap();
        assert_eq!(*fetcher.hits.lock(), 2);
    }

    #[tokio::test]
    async fn test_mutation_event_invalidates() {
        let (_, cache) = setup();
        let none = Deadline::none();
        let alice = webid("https://alice.example/#me");
        for group in ["https://pod.example/groups#friends", "https://pod.example/groups#family"] {
            cache
                .is_member(&Url::parse(group).unwrap(), &alice, &none)
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 2);

        let unrelated = Event::new(
            EventKind::ResourceUpdated,
            ResourcePath::parse("/notes.txt").unwrap(),
            Utc::now(),
            "",
        );
        cache.on_event(&unrelated).await.unwrap();
        assert_eq!(cache.len(), 2);

        let edited = Event::new(
            EventKind::ResourceUpdated,
            ResourcePath::parse("/groups").unwrap(),
            Utc::now(),
            "",
        );
        cache.on_event(&edited).await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_group_document_errors() {
        let (_, cache) = setup();
        let result = cache
            .is_member(
                &Url::parse("https://pod.example/nowhere#g").unwrap(),
                &webid("https://alice.example/#me"),
                &Deadline::none(),
            )
            .await;
        assert!(matches!(result, Err(AclError::Fetch(_))));
        assert!(cache.is_empty());
    }
}
