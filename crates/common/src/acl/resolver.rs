use std::sync::Arc;

use bytes::Bytes;

use super::{AccessModes, AclDocument, AclError, AgentMatcher, GroupCache, Rule};
use crate::agent::Agent;
use crate::deadline::Deadline;
use crate::path::{AclSuffix, PodBase, ResourcePath};
use crate::store::{PathLocks, Store, StoreError};

/// The ACL that decides access to some target.
#[derive(Debug, Clone)]
pub struct Governing {
    /// The resource the ACL is attached to.
    pub acl_for: ResourcePath,
    /// False when the ACL belongs to the target itself.
    pub inherited: bool,
    pub bytes: Bytes,
}

/// Decides whether an agent may access a resource.
#[derive(Debug, Clone)]
pub struct AclResolver {
    store: Arc<dyn Store>,
    locks: Arc<PathLocks>,
    base: PodBase,
    suffix: AclSuffix,
    groups: Arc<GroupCache>,
}

impl AclResolver {
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<PathLocks>,
        base: PodBase,
        suffix: AclSuffix,
        groups: Arc<GroupCache>,
    ) -> Self {
        Self {
            store,
            locks,
            base,
            suffix,
            groups,
        }
    }

    pub fn groups(&self) -> &Arc<GroupCache> {
        &self.groups
    }

    /// Read the ACL blob attached to `path`, `None` when there is none.
    async fn acl_at(
        &self,
        path: &ResourcePath,
        deadline: &Deadline,
    ) -> Result<Option<Bytes>, AclError> {
        let _guard = self.locks.read(path, deadline).await?;
        match self.store.get_acl(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Find the governing ACL for `target`.
    ///
    /// The target's own ACL governs when it has content. Otherwise the
    /// nearest ancestor with an ACL record governs, even an empty one,
    /// with the root as the last resort. `None` means no rules anywhere.
    pub async fn locate(
        &self,
        target: &ResourcePath,
        deadline: &Deadline,
    ) -> Result<Option<Governing>, AclError> {
        if let Some(bytes) = self.acl_at(target, deadline).await? {
            if !bytes.is_empty() {
                return Ok(Some(Governing {
                    acl_for: target.clone(),
                    inherited: false,
                    bytes,
                }));
            }
        }

        for ancestor in target.ancestors() {
            if let Some(bytes) = self.acl_at(&ancestor, deadline).await? {
                return Ok(Some(Governing {
                    acl_for: ancestor,
                    inherited: true,
                    bytes,
                }));
            }
        }
        Ok(None)
    }

    /// Every mode `agent` holds on `target`, with Write implying Append.
    pub async fn allowed_modes(
        &self,
        target: &ResourcePath,
        agent: &Agent,
        deadline: &Deadline,
    ) -> Result<AccessModes, AclError> {
        let Some(governing) = self.locate(target, deadline).await? else {
            return Ok(AccessModes::NONE);
        };
        let document_url = self
            .base
            .url_for(&self.suffix.acl_path_for(&governing.acl_for));
        let document = AclDocument::parse(&governing.bytes, &document_url, &self.base)?;

        let mut allowed = AccessModes::NONE;
        for rule in &document.rules {
            if !rule.covers(target, &governing.acl_for, governing.inherited) {
                continue;
            }
            // nothing new to gain from this rule
            if allowed.contains(rule.modes) {
                continue;
            }
            if self.matches_agent(rule, agent, deadline).await? {
                allowed |= rule.modes;
            }
        }
        Ok(allowed.implied())
    }

    /// True if `agent` holds every mode in `requested` on `target`.
    pub async fn authorize(
        &self,
        target: &ResourcePath,
        agent: &Agent,
        requested: AccessModes,
        deadline: &Deadline,
    ) -> Result<bool, AclError> {
        let allowed = self.allowed_modes(target, agent, deadline).await?;
        let granted = allowed.contains(requested);
        tracing::trace!(
            target = %target,
            agent = %agent,
            requested = %requested,
            allowed = %allowed,
            granted,
            "access decision"
        );
        Ok(granted)
    }

    async fn matches_agent(
        &self,
        rule: &Rule,
        agent: &Agent,
        deadline: &Deadline,
    ) -> Result<bool, AclError> {
        let webid = agent.webid();
        let direct = rule.agents.iter().any(|matcher| match matcher {
            AgentMatcher::Public => true,
            AgentMatcher::Authenticated => webid.is_some(),
            AgentMatcher::WebId(named) => webid == Some(named),
            AgentMatcher::Group(group) => matches!(agent, Agent::Group(g) if g == group),
        });
        if direct {
            return Ok(true);
        }

        let Some(webid) = webid else {
            return Ok(false);
        };
        for matcher in &rule.agents {
            if let AgentMatcher::Group(group) = matcher {
                if self.groups.is_member(group, webid, deadline).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
