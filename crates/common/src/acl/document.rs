use url::Url;

use super::{AccessModes, AclError};
use crate::agent::{WebId, AUTHENTICATED_AGENT, PUBLIC_AGENT};
use crate::path::{PodBase, ResourcePath};
use crate::rdf::{ns, parse_turtle, Graph, Term};

/// Who a rule grants access to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentMatcher {
    /// `acl:agentClass foaf:Agent`, everyone
    Public,
    /// `acl:agentClass acl:AuthenticatedAgent`, anyone with a WebID
    Authenticated,
    /// `acl:agent <webid>`
    WebId(WebId),
    /// `acl:agentGroup <group>`, or a group used as `acl:agentClass`
    Group(Url),
}

/// One `acl:Authorization`.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub modes: AccessModes,
    /// `acl:accessTo`, as pod paths. Targets outside the pod are dropped.
    pub access_to: Vec<ResourcePath>,
    /// `acl:default` containers
    pub defaults: Vec<ResourcePath>,
    pub agents: Vec<AgentMatcher>,
}

impl Rule {
    pub fn is_default(&self) -> bool {
        !self.defaults.is_empty()
    }

    /// Whether the rule covers `target` when read from the ACL of
    /// `governing`, directly or by inheritance.
    pub fn covers(&self, target: &ResourcePath, governing: &ResourcePath, inherited: bool) -> bool {
        if self.access_to.contains(target) {
            return true;
        }
        inherited && self.is_default() && target.is_within(governing)
    }
}

/// The parsed rules of one ACL document, in document order.
#[derive(Debug, Clone, Default)]
pub struct AclDocument {
    pub rules: Vec<Rule>,
    problems: Vec<String>,
}

fn acl(local: &str) -> String {
    format!("{}{}", ns::ACL, local)
}

impl AclDocument {
    /// Parse an ACL document served at `document_url`.
    pub fn parse(bytes: &[u8], document_url: &Url, base: &PodBase) -> Result<Self, AclError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| AclError::Invalid("ACL document is not UTF-8".into()))?;
        let graph = parse_turtle(text, document_url).map_err(|source| AclError::Parse {
            document: document_url.to_string(),
            source,
        })?;
        Ok(Self::from_graph(&graph, base))
    }

    pub fn from_graph(graph: &Graph, base: &PodBase) -> Self {
        let mode_predicate = acl("mode");
        let authorization = acl("Authorization");
        let mut subjects: Vec<&Term> = graph.instances_of(&authorization);
        for triple in graph.iter() {
            if triple.predicate.as_iri() == Some(mode_predicate.as_str())
                && !subjects.contains(&&triple.subject)
            {
                subjects.push(&triple.subject);
            }
        }

        let mut document = AclDocument::default();
        for subject in subjects {
            let rule = document.read_rule(graph, subject, base);
            document.rules.push(rule);
        }
        document
    }

    fn read_rule(&mut self, graph: &Graph, subject: &Term, base: &PodBase) -> Rule {
        let id = match subject {
            Term::Iri(iri) => iri.clone(),
            Term::Blank(label) => format!("_:{}", label),
            other => format!("{:?}", other),
        };

        let mut modes = AccessModes::NONE;
        for object in graph.objects(subject, &acl("mode")) {
            match object.as_iri().and_then(AccessModes::from_iri) {
                Some(mode) => modes |= mode,
                None => self.problems.push(format!("{}: unknown mode {:?}", id, object)),
            }
        }

        let paths = |predicate: &str, problems: &mut Vec<String>| -> Vec<ResourcePath> {
            graph
                .objects(subject, predicate)
                .filter_map(|object| match object.as_iri() {
                    Some(iri) => base.path_for_iri(iri),
                    None => {
                        problems.push(format!("{}: {} is not an IRI", id, predicate));
                        None
                    }
                })
                .collect()
        };
        let access_to = paths(&acl("accessTo"), &mut self.problems);
        let mut defaults = paths(&acl("default"), &mut self.problems);
        defaults.extend(paths(&acl("defaultForNew"), &mut self.problems));

        let mut agents = Vec::new();
        for object in graph.objects(subject, &acl("agent")) {
            match object.as_iri().map(WebId::parse) {
                Some(Ok(webid)) => agents.push(AgentMatcher::WebId(webid)),
                _ => self.problems.push(format!("{}: invalid acl:agent {:?}", id, object)),
            }
        }
        for object in graph.objects(subject, &acl("agentClass")) {
            match object.as_iri() {
                Some(PUBLIC_AGENT) => agents.push(AgentMatcher::Public),
                Some(AUTHENTICATED_AGENT) => agents.push(AgentMatcher::Authenticated),
                Some(iri) => match Url::parse(iri) {
                    Ok(group) => agents.push(AgentMatcher::Group(group)),
                    Err(_) => self.problems.push(format!("{}: invalid agentClass", id)),
                },
                None => self.problems.push(format!("{}: agentClass is not an IRI", id)),
            }
        }
        for object in graph.objects(subject, &acl("agentGroup")) {
            match object.as_iri().map(Url::parse) {
                Some(Ok(group)) => agents.push(AgentMatcher::Group(group)),
                _ => self.problems.push(format!("{}: invalid acl:agentGroup", id)),
            }
        }

        Rule {
            id,
            modes,
            access_to,
            defaults,
            agents,
        }
    }

    /// Check a document a client wants to store: at least one rule, and
    /// every rule names an agent, a resource and a mode.
    pub fn validate(&self) -> Result<(), AclError> {
        if let Some(problem) = self.problems.first() {
            return Err(AclError::Invalid(problem.clone()));
        }
        if self.rules.is_empty() {
            return Err(AclError::Invalid("no authorization rules".into()));
        }
        for rule in &self.rules {
            if rule.agents.is_empty() {
                return Err(AclError::Invalid(format!("{}: no agent", rule.id)));
            }
            if rule.access_to.is_empty() && rule.defaults.is_empty() {
                return Err(AclError::Invalid(format!("{}: no resource", rule.id)));
            }
            if rule.modes.is_empty() {
                return Err(AclError::Invalid(format!("{}: no mode", rule.id)));
            }
        }
        Ok(())
    }
}
