//! # Resource identifiers
//!
//! Every resource in a pod is addressed by a normalized absolute path.
//! A trailing `/` marks a container, its absence a document. The root
//! `/` is always a container.
//!
//! ACL documents are addressed by appending a suffix (`.acl` by default)
//! to the path of the resource they govern, so `/notes.txt.acl` governs
//! `/notes.txt` and `/photos/.acl` governs `/photos/`. See [`AclSuffix`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default suffix used to address ACL documents.
pub const DEFAULT_ACL_SUFFIX: &str = ".acl";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path must be absolute: {0}")]
    NotAbsolute(String),
    #[error("path escapes the root: {0}")]
    EscapesRoot(String),
    #[error("invalid path segment: {0}")]
    InvalidSegment(String),
    #[error("not a container: {0}")]
    NotContainer(String),
}

/// A normalized absolute resource path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath(String);

impl ResourcePath {
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse and normalize a raw path.
    ///
    /// Empty and `.` segments are dropped and `..` pops the previous
    /// segment. A `..` that would climb above the root is rejected
    /// rather than clamped.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if !raw.starts_with('/') {
            return Err(PathError::NotAbsolute(raw.to_string()));
        }

        let mut segments: Vec<&str> = Vec::new();
        let mut container = raw.ends_with('/');
        for part in raw.split('/') {
            match part {
                "" => {}
                "." => container = true,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(PathError::EscapesRoot(raw.to_string()));
                    }
                    container = true;
                }
                segment => {
                    validate_segment(segment)?;
                    segments.push(segment);
                    container = false;
                }
            }
        }
        // a trailing slash survives normalization
        if raw.ends_with('/') {
            container = true;
        }

        if segments.is_empty() {
            return Ok(Self::root());
        }

        let mut path = String::with_capacity(raw.len());
        for segment in &segments {
            path.push('/');
            path.push_str(segment);
        }
        if container {
            path.push('/');
        }
        Ok(Self(path))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    pub fn is_container(&self) -> bool {
        self.0.ends_with('/')
    }

    pub fn is_document(&self) -> bool {
        !self.is_container()
    }

    /// Iterate over the non-empty segments of the path.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// The last segment, without any trailing slash. `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments().last()
    }

    /// True if any segment is a hidden (dot-prefixed) name.
    pub fn is_hidden(&self) -> bool {
        self.segments().any(|s| s.starts_with('.'))
    }

    /// The containing container. `None` for the root.
    pub fn parent(&self) -> Option<ResourcePath> {
        if self.is_root() {
            return None;
        }
        let trimmed = self.0.trim_end_matches('/');
        let idx = trimmed.rfind('/')?;
        Some(Self(trimmed[..=idx].to_string()))
    }

    /// All ancestors from the direct parent up to and including the root.
    pub fn ancestors(&self) -> Vec<ResourcePath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            out.push(p);
        }
        out
    }

    /// Build the path of a direct child of this container.
    pub fn child(&self, name: &str, container: bool) -> Result<ResourcePath, PathError> {
        if !self.is_container() {
            return Err(PathError::NotContainer(self.0.clone()));
        }
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(PathError::InvalidSegment(name.to_string()));
        }
        validate_segment(name)?;
        let mut path = format!("{}{}", self.0, name);
        if container {
            path.push('/');
        }
        Ok(Self(path))
    }

    /// True if `self` equals `container` or lies somewhere beneath it.
    pub fn is_within(&self, container: &ResourcePath) -> bool {
        container.is_container() && self.0.starts_with(&container.0)
    }

    /// The same name viewed as a container.
    pub fn as_container(&self) -> ResourcePath {
        if self.is_container() {
            self.clone()
        } else {
            Self(format!("{}/", self.0))
        }
    }

    /// The same name viewed as a document. The root stays the root.
    pub fn as_document(&self) -> ResourcePath {
        if self.is_root() || self.is_document() {
            self.clone()
        } else {
            Self(self.0.trim_end_matches('/').to_string())
        }
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.contains('\0') || segment.contains('\\') {
        return Err(PathError::InvalidSegment(segment.escape_debug().to_string()));
    }
    Ok(())
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourcePath> for String {
    fn from(value: ResourcePath) -> Self {
        value.0
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What a request path refers to once the ACL suffix is taken into account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A regular document or container.
    Resource(ResourcePath),
    /// The ACL document of `resource`, addressed at `document`.
    Acl {
        document: ResourcePath,
        resource: ResourcePath,
    },
}

impl Target {
    /// The resource whose permissions govern this target.
    pub fn resource(&self) -> &ResourcePath {
        match self {
            Target::Resource(path) => path,
            Target::Acl { resource, .. } => resource,
        }
    }

    /// The path the client addressed.
    pub fn requested(&self) -> &ResourcePath {
        match self {
            Target::Resource(path) => path,
            Target::Acl { document, .. } => document,
        }
    }

    pub fn is_acl(&self) -> bool {
        matches!(self, Target::Acl { .. })
    }
}

/// Maps resources to the paths of their ACL documents and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclSuffix(String);

impl Default for AclSuffix {
    fn default() -> Self {
        Self(DEFAULT_ACL_SUFFIX.to_string())
    }
}

impl AclSuffix {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self(suffix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path at which the ACL for `resource` is addressed.
    pub fn acl_path_for(&self, resource: &ResourcePath) -> ResourcePath {
        ResourcePath(format!("{}{}", resource.as_str(), self.0))
    }

    /// Classify a request path as a resource or an ACL document.
    pub fn classify(&self, path: ResourcePath) -> Target {
        if path.is_document() {
            if let Some(stripped) = path.as_str().strip_suffix(self.0.as_str()) {
                if let Ok(resource) = ResourcePath::parse(stripped) {
                    return Target::Acl {
                        document: path,
                        resource,
                    };
                }
            }
        }
        Target::Resource(path)
    }
}

/// The pod's public base URL. Maps resource paths to absolute URLs and
/// back.
///
/// Paths are kept in the percent-encoded form they arrive in on the wire,
/// so both directions are plain string operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodBase(Url);

impl PodBase {
    pub fn new(mut url: Url) -> Self {
        url.set_query(None);
        url.set_fragment(None);
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Self(url)
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    /// The absolute URL of `path`.
    pub fn url_for(&self, path: &ResourcePath) -> Url {
        let mut url = self.0.clone();
        let joined = format!("{}{}", self.0.path(), &path.as_str()[1..]);
        url.set_path(&joined);
        url
    }

    /// The pod path `url` points at, if it lies under the base URL.
    /// Query and fragment are ignored.
    pub fn path_for(&self, url: &Url) -> Option<ResourcePath> {
        if url.scheme() != self.0.scheme()
            || url.host_str() != self.0.host_str()
            || url.port_or_known_default() != self.0.port_or_known_default()
        {
            return None;
        }
        let rest = url.path().strip_prefix(self.0.path())?;
        ResourcePath::parse(&format!("/{}", rest)).ok()
    }

    /// Like [`PodBase::path_for`] for a raw IRI string.
    pub fn path_for_iri(&self, iri: &str) -> Option<ResourcePath> {
        Url::parse(iri).ok().and_then(|url| self.path_for(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    #[test]
    fn test_normalizes_dot_segments() {
        assert_eq!(p("/a/./b/../c.txt").as_str(), "/a/c.txt");
        assert_eq!(p("//a///b/").as_str(), "/a/b/");
        assert_eq!(p("/a/b/.").as_str(), "/a/b/");
        assert_eq!(p("/a/..").as_str(), "/");
        assert_eq!(p("/").as_str(), "/");
    }

    #[test]
    fn test_rejects_escape_and_relative() {
        assert!(matches!(
            ResourcePath::parse("/../etc/passwd"),
            Err(PathError::EscapesRoot(_))
        ));
        assert!(matches!(
            ResourcePath::parse("/a/../../b"),
            Err(PathError::EscapesRoot(_))
        ));
        assert!(matches!(
            ResourcePath::parse("a/b"),
            Err(PathError::NotAbsolute(_))
        ));
        assert!(ResourcePath::parse("/a\\b").is_err());
    }

    #[test]
    fn test_parent_chain() {
        assert_eq!(p("/a/b/c.txt").parent(), Some(p("/a/b/")));
        assert_eq!(p("/a/b/").parent(), Some(p("/a/")));
        assert_eq!(p("/a").parent(), Some(p("/")));
        assert_eq!(p("/").parent(), None);
        assert_eq!(p("/a/b/c").ancestors(), vec![p("/a/b/"), p("/a/"), p("/")]);
    }

    #[test]
    fn test_child_and_within() {
        let c = p("/photos/");
        assert_eq!(c.child("cat.png", false).unwrap(), p("/photos/cat.png"));
        assert_eq!(c.child("2024", true).unwrap(), p("/photos/2024/"));
        assert!(p("/doc").child("x", false).is_err());
        assert!(c.child("a/b", false).is_err());

        assert!(p("/photos/2024/x.png").is_within(&c));
        assert!(c.is_within(&c));
        assert!(!p("/photosx").is_within(&c));
        assert!(!p("/photos").is_within(&c));
    }

    #[test]
    fn test_acl_suffix_classification() {
        let suffix = AclSuffix::default();
        assert_eq!(
            suffix.classify(p("/notes.txt.acl")),
            Target::Acl {
                document: p("/notes.txt.acl"),
                resource: p("/notes.txt"),
            }
        );
        assert_eq!(
            suffix.classify(p("/c/.acl")),
            Target::Acl {
                document: p("/c/.acl"),
                resource: p("/c/"),
            }
        );
        assert_eq!(
            suffix.classify(p("/.acl")),
            Target::Acl {
                document: p("/.acl"),
                resource: p("/"),
            }
        );
        assert_eq!(suffix.classify(p("/c/")), Target::Resource(p("/c/")));
        assert_eq!(suffix.acl_path_for(&p("/c/")), p("/c/.acl"));
        assert_eq!(suffix.acl_path_for(&p("/d.ttl")), p("/d.ttl.acl"));
    }

    #[test]
    fn test_pod_base_mapping() {
        let base = PodBase::new(Url::parse("https://pod.example/data").unwrap());
        assert_eq!(base.url().as_str(), "https://pod.example/data/");
        assert_eq!(
            base.url_for(&p("/c/x.txt")).as_str(),
            "https://pod.example/data/c/x.txt"
        );
        assert_eq!(base.url_for(&ResourcePath::root()).as_str(), "https://pod.example/data/");
        assert_eq!(
            base.path_for_iri("https://pod.example/data/c/#frag"),
            Some(p("/c/"))
        );
        assert_eq!(base.path_for_iri("https://pod.example:443/data/a"), Some(p("/a")));
        assert_eq!(base.path_for_iri("https://pod.example/other/a"), None);
        assert_eq!(base.path_for_iri("https://evil.example/data/a"), None);
        assert_eq!(base.path_for_iri("http://pod.example/data/a"), None);
    }
}
