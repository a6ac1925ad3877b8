//! # Web Access Control
//!
//! Access is decided per request from the ACL document that governs the
//! target: its own, or the nearest ancestor's (inherited, `acl:default`
//! rules only). See [`AclResolver`].

mod document;
mod groups;
mod resolver;

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use http::Method;

use crate::deadline::TimedOut;
use crate::fetch::FetchError;
use crate::rdf::TurtleError;
use crate::store::StoreError;

pub use document::{AclDocument, AgentMatcher, Rule};
pub use groups::GroupCache;
pub use resolver::{AclResolver, Governing};

/// A set of WAC access modes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessModes(u8);

impl AccessModes {
    pub const NONE: AccessModes = AccessModes(0);
    pub const READ: AccessModes = AccessModes(1);
    pub const WRITE: AccessModes = AccessModes(1 << 1);
    pub const APPEND: AccessModes = AccessModes(1 << 2);
    pub const CONTROL: AccessModes = AccessModes(1 << 3);

    const NAMED: [(AccessModes, &'static str, &'static str); 4] = [
        (Self::READ, "read", "Read"),
        (Self::WRITE, "write", "Write"),
        (Self::APPEND, "append", "Append"),
        (Self::CONTROL, "control", "Control"),
    ];

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: AccessModes) -> bool {
        self.0 & other.0 == other.0
    }

    /// The modes implied by these: Write grants Append.
    pub fn implied(self) -> AccessModes {
        if self.contains(Self::WRITE) {
            self | Self::APPEND
        } else {
            self
        }
    }

    /// Parse an `acl:` mode IRI.
    pub fn from_iri(iri: &str) -> Option<AccessModes> {
        let local = iri.strip_prefix(crate::rdf::ns::ACL)?;
        Self::NAMED
            .iter()
            .find(|(_, _, name)| *name == local)
            .map(|(mode, _, _)| *mode)
    }

    /// The mode a request needs. ACL documents need Control on the
    /// resource they govern.
    pub fn required_for(method: &Method, acl_target: bool) -> AccessModes {
        if acl_target {
            return Self::CONTROL;
        }
        match *method {
            Method::PUT | Method::DELETE | Method::PATCH => Self::WRITE,
            Method::POST => Self::APPEND,
            _ => Self::READ,
        }
    }

    /// Space separated lowercase names, as used in `WAC-Allow`.
    pub fn names(self) -> String {
        Self::NAMED
            .iter()
            .filter(|(mode, _, _)| self.contains(*mode))
            .map(|(_, name, _)| *name)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl BitOr for AccessModes {
    type Output = AccessModes;

    fn bitor(self, rhs: Self) -> Self::Output {
        AccessModes(self.0 | rhs.0)
    }
}

impl BitOrAssign for AccessModes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AccessModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessModes({})", self.names())
    }
}

impl fmt::Display for AccessModes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AclError {
    #[error("ACL document {document} does not parse: {source}")]
    Parse {
        document: String,
        #[source]
        source: TurtleError,
    },
    #[error("invalid ACL document: {0}")]
    Invalid(String),
    #[error("group lookup failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("reading ACL failed: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    TimedOut(#[from] TimedOut),
}
