/**
 * ACL documents, group membership and the
 *  resolver deciding who may do what.
 */
pub mod acl;
/**
 * Agents, WebIDs and the credentials a request
 *  carries.
 */
pub mod agent;
pub mod clock;
/**
 * Credential extractors: bearer and DPoP tokens,
 *  WebID-TLS client certificates, and unions
 *  of them.
 */
pub mod credentials;
pub mod deadline;
/**
 * Change events and the dispatcher fanning them
 *  out to observers.
 */
pub mod events;
/**
 * Dereferencing group documents and WebID
 *  profiles, locally or over HTTP.
 */
pub mod fetch;
/**
 * Resource operations over the store: reads,
 *  creation, replacement, patches, deletion.
 */
pub mod ldp;
pub mod path;
/**
 * Just enough RDF: terms, graphs, and a Turtle
 *  and N3 reader and writer.
 */
pub mod rdf;
/**
 * Persistence for documents, containers and
 *  their side records.
 */
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::acl::{AccessModes, AclError, AclResolver, GroupCache};
    pub use crate::agent::{Agent, Credentials, WebId};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::credentials::{CredentialError, CredentialExtractor, RequestInfo};
    pub use crate::deadline::{Deadline, TimedOut};
    pub use crate::events::{Dispatcher, Event, EventKind, Observer};
    pub use crate::fetch::{Fetcher, HttpFetcher, PodFetcher};
    pub use crate::ldp::{LdpEngine, LdpError, LdpRequest, Outcome};
    pub use crate::path::{AclSuffix, PodBase, ResourcePath, Target};
    pub use crate::store::{Store, StoreConfig, StoreError};
    pub use crate::version::build_info;
}
