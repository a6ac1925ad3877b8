//! Just enough RDF to read ACLs, group documents, WebID profiles and
//! N3 patches, and to write container listings and patched documents.

mod term;
mod turtle;
mod writer;

pub use term::{Graph, Literal, Term, Triple};
pub use turtle::{parse_n3, parse_turtle, TurtleError};
pub use writer::write_turtle;

/**
 * Vocabularies
 */
pub mod ns {
    pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
    pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
    pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
    pub const XSD_DATETIME: &str = "http://www.w3.org/2001/XMLSchema#dateTime";
    pub const ACL: &str = "http://www.w3.org/ns/auth/acl#";
    pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";
    pub const VCARD: &str = "http://www.w3.org/2006/vcard/ns#";
    pub const LDP: &str = "http://www.w3.org/ns/ldp#";
    pub const CERT: &str = "http://www.w3.org/ns/auth/cert#";
    pub const SOLID: &str = "http://www.w3.org/ns/solid/terms#";
    pub const DCTERMS: &str = "http://purl.org/dc/terms/";
    pub const POSIX: &str = "http://www.w3.org/ns/posix/stat#";
}
