use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;

use crate::rdf::{ns, write_turtle, Graph, Literal, Term, Triple};
use crate::store::ResourceMetadata;

fn iri(vocab: &str, local: &str) -> Term {
    Term::iri(format!("{}{}", vocab, local))
}

fn modified(at: &DateTime<Utc>) -> Term {
    Term::Literal(Literal::typed(
        at.to_rfc3339_opts(SecondsFormat::Micros, true),
        ns::XSD_DATETIME,
    ))
}

/// Render a container as Turtle: its own types and modification time,
/// then one `ldp:contains` per child with the child's stat triples.
pub fn listing(url: &Url, container: &ResourceMetadata, children: &[ResourceMetadata]) -> String {
    let this = Term::iri(url.as_str());
    let rdf_type = Term::iri(ns::RDF_TYPE);
    let dc_modified = iri(ns::DCTERMS, "modified");

    let mut graph = Graph::new();
    for class in ["Container", "BasicContainer", "Resource"] {
        graph.insert(Triple::new(this.clone(), rdf_type.clone(), iri(ns::LDP, class)));
    }
    graph.insert(Triple::new(
        this.clone(),
        dc_modified.clone(),
        modified(&container.last_modified),
    ));

    for child in children {
        let name = child.path.name().unwrap_or_default();
        let relative = if child.is_container {
            format!("{}/", name)
        } else {
            name.to_string()
        };
        let Ok(child_url) = url.join(&relative) else {
            continue;
        };
        let child_term = Term::iri(child_url.as_str());
        graph.insert(Triple::new(this.clone(), iri(ns::LDP, "contains"), child_term.clone()));

        if child.is_container {
            graph.insert(Triple::new(
                child_term.clone(),
                rdf_type.clone(),
                iri(ns::LDP, "Container"),
            ));
        }
        graph.insert(Triple::new(child_term.clone(), rdf_type.clone(), iri(ns::LDP, "Resource")));
        graph.insert(Triple::new(
            child_term.clone(),
            dc_modified.clone(),
            modified(&child.last_modified),
        ));
        graph.insert(Triple::new(
            child_term,
            iri(ns::POSIX, "size"),
            Term::Literal(Literal::typed(child.size.to_string(), ns::XSD_INTEGER)),
        ));
    }

    write_turtle(&graph, url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ResourcePath;
    use crate::rdf::parse_turtle;

    fn meta(path: &str, size: u64) -> ResourceMetadata {
        let path = ResourcePath::parse(path).unwrap();
        ResourceMetadata {
            is_container: path.is_container(),
            content_type: "text/plain".into(),
            path,
            size,
            last_modified: Utc::now(),
        }
    }

    #[test]
    fn test_listing_parses_back() {
        let url = Url::parse("https://pod.example/docs/").unwrap();
        let turtle = listing(
            &url,
            &meta("/docs/", 0),
            &[meta("/docs/a.txt", 3), meta("/docs/sub/", 0)],
        );
        let graph = parse_turtle(&turtle, &url).unwrap();
        let this = Term::iri(url.as_str());
        let contains = format!("{}contains", ns::LDP);
        let children: Vec<_> = graph
            .objects(&this, &contains)
            .filter_map(Term::as_iri)
            .collect();
        assert_eq!(
            children,
            vec!["https://pod.example/docs/a.txt", "https://pod.example/docs/sub/"]
        );
        assert!(turtle.contains("<> a ldp:BasicContainer"));
    }

    #[test]
    fn test_empty_container_has_no_members() {
        let url = Url::parse("https://pod.example/").unwrap();
        let turtle = listing(&url, &meta("/", 0), &[]);
        assert!(!turtle.contains("contains"));
        assert!(turtle.contains("ldp:Container"));
    }
}
