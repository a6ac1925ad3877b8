use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use url::Url;

use crate::rdf::{ns, parse_n3, parse_turtle, write_turtle, Graph, Term, Triple};

/// Media type of `solid:InsertDeletePatch` bodies.
pub const N3_CONTENT_TYPE: &str = "text/n3";

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("invalid patch: {0}")]
    BadRequest(String),
    #[error("patch does not apply: {0}")]
    Conflict(String),
    #[error("cannot patch {0} documents")]
    UnsupportedMediaType(String),
}

/// Computes the new content of a document from a patch.
pub trait PatchEngine: std::fmt::Debug + Send + Sync {
    fn apply(
        &self,
        target: &Url,
        existing: &[u8],
        content_type: &str,
        patch: &[u8],
    ) -> Result<Bytes, PatchError>;
}

/// Applies `solid:InsertDeletePatch` documents to Turtle resources.
///
/// ```text
/// @prefix solid: <http://www.w3.org/ns/solid/terms#>.
/// _:patch a solid:InsertDeletePatch;
///   solid:deletes { <#note> <#text> "old" };
///   solid:inserts { <#note> <#text> "new" }.
/// ```
///
/// Conditions (`solid:where`) and variables are not supported.
#[derive(Debug, Default, Clone, Copy)]
pub struct N3PatchEngine;

fn solid(local: &str) -> String {
    format!("{}{}", ns::SOLID, local)
}

impl PatchEngine for N3PatchEngine {
    fn apply(
        &self,
        target: &Url,
        existing: &[u8],
        content_type: &str,
        patch: &[u8],
    ) -> Result<Bytes, PatchError> {
        if !matches!(content_type, "text/turtle" | "application/n-triples") && !existing.is_empty() {
            return Err(PatchError::UnsupportedMediaType(content_type.to_string()));
        }

        let text = std::str::from_utf8(existing)
            .map_err(|_| PatchError::Conflict("target is not UTF-8".into()))?;
        let mut graph = parse_turtle(text, target)
            .map_err(|e| PatchError::Conflict(format!("target does not parse: {}", e)))?;

        let patch_text = std::str::from_utf8(patch)
            .map_err(|_| PatchError::BadRequest("patch is not UTF-8".into()))?;
        let patch_graph =
            parse_n3(patch_text, target).map_err(|e| PatchError::BadRequest(e.to_string()))?;

        let (inserts, deletes) = operations(&patch_graph)?;

        for triple in &deletes {
            if !graph.remove(triple) {
                return Err(PatchError::Conflict(
                    "a triple to delete is not in the document".into(),
                ));
            }
        }
        for triple in relabel_blanks(inserts, &graph) {
            graph.insert(triple);
        }

        Ok(Bytes::from(write_turtle(&graph, target)))
    }
}

/// Pull the inserted and deleted triples out of a parsed patch.
fn operations(patch: &Graph) -> Result<(Vec<Triple>, Vec<Triple>), PatchError> {
    let inserts_predicate = solid("inserts");
    let deletes_predicate = solid("deletes");
    let where_predicate = solid("where");

    let mut inserts = Vec::new();
    let mut deletes = Vec::new();
    let mut found = false;
    for triple in patch.iter() {
        let Some(predicate) = triple.predicate.as_iri() else {
            continue;
        };
        let into = if predicate == inserts_predicate {
            &mut inserts
        } else if predicate == deletes_predicate {
            &mut deletes
        } else if predicate == where_predicate {
            match triple.object.as_formula() {
                Some([]) => continue,
                _ => {
                    return Err(PatchError::BadRequest(
                        "solid:where conditions are not supported".into(),
                    ))
                }
            }
        } else {
            continue;
        };

        let formula = triple.object.as_formula().ok_or_else(|| {
            PatchError::BadRequest(format!("{} expects a formula", predicate))
        })?;
        if formula.iter().any(Triple::has_variables) {
            return Err(PatchError::BadRequest("variables are not supported".into()));
        }
        into.extend(formula.iter().cloned());
        found = true;
    }

    if !found {
        return Err(PatchError::BadRequest(
            "patch has neither solid:inserts nor solid:deletes".into(),
        ));
    }
    Ok((inserts, deletes))
}

/// Blank nodes from the patch are fresh; keep them apart from the
/// document's own.
fn relabel_blanks(triples: Vec<Triple>, graph: &Graph) -> Vec<Triple> {
    let mut in_use: HashSet<String> = HashSet::new();
    for triple in graph.iter() {
        for term in [&triple.subject, &triple.object] {
            if let Term::Blank(label) = term {
                in_use.insert(label.clone());
            }
        }
    }

    let mut renamed: HashMap<String, String> = HashMap::new();
    let mut counter = 0usize;
    let mut rename = |term: Term| -> Term {
        let Term::Blank(label) = term else {
            return term;
        };
        let fresh = renamed.entry(label).or_insert_with(|| loop {
            counter += 1;
            let candidate = format!("p{}", counter);
            if !in_use.contains(&candidate) {
                break candidate;
            }
        });
        Term::Blank(fresh.clone())
    };

    triples
        .into_iter()
        .map(|t| Triple::new(rename(t.subject), t.predicate, rename(t.object)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"@prefix dc: <http://purl.org/dc/terms/>.
<#note> dc:title "Shopping"; dc:description "milk" ."#;

    fn target() -> Url {
        Url::parse("https://pod.example/notes.ttl").unwrap()
    }

    fn apply(patch: &str) -> Result<Graph, PatchError> {
        let out = N3PatchEngine.apply(&target(), DOC.as_bytes(), "text/turtle", patch.as_bytes())?;
        Ok(parse_turtle(std::str::from_utf8(&out).unwrap(), &target()).unwrap())
    }

    fn title(value: &str) -> Triple {
        Triple::new(
            Term::iri("https://pod.example/notes.ttl#note"),
            Term::iri("http://purl.org/dc/terms/title"),
            Term::Literal(crate::rdf::Literal::plain(value)),
        )
    }

    #[test]
    fn test_insert_and_delete() {
        let graph = apply(
            r#"@prefix solid: <http://www.w3.org/ns/solid/terms#>.
               @prefix dc: <http://purl.org/dc/terms/>.
               _:p a solid:InsertDeletePatch;
                 solid:deletes { <#note> dc:title "Shopping" };
                 solid:inserts { <#note> dc:title "Groceries" }."#,
        )
        .unwrap();
        assert!(graph.contains(&title("Groceries")));
        assert!(!graph.contains(&title("Shopping")));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_missing_delete_conflicts() {
        let result = apply(
            r#"@prefix solid: <http://www.w3.org/ns/solid/terms#>.
               @prefix dc: <http://purl.org/dc/terms/>.
               _:p solid:deletes { <#note> dc:title "Nope" }."#,
        );
        assert!(matches!(result, Err(PatchError::Conflict(_))));
    }

    #[test]
    fn test_unsupported_patches() {
        let with_where = r#"@prefix solid: <http://www.w3.org/ns/solid/terms#>.
               @prefix dc: <http://purl.org/dc/terms/>.
               _:p solid:where { ?n dc:title "Shopping" };
                 solid:inserts { ?n dc:title "Groceries" }."#;
        assert!(matches!(apply(with_where), Err(PatchError::BadRequest(_))));

        let nothing = r#"<#a> <#b> <#c> ."#;
        assert!(matches!(apply(nothing), Err(PatchError::BadRequest(_))));

        assert!(matches!(apply("this is { not n3"), Err(PatchError::BadRequest(_))));

        assert!(matches!(
            N3PatchEngine.apply(&target(), b"\x89PNG", "image/png", b""),
            Err(PatchError::UnsupportedMediaType(_))
        ));
    }

    #[test]
    fn test_inserted_blank_nodes_stay_distinct() {
        let doc = "<#a> <#knows> [ <#name> \"x\" ] .";
        let patch = r#"@prefix solid: <http://www.w3.org/ns/solid/terms#>.
            _:p solid:inserts { <#a> <#knows> [ <#name> "y" ] }."#;
        let out = N3PatchEngine
            .apply(&target(), doc.as_bytes(), "text/turtle", patch.as_bytes())
            .unwrap();
        let graph = parse_turtle(std::str::from_utf8(&out).unwrap(), &target()).unwrap();
        let subject = Term::iri("https://pod.example/notes.ttl#a");
        let friends: HashSet<_> = graph
            .objects(&subject, "https://pod.example/notes.ttl#knows")
            .collect();
        assert_eq!(friends.len(), 2);
    }
}
