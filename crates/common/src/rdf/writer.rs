use std::collections::BTreeSet;
use std::fmt::Write as _;

use url::Url;

use super::ns;
use super::term::{Graph, Literal, Term, Triple};

const PREFIXES: &[(&str, &str)] = &[
    ("acl", ns::ACL),
    ("dcterms", ns::DCTERMS),
    ("foaf", ns::FOAF),
    ("ldp", ns::LDP),
    ("posix", ns::POSIX),
    ("solid", ns::SOLID),
    ("vcard", ns::VCARD),
    ("xsd", ns::XSD),
];

/// Serialize a graph as Turtle, one triple per line.
///
/// IRIs under `base` are written relative to it, well-known vocabularies
/// get prefixed names and `rdf:type` is written as `a`.
pub fn write_turtle(graph: &Graph, base: &Url) -> String {
    let writer = Writer { base: base.as_str() };

    let mut used = BTreeSet::new();
    for triple in graph.iter() {
        writer.collect_prefixes(triple, &mut used);
    }

    let mut out = String::new();
    for (prefix, iri) in PREFIXES {
        if used.contains(prefix) {
            let _ = writeln!(out, "@prefix {}: <{}>.", prefix, iri);
        }
    }
    if !used.is_empty() {
        out.push('\n');
    }
    for triple in graph.iter() {
        writer.triple(triple, &mut out);
        out.push_str(" .\n");
    }
    out
}

struct Writer<'a> {
    base: &'a str,
}

impl Writer<'_> {
    fn collect_prefixes(&self, triple: &Triple, used: &mut BTreeSet<&'static str>) {
        for (position, term) in [&triple.subject, &triple.predicate, &triple.object]
            .into_iter()
            .enumerate()
        {
            match term {
                Term::Iri(iri) if !(position == 1 && iri == ns::RDF_TYPE) => {
                    if let Some((prefix, _)) = prefixed(iri) {
                        used.insert(prefix);
                    }
                }
                Term::Literal(Literal {
                    datatype: Some(dt), ..
                }) => {
                    if let Some((prefix, _)) = prefixed(dt) {
                        used.insert(prefix);
                    }
                }
                Term::Formula(triples) => {
                    for t in triples {
                        self.collect_prefixes(t, used);
                    }
                }
                _ => {}
            }
        }
    }

    fn triple(&self, triple: &Triple, out: &mut String) {
        self.term(&triple.subject, out);
        out.push(' ');
        match &triple.predicate {
            Term::Iri(iri) if iri == ns::RDF_TYPE => out.push('a'),
            other => self.term(other, out),
        }
        out.push(' ');
        self.term(&triple.object, out);
    }

    fn term(&self, term: &Term, out: &mut String) {
        match term {
            Term::Iri(iri) => self.iri(iri, out),
            Term::Blank(label) => {
                let _ = write!(out, "_:{}", label);
            }
            Term::Variable(name) => {
                let _ = write!(out, "?{}", name);
            }
            Term::Literal(literal) => self.literal(literal, out),
            Term::Formula(triples) => {
                out.push_str("{ ");
                for (i, t) in triples.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" . ");
                    }
                    self.triple(t, out);
                }
                out.push_str(" }");
            }
        }
    }

    fn iri(&self, iri: &str, out: &mut String) {
        if let Some((prefix, local)) = prefixed(iri) {
            let _ = write!(out, "{}:{}", prefix, local);
            return;
        }
        match iri.strip_prefix(self.base) {
            Some(rest)
                if rest.is_empty()
                    || rest.starts_with('#')
                    || (self.base.ends_with('/')
                        && !rest.starts_with('/')
                        && !rest.contains(':')) =>
            {
                let _ = write!(out, "<{}>", rest);
            }
            _ => {
                let _ = write!(out, "<{}>", iri);
            }
        }
    }

    fn literal(&self, literal: &Literal, out: &mut String) {
        out.push('"');
        for c in literal.value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c => out.push(c),
            }
        }
        out.push('"');
        if let Some(lang) = &literal.language {
            let _ = write!(out, "@{}", lang);
        } else if let Some(dt) = &literal.datatype {
            if dt != ns::XSD_STRING {
                out.push_str("^^");
                self.iri(dt, out);
            }
        }
    }
}

fn prefixed(iri: &str) -> Option<(&'static str, &str)> {
    PREFIXES.iter().find_map(|(prefix, ns)| {
        let local = iri.strip_prefix(ns)?;
        let simple = !local.is_empty()
            && local
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        simple.then_some((*prefix, local))
    })
}
