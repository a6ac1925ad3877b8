use super::ns;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Literal {
    pub value: String,
    pub datatype: Option<String>,
    pub language: Option<String>,
}

impl Literal {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: None,
            language: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatype: Some(datatype.into()),
            language: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal(Literal),
    /// `?name`, only produced by the N3 parser.
    Variable(String),
    /// `{ ... }`, only produced by the N3 parser.
    Formula(Vec<Triple>),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn as_formula(&self) -> Option<&[Triple]> {
        match self {
            Term::Formula(triples) => Some(triples),
            _ => None,
        }
    }

    /// True if the term, or any term nested in a formula, is a variable.
    pub fn has_variables(&self) -> bool {
        match self {
            Term::Variable(_) => true,
            Term::Formula(triples) => triples.iter().any(Triple::has_variables),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn has_variables(&self) -> bool {
        self.subject.has_variables() || self.predicate.has_variables() || self.object.has_variables()
    }
}

/// An ordered, duplicate-free list of triples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    triples: Vec<Triple>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    pub fn contains(&self, triple: &Triple) -> bool {
        self.triples.contains(triple)
    }

    /// Insert a triple, returning false if it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        if self.contains(&triple) {
            return false;
        }
        self.triples.push(triple);
        true
    }

    /// Remove a triple, returning false if it was absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        match self.triples.iter().position(|t| t == triple) {
            Some(idx) => {
                self.triples.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Objects of every `(subject, predicate, ?)` triple.
    pub fn objects<'a>(
        &'a self,
        subject: &'a Term,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples.iter().filter_map(move |t| {
            (t.subject == *subject && t.predicate.as_iri() == Some(predicate)).then_some(&t.object)
        })
    }

    /// Subjects of every `(?, predicate, object)` triple.
    pub fn subjects<'a>(
        &'a self,
        predicate: &'a str,
        object: &'a Term,
    ) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples.iter().filter_map(move |t| {
            (t.predicate.as_iri() == Some(predicate) && t.object == *object).then_some(&t.subject)
        })
    }

    /// Subjects typed with `class` via `rdf:type`.
    pub fn instances_of<'a>(&'a self, class: &'a str) -> Vec<&'a Term> {
        self.triples
            .iter()
            .filter(|t| t.predicate.as_iri() == Some(ns::RDF_TYPE) && t.object.as_iri() == Some(class))
            .map(|t| &t.subject)
            .collect()
    }
}

impl FromIterator<Triple> for Graph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        let mut graph = Graph::new();
        for triple in iter {
            graph.insert(triple);
        }
        graph
    }
}

impl IntoIterator for Graph {
    type Item = Triple;
    type IntoIter = std::vec::IntoIter<Triple>;

    fn into_iter(self) -> Self::IntoIter {
        self.triples.into_iter()
    }
}
