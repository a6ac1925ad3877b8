//! A small Turtle parser, with the N3 extensions (formulas and
//! variables) needed to read Solid N3 patches.
//!
//! Supported: `@prefix`, `@base`, `PREFIX`, `BASE`, IRIs resolved
//! against the base, prefixed names, `a`, predicate and object lists,
//! comments, short and long string literals with escapes, language tags,
//! datatypes, integers, decimals, booleans, blank node labels and
//! `[ ... ]` property lists. Collections are rejected.

use std::collections::HashMap;

use url::Url;

use super::ns;
use super::term::{Graph, Literal, Term, Triple};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("turtle syntax error at line {line}: {message}")]
pub struct TurtleError {
    pub line: usize,
    pub message: String,
}

impl TurtleError {
    fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse a Turtle document, resolving relative IRIs against `base`.
pub fn parse_turtle(input: &str, base: &Url) -> Result<Graph, TurtleError> {
    Parser::new(input, base, false)?.parse()
}

/// Parse an N3 document. Formulas and variables are allowed.
pub fn parse_n3(input: &str, base: &Url) -> Result<Graph, TurtleError> {
    Parser::new(input, base, true)?.parse()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Iri(String),
    PrefixedName(String, String),
    Blank(String),
    Variable(String),
    String(String),
    LangTag(String),
    Number(String, bool),
    Bool(bool),
    A,
    PrefixDirective,
    BaseDirective,
    SparqlPrefix,
    SparqlBase,
    DoubleCaret,
    Dot,
    Semicolon,
    Comma,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':' | '%')
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, TurtleError> {
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let mut i = 0;
    let mut line = 1;
    let mut out = Vec::new();

    while i < len {
        let c = chars[i];
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '#' => {
                while i < len && chars[i] != '\n' {
                    i += 1;
                }
            }
            '<' => {
                i += 1;
                let start = i;
                while i < len && chars[i] != '>' {
                    if chars[i].is_whitespace() {
                        return Err(TurtleError::new(line, "whitespace inside IRI"));
                    }
                    i += 1;
                }
                if i >= len {
                    return Err(TurtleError::new(line, "unterminated IRI"));
                }
                out.push((Token::Iri(chars[start..i].iter().collect()), line));
                i += 1;
            }
            '"' | '\'' => {
                let start_line = line;
                let (value, next) = read_string(&chars, i, &mut line)?;
                out.push((Token::String(value), start_line));
                i = next;
            }
            '@' => {
                i += 1;
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '-') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.as_str() {
                    "prefix" => Token::PrefixDirective,
                    "base" => Token::BaseDirective,
                    "" => return Err(TurtleError::new(line, "dangling '@'")),
                    _ => Token::LangTag(word),
                };
                out.push((token, line));
            }
            '^' => {
                if i + 1 < len && chars[i + 1] == '^' {
                    out.push((Token::DoubleCaret, line));
                    i += 2;
                } else {
                    return Err(TurtleError::new(line, "expected '^^'"));
                }
            }
            '_' if i + 1 < len && chars[i + 1] == ':' => {
                i += 2;
                let start = i;
                while i < len && is_name_char(chars[i]) && chars[i] != ':' {
                    i += 1;
                }
                while i > start && chars[i - 1] == '.' {
                    i -= 1;
                }
                if i == start {
                    return Err(TurtleError::new(line, "empty blank node label"));
                }
                out.push((Token::Blank(chars[start..i].iter().collect()), line));
            }
            '?' => {
                i += 1;
                let start = i;
                while i < len && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                if i == start {
                    return Err(TurtleError::new(line, "empty variable name"));
                }
                out.push((Token::Variable(chars[start..i].iter().collect()), line));
            }
            '.' => {
                out.push((Token::Dot, line));
                i += 1;
            }
            ';' => {
                out.push((Token::Semicolon, line));
                i += 1;
            }
            ',' => {
                out.push((Token::Comma, line));
                i += 1;
            }
            '[' => {
                out.push((Token::LBracket, line));
                i += 1;
            }
            ']' => {
                out.push((Token::RBracket, line));
                i += 1;
            }
            '{' => {
                out.push((Token::LBrace, line));
                i += 1;
            }
            '}' => {
                out.push((Token::RBrace, line));
                i += 1;
            }
            '(' => {
                out.push((Token::LParen, line));
                i += 1;
            }
            c if c.is_ascii_digit()
                || ((c == '+' || c == '-') && i + 1 < len && chars[i + 1].is_ascii_digit()) =>
            {
                let start = i;
                i += 1;
                while i < len && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let mut decimal = false;
                if i + 1 < len && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
                    decimal = true;
                    i += 1;
                    while i < len && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                out.push((Token::Number(chars[start..i].iter().collect(), decimal), line));
            }
            c if c.is_alphabetic() || c == ':' => {
                let start = i;
                while i < len && is_name_char(chars[i]) {
                    i += 1;
                }
                // a local name never ends with '.', that is the statement terminator
                while i > start && chars[i - 1] == '.' {
                    i -= 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.split_once(':') {
                    Some((prefix, local)) => Token::PrefixedName(prefix.to_string(), local.to_string()),
                    None => match word.as_str() {
                        "a" => Token::A,
                        "true" => Token::Bool(true),
                        "false" => Token::Bool(false),
                        w if w.eq_ignore_ascii_case("prefix") => Token::SparqlPrefix,
                        w if w.eq_ignore_ascii_case("base") => Token::SparqlBase,
                        _ => {
                            return Err(TurtleError::new(line, format!("unexpected word '{}'", word)))
                        }
                    },
                };
                out.push((token, line));
            }
            other => {
                return Err(TurtleError::new(line, format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(out)
}

fn read_string(chars: &[char], start: usize, line: &mut usize) -> Result<(String, usize), TurtleError> {
    let len = chars.len();
    let quote = chars[start];
    let long = start + 2 < len && chars[start + 1] == quote && chars[start + 2] == quote;
    let mut i = if long { start + 3 } else { start + 1 };
    let mut value = String::new();

    loop {
        if i >= len {
            return Err(TurtleError::new(*line, "unterminated string literal"));
        }
        let c = chars[i];
        if long {
            if c == quote && i + 2 < len && chars[i + 1] == quote && chars[i + 2] == quote {
                return Ok((value, i + 3));
            }
        } else if c == quote {
            return Ok((value, i + 1));
        }
        match c {
            '\\' => {
                let (ch, next) = read_escape(chars, i + 1, *line)?;
                value.push(ch);
                i = next;
            }
            '\n' if !long => return Err(TurtleError::new(*line, "newline in short string literal")),
            '\n' => {
                *line += 1;
                value.push(c);
                i += 1;
            }
            _ => {
                value.push(c);
                i += 1;
            }
        }
    }
}

fn read_escape(chars: &[char], i: usize, line: usize) -> Result<(char, usize), TurtleError> {
    let Some(&c) = chars.get(i) else {
        return Err(TurtleError::new(line, "dangling escape"));
    };
    let simple = match c {
        't' => Some('\t'),
        'n' => Some('\n'),
        'r' => Some('\r'),
        'b' => Some('\u{8}'),
        'f' => Some('\u{c}'),
        '"' => Some('"'),
        '\'' => Some('\''),
        '\\' => Some('\\'),
        _ => None,
    };
    if let Some(ch) = simple {
        return Ok((ch, i + 1));
    }
    let width = match c {
        'u' => 4,
        'U' => 8,
        _ => return Err(TurtleError::new(line, format!("unknown escape '\\{}'", c))),
    };
    if i + 1 + width > chars.len() {
        return Err(TurtleError::new(line, "truncated unicode escape"));
    }
    let hex: String = chars[i + 1..i + 1 + width].iter().collect();
    let code = u32::from_str_radix(&hex, 16)
        .map_err(|_| TurtleError::new(line, format!("bad unicode escape '{}'", hex)))?;
    let ch = char::from_u32(code)
        .ok_or_else(|| TurtleError::new(line, format!("invalid code point {}", hex)))?;
    Ok((ch, i + 1 + width))
}

/// Deepest allowed nesting of `[ ]` and `{ }`.
pub const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
    base: Url,
    prefixes: HashMap<String, String>,
    blank_counter: usize,
    n3: bool,
    out: Vec<Triple>,
}

impl Parser {
    fn new(input: &str, base: &Url, n3: bool) -> Result<Self, TurtleError> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            depth: 0,
            base: base.clone(),
            prefixes: HashMap::new(),
            blank_counter: 0,
            n3,
            out: Vec::new(),
        })
    }

    fn parse(mut self) -> Result<Graph, TurtleError> {
        while self.peek().is_some() {
            self.statement()?;
        }
        Ok(self.out.into_iter().collect())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn next(&mut self) -> Result<Token, TurtleError> {
        let token = self
            .tokens
            .get(self.pos)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| TurtleError::new(self.line(), "unexpected end of input"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Token) -> Result<(), TurtleError> {
        let line = self.line();
        let got = self.next()?;
        if got == expected {
            Ok(())
        } else {
            Err(TurtleError::new(line, format!("expected {:?}, found {:?}", expected, got)))
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T, TurtleError> {
        Err(TurtleError::new(self.line(), message))
    }

    fn statement(&mut self) -> Result<(), TurtleError> {
        match self.peek() {
            Some(Token::PrefixDirective) => {
                self.pos += 1;
                self.prefix_decl()?;
                self.expect(Token::Dot)
            }
            Some(Token::BaseDirective) => {
                self.pos += 1;
                self.base_decl()?;
                self.expect(Token::Dot)
            }
            Some(Token::SparqlPrefix) => {
                self.pos += 1;
                self.prefix_decl()
            }
            Some(Token::SparqlBase) => {
                self.pos += 1;
                self.base_decl()
            }
            _ => {
                self.triples()?;
                self.expect(Token::Dot)
            }
        }
    }

    fn prefix_decl(&mut self) -> Result<(), TurtleError> {
        let line = self.line();
        let prefix = match self.next()? {
            Token::PrefixedName(prefix, local) if local.is_empty() => prefix,
            other => {
                return Err(TurtleError::new(line, format!("expected prefix name, found {:?}", other)))
            }
        };
        let iri = match self.next()? {
            Token::Iri(raw) => self.resolve(&raw)?,
            other => return Err(TurtleError::new(line, format!("expected IRI, found {:?}", other))),
        };
        self.prefixes.insert(prefix, iri);
        Ok(())
    }

    fn base_decl(&mut self) -> Result<(), TurtleError> {
        let line = self.line();
        match self.next()? {
            Token::Iri(raw) => {
                let resolved = self.resolve(&raw)?;
                self.base = Url::parse(&resolved)
                    .map_err(|e| TurtleError::new(line, format!("bad base IRI: {}", e)))?;
                Ok(())
            }
            other => Err(TurtleError::new(line, format!("expected IRI, found {:?}", other))),
        }
    }

    fn resolve(&self, raw: &str) -> Result<String, TurtleError> {
        self.base
            .join(raw)
            .map(String::from)
            .map_err(|e| TurtleError::new(self.line(), format!("bad IRI <{}>: {}", raw, e)))
    }

    fn expand(&self, prefix: &str, local: &str) -> Result<String, TurtleError> {
        match self.prefixes.get(prefix) {
            Some(ns) => Ok(format!("{}{}", ns, local)),
            None => self.error(format!("undeclared prefix '{}:'", prefix)),
        }
    }

    fn fresh_blank(&mut self) -> Term {
        self.blank_counter += 1;
        Term::Blank(format!("b{}", self.blank_counter))
    }

    fn triples(&mut self) -> Result<(), TurtleError> {
        if self.peek() == Some(&Token::LBracket) {
            let subject = self.blank_property_list()?;
            // `[ ... ] .` is a complete statement on its own
            if !matches!(self.peek(), Some(Token::Dot) | Some(Token::RBrace) | None) {
                self.predicate_object_list(&subject)?;
            }
            return Ok(());
        }
        let subject = self.subject()?;
        self.predicate_object_list(&subject)
    }

    fn predicate_object_list(&mut self, subject: &Term) -> Result<(), TurtleError> {
        loop {
            let predicate = self.verb()?;
            self.object_list(subject, &predicate)?;
            if self.peek() != Some(&Token::Semicolon) {
                return Ok(());
            }
            while self.peek() == Some(&Token::Semicolon) {
                self.pos += 1;
            }
            if matches!(
                self.peek(),
                Some(Token::Dot) | Some(Token::RBracket) | Some(Token::RBrace) | None
            ) {
                return Ok(());
            }
        }
    }

    fn object_list(&mut self, subject: &Term, predicate: &Term) -> Result<(), TurtleError> {
        loop {
            let object = self.object()?;
            self.out
                .push(Triple::new(subject.clone(), predicate.clone(), object));
            if self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                continue;
            }
            return Ok(());
        }
    }

    fn verb(&mut self) -> Result<Term, TurtleError> {
        match self.peek() {
            Some(Token::A) => {
                self.pos += 1;
                Ok(Term::iri(ns::RDF_TYPE))
            }
            Some(Token::Variable(_)) if self.n3 => self.variable(),
            _ => self.iri(),
        }
    }

    fn iri(&mut self) -> Result<Term, TurtleError> {
        let line = self.line();
        match self.next()? {
            Token::Iri(raw) => Ok(Term::Iri(self.resolve(&raw)?)),
            Token::PrefixedName(prefix, local) => Ok(Term::Iri(self.expand(&prefix, &local)?)),
            other => Err(TurtleError::new(line, format!("expected IRI, found {:?}", other))),
        }
    }

    fn variable(&mut self) -> Result<Term, TurtleError> {
        let line = self.line();
        match self.next()? {
            Token::Variable(name) if self.n3 => Ok(Term::Variable(name)),
            other => Err(TurtleError::new(line, format!("unexpected {:?}", other))),
        }
    }

    fn subject(&mut self) -> Result<Term, TurtleError> {
        match self.peek() {
            Some(Token::Iri(_)) | Some(Token::PrefixedName(..)) => self.iri(),
            Some(Token::Blank(_)) => match self.next()? {
                Token::Blank(label) => Ok(Term::Blank(label)),
                _ => unreachable!(),
            },
            Some(Token::Variable(_)) => self.variable(),
            Some(Token::LBrace) => self.formula(),
            Some(Token::LParen) => self.error("collections are not supported"),
            other => {
                let found = format!("{:?}", other);
                self.error(format!("expected subject, found {}", found))
            }
        }
    }

    fn object(&mut self) -> Result<Term, TurtleError> {
        match self.peek() {
            Some(Token::Iri(_)) | Some(Token::PrefixedName(..)) => self.iri(),
            Some(Token::Blank(_)) => match self.next()? {
                Token::Blank(label) => Ok(Term::Blank(label)),
                _ => unreachable!(),
            },
            Some(Token::String(_)) => self.literal(),
            Some(Token::Number(..)) => match self.next()? {
                Token::Number(value, true) => Ok(Term::Literal(Literal::typed(value, ns::XSD_DECIMAL))),
                Token::Number(value, false) => Ok(Term::Literal(Literal::typed(value, ns::XSD_INTEGER))),
                _ => unreachable!(),
            },
            Some(Token::Bool(_)) => match self.next()? {
                Token::Bool(b) => Ok(Term::Literal(Literal::typed(b.to_string(), ns::XSD_BOOLEAN))),
                _ => unreachable!(),
            },
            Some(Token::LBracket) => self.blank_property_list(),
            Some(Token::LBrace) => self.formula(),
            Some(Token::Variable(_)) => self.variable(),
            Some(Token::LParen) => self.error("collections are not supported"),
            other => {
                let found = format!("{:?}", other);
                self.error(format!("expected object, found {}", found))
            }
        }
    }

    fn literal(&mut self) -> Result<Term, TurtleError> {
        let value = match self.next()? {
            Token::String(value) => value,
            _ => unreachable!(),
        };
        match self.peek() {
            Some(Token::LangTag(_)) => match self.next()? {
                Token::LangTag(tag) => Ok(Term::Literal(Literal {
                    value,
                    datatype: None,
                    language: Some(tag.to_ascii_lowercase()),
                })),
                _ => unreachable!(),
            },
            Some(Token::DoubleCaret) => {
                self.pos += 1;
                let datatype = match self.iri()? {
                    Term::Iri(iri) => iri,
                    _ => unreachable!(),
                };
                Ok(Term::Literal(Literal::typed(value, datatype)))
            }
            _ => Ok(Term::Literal(Literal::plain(value))),
        }
    }

    fn nest(&mut self) -> Result<(), TurtleError> {
        if self.depth >= MAX_NESTING {
            return self.error(format!("nesting deeper than {} levels", MAX_NESTING));
        }
        self.depth += 1;
        Ok(())
    }

    fn blank_property_list(&mut self) -> Result<Term, TurtleError> {
        self.expect(Token::LBracket)?;
        let node = self.fresh_blank();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(node);
        }
        self.nest()?;
        self.predicate_object_list(&node)?;
        self.expect(Token::RBracket)?;
        self.depth -= 1;
        Ok(node)
    }

    fn formula(&mut self) -> Result<Term, TurtleError> {
        if !self.n3 {
            return self.error("formulas are only allowed in N3");
        }
        self.expect(Token::LBrace)?;
        self.nest()?;
        let outer = std::mem::take(&mut self.out);
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                self.out = outer;
                return self.error("unterminated formula");
            }
            self.triples()?;
            match self.peek() {
                Some(Token::Dot) => self.pos += 1,
                Some(Token::RBrace) => {}
                _ => {
                    self.out = outer;
                    return self.error("expected '.' or '}' in formula");
                }
            }
        }
        self.pos += 1;
        self.depth -= 1;
        let inner = std::mem::replace(&mut self.out, outer);
        Ok(Term::Formula(inner))
    }
}
