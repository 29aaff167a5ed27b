//! Core fact model: identifiers, literals, facts and fact sets.
//!
//! A [Fact] is an immutable (subject, predicate, object) value. Subjects and
//! predicates are absolute identifiers ([Iri]); objects are either
//! identifiers or typed [Literal]s. Facts live in [TripleSet]s with set
//! semantics and structural equality. Provenance is deliberately not part of
//! the fact value: the same fact parsed from two places is the same fact.

use std::{
    collections::BTreeSet,
    fmt,
    ops::{BitAnd, Sub},
};

use serde::{Deserialize, Serialize};

use crate::error::GraphdownError;

/// An absolute identifier (IRI or URN) used for subjects, predicates, and
/// node-valued objects.
///
/// Construction only checks for a scheme-qualified shape. Full syntactic
/// validation is available through [Iri::parse_checked] for callers that
/// need it at trust boundaries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Iri(String);

impl Iri {
    /// Wrap a scheme-qualified identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, GraphdownError> {
        let value = value.into();
        if !is_scheme_qualified(&value) {
            return Err(GraphdownError::Codec(format!(
                "'{value}' is not an absolute identifier (missing scheme)"
            )));
        }
        Ok(Iri(value))
    }

    /// Wrap without validation. For vocabulary constants and other
    /// identifiers whose shape is guaranteed by construction.
    pub fn new_unchecked(value: impl Into<String>) -> Self {
        Iri(value.into())
    }

    /// Full syntactic validation through the `url` crate. URNs and other
    /// non-hierarchical schemes are accepted.
    pub fn parse_checked(value: &str) -> Result<Self, GraphdownError> {
        url::Url::parse(value)?;
        Ok(Iri(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier extended with a `#fragment`, used for subjects scoped
    /// inside a document (nested mappings, embedded blocks).
    pub fn with_fragment(&self, fragment: &str) -> Iri {
        Iri(format!("{}#{}", self.0, fragment))
    }

    /// Whether this identifier is scoped inside `parent` via a fragment.
    pub fn is_scoped_under(&self, parent: &Iri) -> bool {
        self.0
            .strip_prefix(parent.as_str())
            .is_some_and(|rest| rest.starts_with('#'))
    }

    /// The tail segment after the last `#`, `/` or `:`, or the whole
    /// identifier when none is present.
    pub fn local_name(&self) -> &str {
        let split = self.0.rfind(['#', '/', ':']).map(|i| i + 1).unwrap_or(0);
        &self.0[split..]
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// True when `value` starts with an RFC 3986 scheme followed by a colon.
pub fn is_scheme_qualified(value: &str) -> bool {
    let Some(colon) = value.find(':') else {
        return false;
    };
    let scheme = &value[..colon];
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// The closed set of literal value kinds the document dialects can express.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    /// Language-tagged text, e.g. `"hello"@en`. The payload is the tag.
    LangText(String),
}

/// A typed literal value. Equality is structural over the lexical form and
/// the kind, matching RDF literal identity: `"2.50"` and `"2.5"` as decimals
/// are distinct literals.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Literal {
    lexeme: String,
    kind: LiteralKind,
}

impl Literal {
    pub fn text(lexeme: impl Into<String>) -> Self {
        Literal {
            lexeme: lexeme.into(),
            kind: LiteralKind::Text,
        }
    }

    pub fn integer(value: i64) -> Self {
        Literal {
            lexeme: value.to_string(),
            kind: LiteralKind::Integer,
        }
    }

    /// An integer literal keeping an already-validated lexical form.
    pub fn integer_lexeme(lexeme: impl Into<String>) -> Self {
        Literal {
            lexeme: lexeme.into(),
            kind: LiteralKind::Integer,
        }
    }

    pub fn decimal(value: f64) -> Self {
        Literal {
            lexeme: value.to_string(),
            kind: LiteralKind::Decimal,
        }
    }

    pub fn decimal_lexeme(lexeme: impl Into<String>) -> Self {
        Literal {
            lexeme: lexeme.into(),
            kind: LiteralKind::Decimal,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Literal {
            lexeme: value.to_string(),
            kind: LiteralKind::Boolean,
        }
    }

    /// A calendar date in `YYYY-MM-DD` form. The caller is expected to have
    /// checked the shape with [is_date_lexeme].
    pub fn date(lexeme: impl Into<String>) -> Self {
        Literal {
            lexeme: lexeme.into(),
            kind: LiteralKind::Date,
        }
    }

    pub fn lang_text(lexeme: impl Into<String>, tag: impl Into<String>) -> Self {
        Literal {
            lexeme: lexeme.into(),
            kind: LiteralKind::LangText(tag.into()),
        }
    }

    pub fn lexeme(&self) -> &str {
        &self.lexeme
    }

    pub fn kind(&self) -> &LiteralKind {
        &self.kind
    }

    pub fn as_integer(&self) -> Option<i64> {
        matches!(self.kind, LiteralKind::Integer)
            .then(|| self.lexeme.parse().ok())
            .flatten()
    }

    pub fn as_decimal(&self) -> Option<f64> {
        matches!(self.kind, LiteralKind::Integer | LiteralKind::Decimal)
            .then(|| self.lexeme.parse().ok())
            .flatten()
    }

    pub fn as_boolean(&self) -> Option<bool> {
        matches!(self.kind, LiteralKind::Boolean)
            .then(|| self.lexeme.parse().ok())
            .flatten()
    }

    pub fn language(&self) -> Option<&str> {
        match &self.kind {
            LiteralKind::LangText(tag) => Some(tag),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            LiteralKind::Text => write!(f, "\"{}\"", self.lexeme),
            LiteralKind::LangText(tag) => write!(f, "\"{}\"@{}", self.lexeme, tag),
            LiteralKind::Date => write!(f, "\"{}\"^^date", self.lexeme),
            _ => write!(f, "{}", self.lexeme),
        }
    }
}

/// Shape check for `YYYY-MM-DD` date lexemes, including month/day ranges.
pub fn is_date_lexeme(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| {
        s[r.clone()]
            .bytes()
            .all(|b| b.is_ascii_digit())
            .then(|| s[r].parse::<u32>().ok())
            .flatten()
    };
    let (Some(_year), Some(month), Some(day)) = (digits(0..4), digits(5..7), digits(8..10)) else {
        return false;
    };
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

/// The object position of a fact: an identifier or a typed literal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Term {
    Node(Iri),
    Value(Literal),
}

impl Term {
    pub fn node(iri: Iri) -> Self {
        Term::Node(iri)
    }

    pub fn text(lexeme: impl Into<String>) -> Self {
        Term::Value(Literal::text(lexeme))
    }

    pub fn integer(value: i64) -> Self {
        Term::Value(Literal::integer(value))
    }

    pub fn as_node(&self) -> Option<&Iri> {
        match self {
            Term::Node(iri) => Some(iri),
            Term::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Literal> {
        match self {
            Term::Node(_) => None,
            Term::Value(lit) => Some(lit),
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Term::Node(_))
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Node(iri)
    }
}

impl From<Literal> for Term {
    fn from(lit: Literal) -> Self {
        Term::Value(lit)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Node(iri) => write!(f, "<{iri}>"),
            Term::Value(lit) => write!(f, "{lit}"),
        }
    }
}

/// One immutable statement about a subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fact {
    pub subject: Iri,
    pub predicate: Iri,
    pub object: Term,
}

impl Fact {
    pub fn new(subject: Iri, predicate: Iri, object: impl Into<Term>) -> Self {
        Fact {
            subject,
            predicate,
            object: object.into(),
        }
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}> <{}> {}", self.subject, self.predicate, self.object)
    }
}

/// A wildcard match over facts. `None` positions match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactPattern {
    pub subject: Option<Iri>,
    pub predicate: Option<Iri>,
    pub object: Option<Term>,
}

impl FactPattern {
    pub fn any() -> Self {
        FactPattern::default()
    }

    pub fn with_subject(mut self, subject: Iri) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn with_predicate(mut self, predicate: Iri) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_object(mut self, object: impl Into<Term>) -> Self {
        self.object = Some(object.into());
        self
    }

    pub fn matches(&self, fact: &Fact) -> bool {
        self.subject.as_ref().is_none_or(|s| *s == fact.subject)
            && self.predicate.as_ref().is_none_or(|p| *p == fact.predicate)
            && self.object.as_ref().is_none_or(|o| *o == fact.object)
    }
}

/// An ordered set of facts. Iteration follows the facts' total order, which
/// keeps downstream output stable without extra sorting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripleSet(BTreeSet<Fact>);

impl TripleSet {
    pub fn new() -> Self {
        TripleSet::default()
    }

    /// Insert a fact. Returns false when it was already present.
    pub fn insert(&mut self, fact: Fact) -> bool {
        self.0.insert(fact)
    }

    /// Remove a fact. Returns false when it was absent.
    pub fn remove(&mut self, fact: &Fact) -> bool {
        self.0.remove(fact)
    }

    pub fn contains(&self, fact: &Fact) -> bool {
        self.0.contains(fact)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fact> {
        self.0.iter()
    }

    /// All facts with the given subject.
    pub fn filter_subject(&self, subject: &Iri) -> TripleSet {
        TripleSet(
            self.0
                .iter()
                .filter(|f| f.subject == *subject)
                .cloned()
                .collect(),
        )
    }

    /// All facts matching the pattern, in set order.
    pub fn matching<'a>(&'a self, pattern: &'a FactPattern) -> impl Iterator<Item = &'a Fact> {
        self.0.iter().filter(move |f| pattern.matches(f))
    }

    /// Distinct subjects, in identifier order.
    pub fn subjects(&self) -> BTreeSet<&Iri> {
        self.0.iter().map(|f| &f.subject).collect()
    }

    pub fn union(&self, other: &TripleSet) -> TripleSet {
        TripleSet(self.0.union(&other.0).cloned().collect())
    }

    /// Facts in `self` that are not in `other`.
    pub fn difference(&self, other: &TripleSet) -> TripleSet {
        TripleSet(self.0.difference(&other.0).cloned().collect())
    }

    pub fn extend(&mut self, facts: impl IntoIterator<Item = Fact>) {
        self.0.extend(facts)
    }

    pub fn retain(&mut self, keep: impl FnMut(&Fact) -> bool) {
        self.0.retain(keep)
    }
}

impl FromIterator<Fact> for TripleSet {
    fn from_iter<T: IntoIterator<Item = Fact>>(iter: T) -> Self {
        TripleSet(iter.into_iter().collect())
    }
}

impl IntoIterator for TripleSet {
    type Item = Fact;
    type IntoIter = std::collections::btree_set::IntoIter<Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a TripleSet {
    type Item = &'a Fact;
    type IntoIter = std::collections::btree_set::Iter<'a, Fact>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Sub for &TripleSet {
    type Output = TripleSet;

    fn sub(self, rhs: &TripleSet) -> TripleSet {
        self.difference(rhs)
    }
}

impl BitAnd for &TripleSet {
    type Output = TripleSet;

    fn bitand(self, rhs: &TripleSet) -> TripleSet {
        TripleSet(self.0.intersection(&rhs.0).cloned().collect())
    }
}
