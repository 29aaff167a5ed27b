//! Key-value header dialect: YAML mappings converted to and from facts.
//!
//! Each top-level key resolves to a predicate through the vocabulary
//! table. Scalars become single facts, lists fan out to one fact per
//! element, and nested mappings introduce a scoped subject
//! (`primary#key`) with one linking fact. Literal typing follows the
//! scalar's native YAML type and is then passed through the predicate
//! schema gate, so identifier-like strings never silently turn into
//! numbers.
//!
//! The writer inverts the conversion: canonical key per predicate, lists
//! for multi-valued predicates, nested mappings for scoped subjects. A
//! fact the dialect cannot express (a language-tagged literal, a foreign
//! subject) fails the write instead of producing output that would not
//! round-trip.

use serde_yaml::{Mapping, Value};

use crate::{
    codec::{diagnostic::SyncDiagnostic, StatementLayout},
    error::GraphdownError,
    model::{Fact, Iri, Literal, LiteralKind, Term, TripleSet},
    schema::SCHEMA,
    vocab,
};

/// Parse output for a key-value header region.
#[derive(Debug, Clone, Default)]
pub struct ParsedKeyValue {
    pub facts: Vec<Fact>,
    pub layout: StatementLayout,
    /// Subject supplied by the `id:` key, when present.
    pub explicit_subject: Option<Iri>,
    pub diagnostics: Vec<SyncDiagnostic>,
}

/// Parse a key-value header. `fallback_subject` is the path-derived
/// subject used when the header does not carry an `id:` key.
pub fn parse_header(
    path: &str,
    header: &str,
    line_offset: usize,
    fallback_subject: &Iri,
) -> Result<ParsedKeyValue, GraphdownError> {
    let mapping = parse_mapping(path, header, line_offset)?;
    let mut out = ParsedKeyValue::default();

    let explicit = mapping
        .get(Value::String("id".to_string()))
        .and_then(subject_from_id);
    let subject = explicit
        .clone()
        .unwrap_or_else(|| fallback_subject.clone());
    out.explicit_subject = explicit;

    let mut conversion = Conversion {
        path: path.to_string(),
        facts: Vec::new(),
        layout: StatementLayout::default(),
        diagnostics: Vec::new(),
    };
    conversion.convert_mapping(&subject, &mapping);

    out.facts = conversion.facts;
    out.layout = conversion.layout;
    out.diagnostics = conversion.diagnostics;
    Ok(out)
}

/// Parse a header region into a YAML mapping. An empty region is an empty
/// mapping; any other non-mapping root is malformed.
pub(crate) fn parse_mapping(
    path: &str,
    header: &str,
    line_offset: usize,
) -> Result<Mapping, GraphdownError> {
    let value: Value = serde_yaml::from_str(header).map_err(|e| {
        let (line, column) = e
            .location()
            .map(|loc| (line_offset + loc.line(), loc.column()))
            .unwrap_or((line_offset + 1, 1));
        GraphdownError::MalformedHeader {
            path: path.to_string(),
            line,
            column,
            message: e.to_string(),
        }
    })?;
    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(mapping) => Ok(mapping),
        other => Err(GraphdownError::MalformedHeader {
            path: path.to_string(),
            line: line_offset + 1,
            column: 1,
            message: format!(
                "expected a key-value mapping at the top level, found {}",
                value_kind(&other)
            ),
        }),
    }
}

/// Subject named by an `id:` value: scheme-qualified strings verbatim,
/// other strings under `urn:`.
pub(crate) fn subject_from_id(value: &Value) -> Option<Iri> {
    let id = value.as_str()?;
    if id.trim().is_empty() {
        return None;
    }
    match Iri::new(id) {
        Ok(iri) => Some(iri),
        Err(_) => Some(Iri::new_unchecked(format!("urn:{id}"))),
    }
}

/// Shared YAML-mapping → facts conversion, used by headers and embedded
/// blocks alike.
pub(crate) struct Conversion {
    pub path: String,
    pub facts: Vec<Fact>,
    pub layout: StatementLayout,
    pub diagnostics: Vec<SyncDiagnostic>,
}

impl Conversion {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Conversion {
            path: path.into(),
            facts: Vec::new(),
            layout: StatementLayout::default(),
            diagnostics: Vec::new(),
        }
    }

    pub(crate) fn convert_mapping(&mut self, subject: &Iri, mapping: &Mapping) {
        self.layout.note_subject(subject);
        for (key, value) in mapping {
            let Some(key) = scalar_key(key) else {
                self.diagnostics.push(SyncDiagnostic::warning(format!(
                    "non-scalar key in {} skipped",
                    self.path
                )));
                continue;
            };
            let predicate = vocab::key_to_predicate(&key);
            self.layout.note_predicate(subject, &predicate);
            self.convert_value(subject, &predicate, &key, value);
        }
    }

    fn convert_value(&mut self, subject: &Iri, predicate: &Iri, key: &str, value: &Value) {
        match value {
            Value::Null => {}
            Value::Sequence(items) => {
                for item in items {
                    match item {
                        Value::Mapping(_) | Value::Sequence(_) => {
                            self.diagnostics.push(SyncDiagnostic::warning(format!(
                                "list under '{key}' in {} contains a nested structure; \
                                 element skipped (lists hold scalars only)",
                                self.path
                            )));
                        }
                        other => self.convert_scalar(subject, predicate, other),
                    }
                }
            }
            Value::Mapping(nested) => {
                let child = subject.with_fragment(&vocab::sanitize_key(key));
                self.facts.push(Fact::new(
                    subject.clone(),
                    predicate.clone(),
                    Term::Node(child.clone()),
                ));
                self.convert_mapping(&child, nested);
            }
            scalar => self.convert_scalar(subject, predicate, scalar),
        }
    }

    fn convert_scalar(&mut self, subject: &Iri, predicate: &Iri, value: &Value) {
        let term = match value {
            Value::Bool(b) => Term::Value(SCHEMA.coerce(predicate, Literal::boolean(*b))),
            Value::Number(n) => {
                let literal = if n.is_i64() || n.is_u64() {
                    Literal::integer_lexeme(n.to_string())
                } else {
                    Literal::decimal_lexeme(n.to_string())
                };
                Term::Value(SCHEMA.coerce(predicate, literal))
            }
            Value::String(s) => {
                if looks_like_reference(s) {
                    Term::Node(Iri::new_unchecked(s.clone()))
                } else {
                    Term::Value(SCHEMA.coerce(predicate, Literal::text(s.clone())))
                }
            }
            other => {
                self.diagnostics.push(SyncDiagnostic::warning(format!(
                    "unsupported {} value under '{predicate}' in {} skipped",
                    value_kind(other),
                    self.path
                )));
                return;
            }
        };
        self.facts
            .push(Fact::new(subject.clone(), predicate.clone(), term));
    }
}

fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// String values that denote identifiers rather than text. Deliberately
/// narrow: prose like `RE: budget` must stay a string.
pub(crate) fn looks_like_reference(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("urn:")
        || s.starts_with("file://")
}

// ---- writer ----

/// Serialize a document's facts as a key-value header region.
///
/// Ordering follows the layout's first-seen predicate order with unknown
/// predicates appended by canonical key, so an unmodified document
/// re-emits its keys where they were. Equal inputs produce identical
/// bytes.
pub fn write_header(
    facts: &TripleSet,
    primary: &Iri,
    layout: &StatementLayout,
) -> Result<String, GraphdownError> {
    let mut consumed = TripleSet::new();
    let mapping = render_subject(facts, primary, layout, &mut consumed)?;
    if let Some(stray) = facts.iter().find(|f| !consumed.contains(f)) {
        return Err(GraphdownError::Codec(format!(
            "fact {stray} is not reachable from the primary subject and cannot \
             be expressed in the key-value dialect"
        )));
    }
    if mapping.is_empty() {
        return Ok(String::new());
    }
    Ok(serde_yaml::to_string(&Value::Mapping(mapping))?)
}

fn render_subject(
    facts: &TripleSet,
    subject: &Iri,
    layout: &StatementLayout,
    consumed: &mut TripleSet,
) -> Result<Mapping, GraphdownError> {
    let slice = facts.filter_subject(subject);
    let predicates = ordered_predicates(&slice, layout.predicates_of(subject));

    let mut mapping = Mapping::new();
    for predicate in &predicates {
        let key = vocab::canonical_key(predicate);
        let mut values = Vec::new();
        for fact in slice.iter().filter(|f| f.predicate == *predicate) {
            consumed.insert(fact.clone());
            values.push(render_term(facts, fact, subject, &key, layout, consumed)?);
        }
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            Value::Sequence(values)
        };
        mapping.insert(Value::String(key), value);
    }
    Ok(mapping)
}

fn ordered_predicates(slice: &TripleSet, known_order: Option<&[Iri]>) -> Vec<Iri> {
    let mut present: std::collections::BTreeSet<Iri> =
        slice.iter().map(|f| f.predicate.clone()).collect();
    let mut ordered = Vec::with_capacity(present.len());
    if let Some(known) = known_order {
        for predicate in known {
            if present.remove(predicate) {
                ordered.push(predicate.clone());
            }
        }
    }
    let mut remaining: Vec<Iri> = present.into_iter().collect();
    remaining.sort_by_key(vocab::canonical_key);
    ordered.extend(remaining);
    ordered
}

fn render_term(
    facts: &TripleSet,
    fact: &Fact,
    parent: &Iri,
    key: &str,
    layout: &StatementLayout,
    consumed: &mut TripleSet,
) -> Result<Value, GraphdownError> {
    match &fact.object {
        Term::Node(iri) if iri.is_scoped_under(parent) => {
            let expected = parent.with_fragment(&vocab::sanitize_key(key));
            if *iri != expected {
                return Err(GraphdownError::Codec(format!(
                    "fact {fact}: scoped object does not match its key \
                     (expected <{expected}>); re-parsing would change the graph"
                )));
            }
            let nested = render_subject(facts, iri, layout, consumed)?;
            Ok(Value::Mapping(nested))
        }
        Term::Node(iri) => {
            if !looks_like_reference(iri.as_str()) {
                return Err(GraphdownError::Codec(format!(
                    "fact {fact}: identifier object is not expressible as a \
                     key-value reference; use the native-triple dialect"
                )));
            }
            Ok(Value::String(iri.as_str().to_string()))
        }
        Term::Value(literal) => render_literal(fact, literal),
    }
}

fn render_literal(fact: &Fact, literal: &Literal) -> Result<Value, GraphdownError> {
    let lexeme = literal.lexeme();
    Ok(match literal.kind() {
        LiteralKind::Text | LiteralKind::Date => Value::String(lexeme.to_string()),
        LiteralKind::Boolean => Value::Bool(lexeme == "true"),
        LiteralKind::Integer => match canonical_integer(lexeme) {
            Some(n) => Value::Number(n.into()),
            // Non-canonical lexical forms survive as quoted strings; the
            // schema gate restores the kind on re-parse.
            None => Value::String(lexeme.to_string()),
        },
        LiteralKind::Decimal => match canonical_decimal(lexeme) {
            Some(n) => Value::Number(n),
            None => Value::String(lexeme.to_string()),
        },
        LiteralKind::LangText(tag) => {
            return Err(GraphdownError::Codec(format!(
                "fact {fact}: language-tagged literal (@{tag}) is not \
                 expressible in the key-value dialect"
            )))
        }
    })
}

fn canonical_integer(lexeme: &str) -> Option<i64> {
    let n: i64 = lexeme.parse().ok()?;
    (serde_yaml::Number::from(n).to_string() == lexeme).then_some(n)
}

fn canonical_decimal(lexeme: &str) -> Option<serde_yaml::Number> {
    let f: f64 = lexeme.parse().ok()?;
    let n = serde_yaml::Number::from(f);
    (n.to_string() == lexeme).then_some(n)
}
