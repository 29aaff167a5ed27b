//! Document codec: structured headers, prose, and embedded blocks.
//!
//! A document is UTF-8 text that may open with a header region delimited
//! by `---` marker lines. The header carries facts in one of two
//! dialects, auto-detected per document:
//!
//! - **Native-triple** ([`turtle`]) when the trimmed header starts with
//!   `@prefix`, `@base`, `PREFIX`, `BASE`, or `<`;
//! - **Key-value** ([`keyvalue`]) otherwise.
//!
//! Everything after the closing marker is prose and is preserved
//! byte-for-byte. Fenced code blocks inside the prose whose info string
//! is `graphdown` are embedded structured regions ([`blocks`]): their
//! facts join the document's set under a scoped subject while their
//! bytes remain part of the prose.
//!
//! ## Key Components
//!
//! - [`decode`] - Parse a document into a [`DecodedDocument`]
//! - [`encode`] - Serialize a document's current facts back to text
//! - [`StatementLayout`] - First-seen ordering hints for stable output
//! - [`SyncDiagnostic`] - Non-fatal parse and synchronization issues
//!
//! ## Round-trip law
//!
//! For any well-formed document: `decode` then `encode` yields text whose
//! facts equal the original Triple Set and whose prose is byte-identical.
//! The header region itself may be normalized (whitespace, grouping), the
//! meaning may not. [`encode`] never rewrites embedded blocks unless
//! [`EncodeOptions::regenerate_blocks`] asks for it.

use std::{
    collections::BTreeMap,
    ops::Range,
    path::Path,
};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    error::GraphdownError,
    model::{Fact, Iri, TripleSet},
    paths,
    vocab,
};

pub mod blocks;
pub mod diagnostic;
pub mod keyvalue;
pub mod turtle;

pub use diagnostic::{MalformedBlock, SyncDiagnostic};

/// Header regions are delimited by `---` lines at the very start of the
/// document. The lazy interior stops at the first closing marker.
static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A---[ \t]*\r?\n(?:(.*?)\r?\n)?---[ \t]*(\r?\n|\z)").unwrap()
});

/// How a document's header region expresses facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Turtle-like native triples.
    NativeTriple,
    /// YAML-like key-value mapping.
    KeyValue,
    /// No header region; the whole document is prose.
    None,
}

/// Where inside its document a fact was stated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FactOrigin {
    Header,
    Block { name: String },
}

impl std::fmt::Display for FactOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactOrigin::Header => write!(f, "header"),
            FactOrigin::Block { name } => write!(f, "block '{name}'"),
        }
    }
}

/// A recognized embedded structured block inside the prose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedBlock {
    /// Block name from the fence info string, or `block-N` by position.
    pub name: String,
    /// Subject its facts are stated under.
    pub subject: Iri,
    /// Byte range of the fence body within the prose. Regeneration
    /// replaces exactly these bytes; the fence lines are prose.
    pub span: Range<usize>,
}

/// First-seen ordering recovered from a parsed document. The writers use
/// it to keep an unmodified document's statement and key order stable
/// across round trips.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLayout {
    subject_order: Vec<Iri>,
    predicate_order: BTreeMap<Iri, Vec<Iri>>,
}

impl StatementLayout {
    pub fn note_subject(&mut self, subject: &Iri) {
        if !self.subject_order.contains(subject) {
            self.subject_order.push(subject.clone());
        }
    }

    pub fn note_predicate(&mut self, subject: &Iri, predicate: &Iri) {
        let order = self.predicate_order.entry(subject.clone()).or_default();
        if !order.contains(predicate) {
            order.push(predicate.clone());
        }
    }

    /// Predicates of `subject` in first-seen order, when the subject was
    /// seen at all.
    pub fn predicates_of(&self, subject: &Iri) -> Option<&[Iri]> {
        self.predicate_order.get(subject).map(Vec::as_slice)
    }

    pub fn subjects(&self) -> &[Iri] {
        &self.subject_order
    }

    pub fn merge(&mut self, other: &StatementLayout) {
        for subject in &other.subject_order {
            self.note_subject(subject);
        }
        for (subject, predicates) in &other.predicate_order {
            for predicate in predicates {
                self.note_predicate(subject, predicate);
            }
        }
    }
}

/// A parsed document: the engine's working state for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedDocument {
    /// Primary subject, explicit or path-derived.
    pub subject: Iri,
    /// Every fact the document states, header and blocks together.
    pub facts: TripleSet,
    /// Per-fact location, the raw material for provenance records.
    pub origins: BTreeMap<Fact, FactOrigin>,
    /// Body text after the header region, byte-identical to the source.
    pub prose: String,
    /// Recognized embedded blocks, in document order.
    pub blocks: Vec<EmbeddedBlock>,
    pub dialect: Dialect,
    /// Ordering hints for stable re-emission.
    pub layout: StatementLayout,
    /// Prefix declarations from a native-triple header, re-used on write.
    pub prefixes: BTreeMap<String, String>,
    /// Non-fatal issues found while parsing.
    pub diagnostics: Vec<SyncDiagnostic>,
}

impl DecodedDocument {
    /// State for a document the engine creates itself: no text yet, facts
    /// to be inserted, header written on first flush.
    pub fn empty(subject: Iri, dialect: Dialect) -> Self {
        DecodedDocument {
            subject,
            facts: TripleSet::new(),
            origins: BTreeMap::new(),
            prose: String::new(),
            blocks: Vec::new(),
            dialect,
            layout: StatementLayout::default(),
            prefixes: BTreeMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Facts owned by `block`: stated under its subject or scoped below it.
    fn block_slice(&self, block: &EmbeddedBlock) -> TripleSet {
        self.facts
            .iter()
            .filter(|f| f.subject == block.subject || f.subject.is_scoped_under(&block.subject))
            .cloned()
            .collect()
    }
}

/// Options for [`encode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Replace each recognized block's fence body with the key-value
    /// rendering of that block's current facts. Off by default: block
    /// bytes are prose and stay untouched.
    pub regenerate_blocks: bool,
}

/// Parse one document. `rel_path` is the workspace-relative path; it
/// derives the fallback subject and labels errors and diagnostics.
pub fn decode(rel_path: &Path, text: &str) -> Result<DecodedDocument, GraphdownError> {
    let path_label = rel_path.display().to_string();
    let derived = paths::subject_for_path(rel_path);

    let Some((header, prose, prose_line_offset)) = split_header(&path_label, text)? else {
        let mut doc = DecodedDocument::empty(derived, Dialect::None);
        doc.prose = text.to_string();
        return Ok(doc);
    };

    let mut doc = if turtle::is_native_header(header) {
        let parsed = turtle::parse_header(&path_label, header, 1)?;
        let subject = parsed.explicit_subject.unwrap_or(derived);
        let mut doc = DecodedDocument::empty(subject, Dialect::NativeTriple);
        doc.layout = parsed.layout;
        doc.prefixes = parsed.prefixes;
        doc.diagnostics = parsed.diagnostics;
        for fact in parsed.facts {
            doc.origins.entry(fact.clone()).or_insert(FactOrigin::Header);
            doc.facts.insert(fact);
        }
        doc
    } else {
        let parsed = keyvalue::parse_header(&path_label, header, 1, &derived)?;
        let subject = parsed.explicit_subject.unwrap_or(derived);
        let mut doc = DecodedDocument::empty(subject, Dialect::KeyValue);
        doc.layout = parsed.layout;
        doc.diagnostics = parsed.diagnostics;
        for fact in parsed.facts {
            doc.origins.entry(fact.clone()).or_insert(FactOrigin::Header);
            doc.facts.insert(fact);
        }
        doc
    };

    let scanned = blocks::scan(&path_label, prose, &doc.subject, prose_line_offset);
    doc.diagnostics.extend(scanned.diagnostics);
    for block in scanned.blocks {
        let origin = FactOrigin::Block {
            name: block.meta.name.clone(),
        };
        for fact in block.facts {
            doc.origins.entry(fact.clone()).or_insert(origin.clone());
            doc.facts.insert(fact);
        }
        doc.layout.merge(&block.layout);
        doc.blocks.push(block.meta);
    }

    doc.prose = prose.to_string();
    Ok(doc)
}

/// Serialize a document's current facts back to text.
///
/// The header region is re-synthesized from the facts by the dialect
/// writer; prose is emitted byte-identically. A document that had no
/// header but now carries facts gains a native-triple header. Provenance
/// predicates never serialize.
pub fn encode(doc: &DecodedDocument, options: &EncodeOptions) -> Result<String, GraphdownError> {
    let mut header_facts = TripleSet::new();
    let mut block_facts: BTreeMap<usize, TripleSet> = BTreeMap::new();
    'facts: for fact in doc.facts.iter() {
        if fact.predicate.as_str().starts_with(vocab::PROVENANCE_NS) {
            tracing::debug!("provenance fact {fact} excluded from serialization");
            continue;
        }
        for (i, block) in doc.blocks.iter().enumerate() {
            if fact.subject == block.subject || fact.subject.is_scoped_under(&block.subject) {
                block_facts.entry(i).or_default().insert(fact.clone());
                continue 'facts;
            }
        }
        header_facts.insert(fact.clone());
    }

    let dialect = match doc.dialect {
        Dialect::None if header_facts.is_empty() && block_facts.is_empty() => Dialect::None,
        Dialect::None => Dialect::NativeTriple,
        other => other,
    };

    let mut out = String::new();
    match dialect {
        Dialect::None => {}
        Dialect::NativeTriple => {
            let header =
                turtle::write_header(&header_facts, &doc.subject, &doc.layout, &doc.prefixes)?;
            out.push_str("---\n");
            out.push_str(&header);
            out.push_str("---\n");
        }
        Dialect::KeyValue => {
            let header = keyvalue::write_header(&header_facts, &doc.subject, &doc.layout)?;
            out.push_str("---\n");
            out.push_str(&header);
            out.push_str("---\n");
        }
    }

    if options.regenerate_blocks {
        let mut prose = doc.prose.clone();
        for (i, block) in doc.blocks.iter().enumerate().rev() {
            let slice = block_facts.remove(&i).unwrap_or_default();
            let body = keyvalue::write_header(&slice, &block.subject, &doc.layout)?;
            prose.replace_range(block.span.clone(), &body);
        }
        out.push_str(&prose);
    } else {
        out.push_str(&doc.prose);
    }
    Ok(out)
}

/// Split a document at its header markers. `Ok(None)` means no header
/// region; an opening marker without a closing one is malformed.
fn split_header<'t>(
    path: &str,
    text: &'t str,
) -> Result<Option<(&'t str, &'t str, usize)>, GraphdownError> {
    match HEADER_PATTERN.captures(text) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let header = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let prose = &text[whole..];
            let prose_line_offset = text[..whole].matches('\n').count();
            Ok(Some((header, prose, prose_line_offset)))
        }
        None => {
            let first_line = text.lines().next().unwrap_or("");
            if first_line.trim_end() == "---" && text.contains('\n') {
                return Err(GraphdownError::MalformedHeader {
                    path: path.to_string(),
                    line: 1,
                    column: 1,
                    message: "header region opened but never closed".to_string(),
                });
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn doc_path() -> &'static Path {
        Path::new("notes/test.md")
    }

    #[test]
    fn test_decode_keyvalue_document() {
        let text = "---\ntitle: Hello\ntags:\n  - x\n---\nBody text.\n";
        let doc = decode(doc_path(), text).unwrap();
        assert_eq!(doc.dialect, Dialect::KeyValue);
        assert_eq!(doc.subject.as_str(), "urn:doc:notes/test");
        assert_eq!(doc.facts.len(), 2);
        assert_eq!(doc.prose, "Body text.\n");
        assert!(doc
            .origins
            .values()
            .all(|origin| *origin == FactOrigin::Header));
    }

    #[test]
    fn test_decode_native_document() {
        let text = concat!(
            "---\n",
            "@prefix gd: <https://graphdown.dev/schema/> .\n",
            "<urn:doc:log> gd:title \"Log\" .\n",
            "---\n",
            "Prose.\n"
        );
        let doc = decode(doc_path(), text).unwrap();
        assert_eq!(doc.dialect, Dialect::NativeTriple);
        assert_eq!(doc.subject.as_str(), "urn:doc:log");
        assert_eq!(doc.facts.len(), 1);
        assert_eq!(doc.prose, "Prose.\n");
    }

    #[test]
    fn test_decode_headerless_document() {
        let doc = decode(doc_path(), "Just prose, nothing else.\n").unwrap();
        assert_eq!(doc.dialect, Dialect::None);
        assert!(doc.facts.is_empty());
        assert_eq!(doc.prose, "Just prose, nothing else.\n");
    }

    #[test]
    fn test_unterminated_header_is_fatal() {
        let err = decode(doc_path(), "---\ntitle: broken\n").unwrap_err();
        assert!(matches!(err, GraphdownError::MalformedHeader { line: 1, .. }));
    }

    #[test]
    fn test_empty_header_region() {
        let doc = decode(doc_path(), "---\n---\nBody.\n").unwrap();
        assert_eq!(doc.dialect, Dialect::KeyValue);
        assert!(doc.facts.is_empty());
        assert_eq!(doc.prose, "Body.\n");
    }

    #[test]
    fn test_horizontal_rule_in_prose_is_not_a_header() {
        let text = "---\ntitle: X\n---\nIntro.\n\n---\n\nAfter the rule.\n";
        let doc = decode(doc_path(), text).unwrap();
        assert_eq!(doc.facts.len(), 1);
        assert_eq!(doc.prose, "Intro.\n\n---\n\nAfter the rule.\n");
    }

    #[test]
    fn test_encode_preserves_prose_bytes() {
        let text = "---\ntitle: Hello\n---\nLine one.\n\n  indented\n\ttabbed\n";
        let doc = decode(doc_path(), text).unwrap();
        let encoded = encode(&doc, &EncodeOptions::default()).unwrap();
        let reparsed = decode(doc_path(), &encoded).unwrap();
        assert_eq!(reparsed.facts, doc.facts);
        assert_eq!(reparsed.prose, doc.prose);
    }

    #[test]
    fn test_headerless_document_gains_native_header_when_mutated() {
        let mut doc = decode(doc_path(), "Only prose.\n").unwrap();
        doc.facts.insert(Fact::new(
            doc.subject.clone(),
            vocab::TITLE.clone(),
            Term::text("Found"),
        ));
        let encoded = encode(&doc, &EncodeOptions::default()).unwrap();
        assert!(encoded.starts_with("---\n"));
        let reparsed = decode(doc_path(), &encoded).unwrap();
        assert_eq!(reparsed.dialect, Dialect::NativeTriple);
        assert_eq!(reparsed.facts, doc.facts);
        assert_eq!(reparsed.prose, "Only prose.\n");
    }

    #[test]
    fn test_provenance_predicates_never_serialize() {
        let mut doc = decode(doc_path(), "---\ntitle: Clean\n---\n").unwrap();
        doc.facts.insert(Fact::new(
            doc.subject.clone(),
            vocab::DEFINED_IN.clone(),
            Term::text("file:///tmp/leak.md"),
        ));
        let encoded = encode(&doc, &EncodeOptions::default()).unwrap();
        assert!(!encoded.contains("definedIn"));
        assert!(!encoded.contains("leak"));
    }

    #[test]
    fn test_decode_collects_block_facts_with_block_origin() {
        let text = concat!(
            "---\n",
            "title: Parent\n",
            "---\n",
            "Before.\n",
            "\n",
            "```graphdown specimen\n",
            "status: active\n",
            "```\n",
            "\n",
            "After.\n"
        );
        let doc = decode(doc_path(), text).unwrap();
        assert_eq!(doc.blocks.len(), 1);
        let block_subject = doc.subject.with_fragment("specimen");
        let block_fact = doc
            .facts
            .iter()
            .find(|f| f.subject == block_subject)
            .expect("block fact present");
        assert_eq!(
            doc.origins.get(block_fact),
            Some(&FactOrigin::Block {
                name: "specimen".to_string()
            })
        );
        // Block bytes are prose: encode without regeneration leaves them.
        let encoded = encode(&doc, &EncodeOptions::default()).unwrap();
        assert!(encoded.contains("```graphdown specimen\nstatus: active\n```"));
    }

    #[test]
    fn test_block_regeneration_replaces_fence_body_only() {
        let text = concat!(
            "---\n",
            "title: Parent\n",
            "---\n",
            "```graphdown specimen\n",
            "status: active\n",
            "```\n",
            "Tail.\n"
        );
        let mut doc = decode(doc_path(), text).unwrap();
        let block_subject = doc.subject.with_fragment("specimen");
        doc.facts.insert(Fact::new(
            block_subject.clone(),
            vocab::STATUS.clone(),
            Term::text("archived"),
        ));
        let encoded = encode(
            &doc,
            &EncodeOptions {
                regenerate_blocks: true,
            },
        )
        .unwrap();
        assert!(encoded.contains("```graphdown specimen\n"));
        assert!(encoded.contains("archived"));
        assert!(encoded.ends_with("```\nTail.\n"));

        let reparsed = decode(doc_path(), &encoded).unwrap();
        assert_eq!(reparsed.facts, doc.facts);
    }

    #[test]
    fn test_layout_merge_keeps_first_seen_order() {
        let mut a = StatementLayout::default();
        let s = Iri::new_unchecked("urn:doc:a");
        a.note_predicate(&s, &vocab::TITLE);
        let mut b = StatementLayout::default();
        b.note_predicate(&s, &vocab::STATUS);
        b.note_predicate(&s, &vocab::TITLE);
        a.merge(&b);
        assert_eq!(
            a.predicates_of(&s).unwrap(),
            &[vocab::TITLE.clone(), vocab::STATUS.clone()]
        );
    }
}
