//! Embedded structured blocks: fenced code regions inside the prose whose
//! info string carries the reserved `graphdown` tag.
//!
//! ````text
//! ```graphdown specimen
//! status: active
//! ```
//! ````
//!
//! A block's content is a key-value mapping parsed with the same
//! conversion rule as a key-value header, stated under a subject scoped
//! below the document's primary subject (`primary#name`). An `id:` key
//! inside the block escapes the scope and names an absolute subject
//! instead. The fence markers and body bytes stay part of the prose;
//! only the body's byte span is recorded so regeneration can replace it.
//!
//! Malformed block content is a diagnostic, never a document failure:
//! the bytes simply stay ordinary prose.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::{
    codec::{
        diagnostic::SyncDiagnostic,
        keyvalue::{self, Conversion},
        EmbeddedBlock, StatementLayout,
    },
    error::GraphdownError,
    model::{Fact, Iri},
    vocab,
};

/// Reserved fence language tag.
const BLOCK_TAG: &str = "graphdown";

/// One successfully parsed block.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub meta: EmbeddedBlock,
    pub facts: Vec<Fact>,
    pub layout: StatementLayout,
}

/// Everything block scanning produced for one document.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Parsed blocks in document order. Malformed blocks are absent here
    /// and reported through `diagnostics` instead.
    pub blocks: Vec<ParsedBlock>,
    pub diagnostics: Vec<SyncDiagnostic>,
}

/// Scan `prose` for `graphdown` fences and parse each one.
///
/// `line_offset` is the number of document lines before the prose starts,
/// so diagnostics carry document line numbers.
pub fn scan(path: &str, prose: &str, primary: &Iri, line_offset: usize) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    for (ordinal, region) in locate(prose).into_iter().enumerate() {
        let name = region
            .name
            .unwrap_or_else(|| format!("block-{}", ordinal + 1));
        let body = &prose[region.body.clone()];
        let body_line_offset = line_offset + prose[..region.body.start].matches('\n').count();

        let mapping = match keyvalue::parse_mapping(path, body, body_line_offset) {
            Ok(mapping) => mapping,
            Err(GraphdownError::MalformedHeader { line, message, .. }) => {
                outcome
                    .diagnostics
                    .push(SyncDiagnostic::malformed_block(path, &name, line, message));
                continue;
            }
            Err(other) => {
                outcome.diagnostics.push(SyncDiagnostic::malformed_block(
                    path,
                    &name,
                    body_line_offset + 1,
                    other.to_string(),
                ));
                continue;
            }
        };

        let subject = mapping
            .get(serde_yaml::Value::String("id".to_string()))
            .and_then(keyvalue::subject_from_id)
            .unwrap_or_else(|| primary.with_fragment(&vocab::sanitize_key(&name)));

        let mut conversion = Conversion::new(path);
        conversion.convert_mapping(&subject, &mapping);
        outcome.diagnostics.append(&mut conversion.diagnostics);
        outcome.blocks.push(ParsedBlock {
            meta: EmbeddedBlock {
                name,
                subject,
                span: region.body,
            },
            facts: conversion.facts,
            layout: conversion.layout,
        });
    }
    outcome
}

struct FenceRegion {
    name: Option<String>,
    /// Byte range of the fence body within the prose.
    body: std::ops::Range<usize>,
}

/// Locate `graphdown` fences byte-exactly. The body range is everything
/// between the info line and the closing fence; for an empty block it is
/// the zero-length range where content would go.
fn locate(prose: &str) -> Vec<FenceRegion> {
    let mut regions = Vec::new();
    let mut current: Option<(Option<String>, std::ops::Range<usize>, Option<std::ops::Range<usize>>)> =
        None;

    for (event, range) in Parser::new_ext(prose, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let mut tokens = info.split_whitespace();
                if tokens.next() == Some(BLOCK_TAG) {
                    let name = tokens.next().map(str::to_string);
                    current = Some((name, range, None));
                }
            }
            Event::Text(_) if current.is_some() => {
                if let Some((_, _, body)) = current.as_mut() {
                    match body {
                        Some(span) => span.end = range.end,
                        None => *body = Some(range),
                    }
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((name, fence, body)) = current.take() {
                    let body = body.unwrap_or_else(|| {
                        // Empty block: body would start on the line after
                        // the opening fence.
                        let after_info = prose[fence.start..fence.end]
                            .find('\n')
                            .map(|i| fence.start + i + 1)
                            .unwrap_or(fence.end);
                        after_info..after_info
                    });
                    regions.push(FenceRegion { name, body });
                }
            }
            _ => {}
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Term;

    fn primary() -> Iri {
        Iri::new_unchecked("urn:doc:host")
    }

    #[test]
    fn test_named_block_scopes_subject() {
        let prose = "Intro.\n\n```graphdown specimen\nstatus: active\n```\n";
        let outcome = scan("host.md", prose, &primary(), 0);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.blocks.len(), 1);
        let block = &outcome.blocks[0];
        assert_eq!(block.meta.name, "specimen");
        assert_eq!(block.meta.subject.as_str(), "urn:doc:host#specimen");
        assert_eq!(
            block.facts,
            vec![Fact::new(
                block.meta.subject.clone(),
                vocab::STATUS.clone(),
                Term::text("active"),
            )]
        );
        assert_eq!(&prose[block.meta.span.clone()], "status: active\n");
    }

    #[test]
    fn test_unnamed_blocks_are_numbered_in_order() {
        let prose = concat!(
            "```graphdown first\na: 1\n```\n",
            "\n",
            "```graphdown\nb: 2\n```\n",
            "\n",
            "```graphdown\nc: 3\n```\n",
        );
        let outcome = scan("host.md", prose, &primary(), 0);
        let names: Vec<&str> = outcome.blocks.iter().map(|b| b.meta.name.as_str()).collect();
        assert_eq!(names, vec!["first", "block-2", "block-3"]);
    }

    #[test]
    fn test_id_overrides_scoped_subject() {
        let prose = "```graphdown\nid: S-17\nstatus: shipped\n```\n";
        let outcome = scan("host.md", prose, &primary(), 0);
        assert_eq!(outcome.blocks[0].meta.subject.as_str(), "urn:S-17");
    }

    #[test]
    fn test_other_fences_are_ignored(){
        let prose = "```rust\nfn main() {}\n```\n\n```\nplain\n```\n";
        let outcome = scan("host.md", prose, &primary(), 0);
        assert!(outcome.blocks.is_empty());
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_malformed_block_is_a_diagnostic() {
        let prose = "Line one.\n\n```graphdown broken\n- not\n- a-mapping\n```\n";
        let outcome = scan("host.md", prose, &primary(), 3);
        assert!(outcome.blocks.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        let block = outcome.diagnostics[0]
            .as_malformed_block()
            .expect("malformed block diagnostic");
        assert_eq!(block.name, "broken");
        // Three header lines, two prose lines, the fence line, then the body.
        assert_eq!(block.line, 7);
    }

    #[test]
    fn test_empty_block_records_insertion_point() {
        let prose = "```graphdown notes\n```\nTail.\n";
        let outcome = scan("host.md", prose, &primary(), 0);
        assert_eq!(outcome.blocks.len(), 1);
        let span = outcome.blocks[0].meta.span.clone();
        assert_eq!(span.start, span.end);
        assert_eq!(&prose[..span.start], "```graphdown notes\n");
        assert!(outcome.blocks[0].facts.is_empty());
    }

    #[test]
    fn test_multiline_body_span_covers_all_lines() {
        let prose = "```graphdown plan\ntitle: Plan\nstatus: open\ntags:\n  - a\n```\n";
        let outcome = scan("host.md", prose, &primary(), 0);
        let span = outcome.blocks[0].meta.span.clone();
        assert_eq!(
            &prose[span],
            "title: Plan\nstatus: open\ntags:\n  - a\n"
        );
        assert_eq!(outcome.blocks[0].facts.len(), 3);
    }
}
