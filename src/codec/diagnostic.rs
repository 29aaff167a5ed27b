//! Diagnostic types for document decoding and synchronization.
//!
//! Diagnostics represent non-fatal conditions: a mangled embedded block, a
//! concurrent external edit, a duplicated fact. They let an operation keep
//! processing the rest of a workspace while still reporting everything that
//! deviated from the happy path. Fatal per-document conditions (malformed
//! headers, subject collisions) travel as errors instead.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::Fact;

/// Details of an embedded structured block that failed to parse.
///
/// The block's bytes stay in the document as ordinary prose; only its
/// facts are missing. Header facts and sibling blocks are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MalformedBlock {
    /// Workspace-relative path of the containing document.
    pub path: String,
    /// The block's scoped name (info-string name or `block-N` ordinal).
    pub name: String,
    /// 1-based line of the opening fence within the document.
    pub line: usize,
    /// Description of what went wrong inside the block.
    pub message: String,
}

/// Diagnostic information produced while decoding documents or flushing
/// mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncDiagnostic {
    /// An embedded structured block could not be parsed. The block is
    /// preserved verbatim as prose.
    MalformedBlock(MalformedBlock),

    /// A document was modified on disk while in-memory mutations were
    /// pending. The external edit won; the buffered mutations for that
    /// document were discarded.
    ConcurrentModification {
        path: String,
        /// How many buffered facts were dropped in favor of the on-disk
        /// content.
        dropped_facts: usize,
    },

    /// A document re-stated a fact already owned by another document. The
    /// first provenance wins and the duplicate contribution is ignored.
    DuplicateProvenance {
        fact: Fact,
        kept: String,
        dropped: String,
    },

    /// A warning about a decoded value (e.g. an unknown datatype
    /// annotation downgraded to plain text).
    Warning(String),

    /// An informational message.
    Info(String),
}

impl SyncDiagnostic {
    pub fn malformed_block(
        path: impl Into<String>,
        name: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedBlock(MalformedBlock {
            path: path.into(),
            name: name.into(),
            line,
            message: message.into(),
        })
    }

    pub fn concurrent_modification(path: impl Into<String>, dropped_facts: usize) -> Self {
        Self::ConcurrentModification {
            path: path.into(),
            dropped_facts,
        }
    }

    pub fn duplicate_provenance(fact: Fact, kept: impl Into<String>, dropped: impl Into<String>) -> Self {
        Self::DuplicateProvenance {
            fact,
            kept: kept.into(),
            dropped: dropped.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning(message.into())
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info(message.into())
    }

    pub fn is_malformed_block(&self) -> bool {
        matches!(self, Self::MalformedBlock(_))
    }

    pub fn as_malformed_block(&self) -> Option<&MalformedBlock> {
        match self {
            Self::MalformedBlock(block) => Some(block),
            _ => None,
        }
    }

    pub fn is_concurrent_modification(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }

    /// The path whose external edit won, if this is a conflict diagnostic.
    pub fn as_concurrent_modification(&self) -> Option<(&str, usize)> {
        match self {
            Self::ConcurrentModification {
                path,
                dropped_facts,
            } => Some((path.as_str(), *dropped_facts)),
            _ => None,
        }
    }
}

impl fmt::Display for SyncDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedBlock(block) => write!(
                f,
                "Malformed block '{}' in {} at line {}: {}. Block kept as prose.",
                block.name, block.path, block.line, block.message
            ),
            Self::ConcurrentModification {
                path,
                dropped_facts,
            } => write!(
                f,
                "{path} changed on disk with {dropped_facts} buffered fact(s) pending. External content kept."
            ),
            Self::DuplicateProvenance {
                fact,
                kept,
                dropped,
            } => write!(
                f,
                "Fact {fact} from {dropped} is already defined in {kept}; duplicate ignored"
            ),
            Self::Warning(msg) => write!(f, "Warning: {msg}"),
            Self::Info(msg) => write!(f, "Info: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_creation() {
        let block = SyncDiagnostic::malformed_block("notes.md", "block-1", 12, "bad indent");
        let conflict = SyncDiagnostic::concurrent_modification("notes.md", 3);
        let warning = SyncDiagnostic::warning("unknown datatype");

        assert!(block.is_malformed_block());
        assert_eq!(block.as_malformed_block().unwrap().line, 12);
        assert!(conflict.is_concurrent_modification());
        assert_eq!(
            conflict.as_concurrent_modification(),
            Some(("notes.md", 3))
        );
        assert!(matches!(warning, SyncDiagnostic::Warning(_)));
    }

    #[test]
    fn test_accessors_reject_other_variants() {
        let warning = SyncDiagnostic::warning("w");
        assert!(!warning.is_malformed_block());
        assert!(warning.as_malformed_block().is_none());
        assert!(warning.as_concurrent_modification().is_none());
    }

    #[test]
    fn test_display_names_the_block() {
        let d = SyncDiagnostic::malformed_block("a/b.md", "metrics", 4, "not a mapping");
        let text = d.to_string();
        assert!(text.contains("a/b.md"));
        assert!(text.contains("metrics"));
        assert!(text.contains("line 4"));
    }
}
