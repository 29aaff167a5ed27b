//! Subject identity derived from workspace paths, and the inverse mapping
//! used when the engine creates a document for a subject it has never
//! seen on disk.
//!
//! A document that does not name its own subject gets a deterministic one
//! from its workspace-relative path: `urn:doc:` plus the `/`-separated
//! path with the final extension stripped. Segments are NFC-normalized
//! and percent-encoded so the same file yields the same subject on every
//! platform and filesystem encoding.

use std::{
    fmt::Write,
    path::{Component, Path, PathBuf},
};

use unicode_normalization::UnicodeNormalization;

use crate::model::Iri;

/// Identifier prefix for path-derived subjects.
pub const SUBJECT_PREFIX: &str = "urn:doc:";

/// Extension given to documents the engine creates itself.
pub const DEFAULT_EXTENSION: &str = "md";

/// Derive the subject identifying `rel_path`. Deterministic and stable:
/// renaming the file is the only thing that changes it.
pub fn subject_for_path(rel_path: &Path) -> Iri {
    let mut segments: Vec<String> = Vec::new();
    for component in rel_path.components() {
        match component {
            Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            // Anything else would escape the workspace; the caller hands
            // us normalized relative paths.
            _ => {}
        }
    }
    if let Some(last) = segments.last_mut() {
        if let Some(stem) = Path::new(last.as_str())
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
        {
            *last = stem;
        }
    }
    let encoded: Vec<String> = segments
        .iter()
        .map(|segment| encode_segment(&segment.nfc().collect::<String>()))
        .collect();
    Iri::new_unchecked(format!("{SUBJECT_PREFIX}{}", encoded.join("/")))
}

/// Inverse of [`subject_for_path`]: the workspace-relative path that
/// should own `subject`. Path-derived subjects decode back to their
/// original path; any other subject gets a sanitized file name from its
/// tail segment.
pub fn path_for_subject(subject: &Iri, extension: &str) -> PathBuf {
    let identifier = subject.as_str();
    let identifier = identifier.split('#').next().unwrap_or(identifier);

    if let Some(local) = identifier.strip_prefix(SUBJECT_PREFIX) {
        if !local.is_empty() {
            let mut segments: Vec<String> = local
                .split('/')
                .map(decode_segment)
                .map(|seg| match seg.as_str() {
                    "" | "." | ".." => "_".to_string(),
                    _ => seg,
                })
                .collect();
            if let Some(last) = segments.last_mut() {
                *last = format!("{last}.{extension}");
            }
            return segments.iter().collect();
        }
    }

    let tail = identifier
        .rsplit(|c| c == ':' || c == '/')
        .next()
        .unwrap_or(identifier);
    let name = sanitize_file_name(tail);
    PathBuf::from(format!("{name}.{extension}"))
}

fn sanitize_file_name(tail: &str) -> String {
    let cleaned: String = tail
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "subject".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_segment(segment: &str) -> String {
    let mut out = String::new();
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            other => {
                let _ = write!(out, "%{other:02X}");
            }
        }
    }
    out
}

fn decode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        // An escape decodes only when both following bytes are ASCII hex;
        // anything else stays literal text.
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = char::from(bytes[i + 1]).to_digit(16);
            let lo = char::from(bytes[i + 2]).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi << 4 | lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
