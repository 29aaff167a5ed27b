use std::{fmt, io, path::StripPrefixError};

use regex::Error as RegexError;
use serde::{Deserialize, Serialize};
use serde_json::Error as JsonError;
use thiserror::Error;
use url::ParseError as UrlParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
pub enum GraphdownError {
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("File System error: {0}")]
    Io(String),
    #[error("Index invariant violated: {0}")]
    Index(String),
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("You do not have permission to access this resource")]
    PermissionDenied,
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("Malformed header in '{path}' at line {line}, column {column}: {message}")]
    MalformedHeader {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("Subject '{subject}' from '{path}' is already claimed by '{claimed_by}'")]
    SubjectCollision {
        subject: String,
        path: String,
        claimed_by: String,
    },
    #[error("Encoding '{path}' would not round-trip: {detail}. Write aborted.")]
    RoundTrip { path: String, detail: String },
    #[error("Workspace load deadline exceeded after {synced} of {total} documents")]
    DeadlineExceeded { synced: usize, total: usize },
}

impl GraphdownError {
    /// True when the error invalidates a single document rather than the
    /// whole operation. The synchronization engine reports these per path
    /// and keeps going.
    pub fn is_document_scoped(&self) -> bool {
        matches!(
            self,
            GraphdownError::Codec(_)
                | GraphdownError::NotFound(_)
                | GraphdownError::PermissionDenied
                | GraphdownError::MalformedHeader { .. }
                | GraphdownError::SubjectCollision { .. }
                | GraphdownError::RoundTrip { .. }
        )
    }
}

impl From<io::Error> for GraphdownError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => GraphdownError::NotFound(format!("{x}")),
            io::ErrorKind::PermissionDenied => GraphdownError::PermissionDenied,
            _ => GraphdownError::Io(format!("IOError: {}", x.kind())),
        }
    }
}

impl From<StripPrefixError> for GraphdownError {
    fn from(src: StripPrefixError) -> GraphdownError {
        GraphdownError::NotFound(format!("Strip prefix failed for path. Error: {src}"))
    }
}

impl From<toml::de::Error> for GraphdownError {
    fn from(src: toml::de::Error) -> GraphdownError {
        GraphdownError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for GraphdownError {
    fn from(src: toml::ser::Error) -> GraphdownError {
        GraphdownError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<serde_yaml::Error> for GraphdownError {
    fn from(src: serde_yaml::Error) -> GraphdownError {
        GraphdownError::Serialization(format!("YAML (de)serialization error: {src}"))
    }
}

impl From<JsonError> for GraphdownError {
    fn from(src: JsonError) -> GraphdownError {
        GraphdownError::Serialization(format!("JSON (de)serialization error: {src}"))
    }
}

impl From<UrlParseError> for GraphdownError {
    fn from(src: UrlParseError) -> GraphdownError {
        GraphdownError::Serialization(format!("Invalid URL: {src}"))
    }
}

impl From<RegexError> for GraphdownError {
    fn from(x: RegexError) -> Self {
        GraphdownError::Serialization(format!("Regex parse failed: {x}"))
    }
}

impl From<fmt::Error> for GraphdownError {
    fn from(x: fmt::Error) -> Self {
        GraphdownError::Codec(format!("{x}"))
    }
}
