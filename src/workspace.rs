//! Workspace discovery: who decides which files are documents.
//!
//! The engine never walks directories itself; it asks a
//! [`DocumentProvider`] for an ordered list of workspace-relative paths
//! and for raw bytes. [`DirectoryProvider`] is the filesystem
//! implementation; tests substitute in-memory providers.

use std::{
    fs,
    path::{Path, PathBuf},
};

use walkdir::WalkDir;

use crate::{config::WorkspaceConfig, error::GraphdownError};

/// Source of documents for the synchronization engine.
pub trait DocumentProvider {
    /// Workspace-relative document paths, in a stable order.
    fn list(&self) -> Result<Vec<PathBuf>, GraphdownError>;

    /// Raw bytes of one document.
    fn read(&self, path: &Path) -> Result<Vec<u8>, GraphdownError>;
}

/// Walks a directory tree, filtering by the configured extensions.
/// Dotfiles, dot-directories and the index snapshot are never documents.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
    config: WorkspaceConfig,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>, config: WorkspaceConfig) -> Self {
        DirectoryProvider {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

impl DocumentProvider for DirectoryProvider {
    fn list(&self) -> Result<Vec<PathBuf>, GraphdownError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
        {
            let entry = entry.map_err(|e| GraphdownError::Io(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.root)?.to_path_buf();
            if rel == Path::new(&self.config.snapshot_file) {
                continue;
            }
            if self.config.matches_path(&rel) {
                paths.push(rel);
            }
        }
        paths.sort();
        tracing::debug!("{} documents under {}", paths.len(), self.root.display());
        Ok(paths)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, GraphdownError> {
        Ok(fs::read(self.root.join(path))?)
    }
}
