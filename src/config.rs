//! Workspace configuration, read from `graphdown.toml` at the root.
//!
//! Every field has a default; a missing config file means a default
//! workspace. Unknown fields are rejected so typos surface instead of
//! silently configuring nothing.

use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::Path,
    time::Duration,
};

use crate::{error::GraphdownError, index::SNAPSHOT_FILE, paths::DEFAULT_EXTENSION, sync::FlushMode};

/// Config file name looked up in the workspace root.
pub const CONFIG_FILE: &str = "graphdown.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// File extensions treated as documents.
    pub extensions: Vec<String>,
    /// When programmatic mutations reach disk.
    pub flush_mode: FlushMode,
    /// Extension for documents the engine creates itself.
    pub canonical_extension: String,
    /// Upper bound for one full load or sync pass, in milliseconds.
    /// Zero disables the deadline.
    pub sync_deadline_ms: u64,
    /// Index snapshot file name, workspace-relative.
    pub snapshot_file: String,
    /// Rewrite embedded block bodies from current facts on flush.
    pub regenerate_blocks: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        WorkspaceConfig {
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            flush_mode: FlushMode::Immediate,
            canonical_extension: DEFAULT_EXTENSION.to_string(),
            sync_deadline_ms: 0,
            snapshot_file: SNAPSHOT_FILE.to_string(),
            regenerate_blocks: false,
        }
    }
}

impl WorkspaceConfig {
    /// Read the workspace config, falling back to defaults when the file
    /// does not exist.
    pub fn load(root: &Path) -> Result<Self, GraphdownError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("no {} in {}, using defaults", CONFIG_FILE, root.display());
            return Ok(WorkspaceConfig::default());
        }
        let content = read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, root: &Path) -> Result<(), GraphdownError> {
        let toml_string = toml::to_string(self)?;
        write(root.join(CONFIG_FILE), toml_string)?;
        Ok(())
    }

    /// The deadline for one load or sync pass, when one is configured.
    pub fn sync_deadline(&self) -> Option<Duration> {
        (self.sync_deadline_ms > 0).then(|| Duration::from_millis(self.sync_deadline_ms))
    }

    /// Whether `path` is a document per the configured extensions.
    pub fn matches_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.extensions, vec!["md".to_string()]);
        assert_eq!(config.flush_mode, FlushMode::Immediate);
        assert_eq!(config.snapshot_file, SNAPSHOT_FILE);
        assert_eq!(config.sync_deadline(), None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: WorkspaceConfig =
            toml::from_str("flush_mode = \"batched\"\nsync_deadline_ms = 250\n").unwrap();
        assert_eq!(config.flush_mode, FlushMode::Batched);
        assert_eq!(config.sync_deadline(), Some(Duration::from_millis(250)));
        assert_eq!(config.extensions, vec!["md".to_string()]);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: Result<WorkspaceConfig, _> = toml::from_str("flush_mod = \"batched\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_matches_path() {
        let config = WorkspaceConfig::default();
        assert!(config.matches_path(Path::new("notes/a.md")));
        assert!(!config.matches_path(Path::new("notes/a.txt")));
        assert!(!config.matches_path(Path::new("Makefile")));
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = WorkspaceConfig::load(dir.path()).expect("load");
        assert_eq!(config, WorkspaceConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = WorkspaceConfig::default();
        config.flush_mode = FlushMode::Batched;
        config.extensions.push("markdown".to_string());
        config.save(dir.path()).expect("save");

        let loaded = WorkspaceConfig::load(dir.path()).expect("load");
        assert_eq!(loaded, config);
    }
}
