//! Provenance tracking and the workspace index.
//!
//! The index is the engine's bookkeeping: which path contributed which
//! facts, under which subject, and what the file's bytes hashed to when
//! they were last synchronized. It answers three questions fast:
//!
//! - has this file changed since we last read it (`changed_since`),
//! - which facts does this file own (`facts_of`),
//! - where was this fact stated (`provenance_of`).
//!
//! Every fact has at most one provenance path. When two documents state
//! the same fact the first one loaded keeps it; the later contribution is
//! reported as a diagnostic and not indexed. Removing a path therefore
//! retracts exactly that path's facts and nothing else.
//!
//! A JSON snapshot (path, hash, subject, fact count) persists across
//! process restarts to cheapen startup change detection. Facts are never
//! read from the snapshot; documents stay the single source of truth.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    codec::{FactOrigin, SyncDiagnostic},
    error::GraphdownError,
    model::{Fact, Iri, TripleSet},
};

/// Default snapshot file name, relative to the workspace root.
pub const SNAPSHOT_FILE: &str = ".graphdown-index.json";

const SNAPSHOT_VERSION: u32 = 1;

/// Where a fact was stated. Lives only in the index; the writers filter
/// provenance so it never appears inside a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Provenance {
    pub path: PathBuf,
    pub origin: FactOrigin,
}

/// What [`WorkspaceIndex::record_sync`] accepted for one document.
#[derive(Debug, Clone, Default)]
pub struct RecordedSync {
    /// Facts now owned by the path. Facts already owned elsewhere are
    /// absent here.
    pub accepted: TripleSet,
    pub diagnostics: Vec<SyncDiagnostic>,
}

/// Bidirectional bookkeeping for every synchronized document.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceIndex {
    /// Digest of the exact bytes last synchronized, per path.
    hashes: BTreeMap<PathBuf, String>,
    path_to_subject: BTreeMap<PathBuf, Iri>,
    subject_to_path: BTreeMap<Iri, PathBuf>,
    /// The exclusive fact → location mapping.
    provenance: BTreeMap<Fact, Provenance>,
    /// Facts each path contributed, owned facts only.
    path_facts: BTreeMap<PathBuf, TripleSet>,
}

impl WorkspaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wholesale-replace one path's slice of the graph.
    ///
    /// Fails with `SubjectCollision` when another path already claims the
    /// primary subject; the index is unchanged in that case and the first
    /// claimant keeps the subject.
    pub fn record_sync(
        &mut self,
        path: &Path,
        hash: impl Into<String>,
        subject: &Iri,
        facts: &TripleSet,
        origins: &BTreeMap<Fact, FactOrigin>,
    ) -> Result<RecordedSync, GraphdownError> {
        if let Some(claimed_by) = self.subject_to_path.get(subject) {
            if claimed_by != path {
                return Err(GraphdownError::SubjectCollision {
                    subject: subject.to_string(),
                    path: path.display().to_string(),
                    claimed_by: claimed_by.display().to_string(),
                });
            }
        }

        if self.path_facts.contains_key(path) {
            self.remove(path);
        }
        self.claim_subject(path, subject);
        self.hashes.insert(path.to_path_buf(), hash.into());

        let mut outcome = RecordedSync::default();
        for fact in facts.iter() {
            if let Some(owner) = self.provenance.get(fact) {
                tracing::warn!(
                    "fact {fact} from {} already stated by {}; first provenance wins",
                    path.display(),
                    owner.path.display()
                );
                outcome.diagnostics.push(SyncDiagnostic::duplicate_provenance(
                    fact.clone(),
                    owner.path.display().to_string(),
                    path.display().to_string(),
                ));
                continue;
            }
            let origin = origins.get(fact).cloned().unwrap_or(FactOrigin::Header);
            self.provenance.insert(
                fact.clone(),
                Provenance {
                    path: path.to_path_buf(),
                    origin,
                },
            );
            outcome.accepted.insert(fact.clone());
        }
        self.path_facts
            .insert(path.to_path_buf(), outcome.accepted.clone());
        Ok(outcome)
    }

    /// Keep both directions of the path ↔ subject mapping consistent,
    /// dropping stale entries when either side moved.
    fn claim_subject(&mut self, path: &Path, subject: &Iri) {
        if let Some(old_subject) = self.path_to_subject.get(path) {
            if old_subject != subject {
                let old_subject = old_subject.clone();
                self.subject_to_path.remove(&old_subject);
            }
        }
        if let Some(old_path) = self.subject_to_path.get(subject) {
            if old_path != path {
                let old_path = old_path.clone();
                self.path_to_subject.remove(&old_path);
            }
        }
        self.path_to_subject
            .insert(path.to_path_buf(), subject.clone());
        self.subject_to_path
            .insert(subject.clone(), path.to_path_buf());
    }

    /// True when `hash` differs from the recorded digest for `path`.
    /// Unknown paths have trivially changed.
    pub fn changed_since(&self, path: &Path, hash: &str) -> bool {
        self.hashes.get(path).map(String::as_str) != Some(hash)
    }

    /// The recorded digest for `path`. Empty string for documents that
    /// were claimed in memory but never written out.
    pub fn hash_of(&self, path: &Path) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }

    /// The facts `path` owns. Empty for unknown paths.
    pub fn facts_of(&self, path: &Path) -> TripleSet {
        self.path_facts.get(path).cloned().unwrap_or_default()
    }

    /// Forget a path entirely, returning exactly the facts it owned.
    pub fn remove(&mut self, path: &Path) -> TripleSet {
        let Some(facts) = self.path_facts.remove(path) else {
            tracing::debug!("remove of unindexed path {}", path.display());
            return TripleSet::new();
        };
        for fact in facts.iter() {
            self.provenance.remove(fact);
        }
        self.hashes.remove(path);
        if let Some(subject) = self.path_to_subject.remove(path) {
            if self.subject_to_path.get(&subject) == Some(&path.to_path_buf()) {
                self.subject_to_path.remove(&subject);
            }
        }
        facts
    }

    pub fn provenance_of(&self, fact: &Fact) -> Option<&Provenance> {
        self.provenance.get(fact)
    }

    pub fn provenance_entries(&self) -> impl Iterator<Item = (&Fact, &Provenance)> {
        self.provenance.iter()
    }

    pub fn subject_of(&self, path: &Path) -> Option<&Iri> {
        self.path_to_subject.get(path)
    }

    pub fn path_of(&self, subject: &Iri) -> Option<&PathBuf> {
        self.subject_to_path.get(subject)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.path_facts.keys()
    }

    /// Every indexed path paired with its primary subject.
    pub fn documents(&self) -> impl Iterator<Item = (&PathBuf, &Iri)> {
        self.path_to_subject.iter()
    }

    pub fn document_count(&self) -> usize {
        self.path_facts.len()
    }

    pub fn fact_count(&self) -> usize {
        self.path_facts.values().map(TripleSet::len).sum()
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let documents = self
            .hashes
            .iter()
            .map(|(path, hash)| {
                let record = DocumentRecord {
                    hash: hash.clone(),
                    subject: self
                        .path_to_subject
                        .get(path)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    facts: self.path_facts.get(path).map_or(0, TripleSet::len),
                };
                (path.display().to_string(), record)
            })
            .collect();
        IndexSnapshot {
            version: SNAPSHOT_VERSION,
            documents,
        }
    }

    /// Prime hashes and subject mappings from a snapshot. Fact slices are
    /// left empty; they are re-read from the documents themselves.
    pub fn restore(snapshot: IndexSnapshot) -> Self {
        let mut index = WorkspaceIndex::new();
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::info!(
                "index snapshot version {} unsupported, starting fresh",
                snapshot.version
            );
            return index;
        }
        for (path, record) in snapshot.documents {
            let path = PathBuf::from(path);
            index.hashes.insert(path.clone(), record.hash);
            if !record.subject.is_empty() {
                let subject = Iri::new_unchecked(record.subject);
                index.claim_subject(&path, &subject);
            }
        }
        index
    }

    pub fn save_to(&self, path: &Path) -> Result<(), GraphdownError> {
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        tracing::debug!("index snapshot written to {}", path.display());
        Ok(())
    }

    /// Load a snapshot, tolerating a missing file. A corrupt snapshot is
    /// an error; deleting the file recovers.
    pub fn load_from(path: &Path) -> Result<Self, GraphdownError> {
        if !path.exists() {
            return Ok(WorkspaceIndex::new());
        }
        let text = std::fs::read_to_string(path)?;
        let snapshot: IndexSnapshot = serde_json::from_str(&text)?;
        Ok(Self::restore(snapshot))
    }
}

/// Persisted form of the index: enough to detect changes across process
/// restarts, nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub version: u32,
    pub documents: BTreeMap<String, DocumentRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub hash: String,
    pub subject: String,
    pub facts: usize,
}
