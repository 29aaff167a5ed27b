//! Workspace synchronization: the live bridge between documents on disk
//! and the merged fact graph in memory.
//!
//! The [`SyncEngine`] owns three pieces of state that must agree with
//! each other at every step:
//!
//! * the merged [`TripleSet`] of every accepted fact,
//! * the [`WorkspaceIndex`] recording which path stated which fact,
//! * a per-path [`DecodedDocument`] buffer with a lifecycle state.
//!
//! Reads go through a [`DocumentProvider`] so tests can point the engine
//! at a fixture tree. Writes go through tokio to a temporary sibling
//! file followed by a rename, and never happen before the rendered text
//! has been re-decoded and compared against the buffered facts.
//!
//! Conflict policy is external-wins: when a file changed on disk behind
//! the engine's back, the disk content replaces the buffered document
//! and the buffered mutation is dropped with a
//! [`SyncDiagnostic::ConcurrentModification`] record. The engine never
//! merges divergent edits.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    codec::{self, DecodedDocument, Dialect, EncodeOptions, SyncDiagnostic},
    config::WorkspaceConfig,
    error::GraphdownError,
    index::WorkspaceIndex,
    model::{Fact, FactPattern, Iri, Term, TripleSet},
    paths,
    query::GraphSource,
    vocab,
    workspace::DocumentProvider,
};

/// When buffered mutations reach the disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlushMode {
    /// Every mutation writes its document before returning.
    #[default]
    Immediate,
    /// Mutations accumulate in memory until [`SyncEngine::flush`].
    Batched,
}

/// Lifecycle of one document inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocState {
    /// Known path, not yet decoded.
    Unsynced,
    /// In memory and byte-consistent with the disk.
    Loaded,
    /// Carrying buffered mutations the disk has not seen.
    Dirty,
    /// Retracted; the path no longer contributes facts.
    Removed,
}

/// Digest strategy for change detection. The engine never compares file
/// contents directly, only digests of them.
pub trait ContentHasher: Send + Sync {
    fn digest(&self, bytes: &[u8]) -> String;
}

/// SHA-256, hex-encoded. The default hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

/// Counts and per-document problems from one `load`, `sync`, or `flush`
/// pass. Document-scoped failures land in `errors` with their path; the
/// pass keeps going. Only workspace-level failures abort the call.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Documents decoded for the first time.
    pub loaded: usize,
    /// Documents re-decoded because their digest changed.
    pub refreshed: usize,
    /// Documents retracted because their file disappeared.
    pub removed: usize,
    /// Documents written out.
    pub flushed: usize,
    /// Documents that failed, with the error that sidelined them.
    pub errors: Vec<(PathBuf, GraphdownError)>,
    /// Non-fatal findings from parsing and conflict resolution.
    pub diagnostics: Vec<SyncDiagnostic>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} loaded, {} refreshed, {} removed, {} flushed, {} errors, {} diagnostics",
            self.loaded,
            self.refreshed,
            self.removed,
            self.flushed,
            self.errors.len(),
            self.diagnostics.len()
        )
    }
}

/// Point-in-time engine counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Documents currently contributing to the graph.
    pub documents: usize,
    /// Facts in the merged graph.
    pub facts: usize,
    /// Documents with buffered mutations.
    pub dirty: usize,
}

impl fmt::Display for EngineStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} documents, {} facts, {} dirty",
            self.documents, self.facts, self.dirty
        )
    }
}

/// One buffered document and where it is in its lifecycle.
#[derive(Debug, Clone)]
struct DocumentEntry {
    doc: DecodedDocument,
    state: DocState,
}

/// What flushing one dirty document amounted to.
struct FlushEntryOutcome {
    wrote: bool,
    diagnostics: Vec<SyncDiagnostic>,
}

/// What refreshing one listed path amounted to.
enum Refresh {
    Unchanged,
    Loaded(Vec<SyncDiagnostic>),
    Refreshed(Vec<SyncDiagnostic>),
}

/// Optional wall-clock budget for a whole pass, checked between
/// documents. A document in progress is never interrupted.
struct Deadline(Option<Instant>);

impl Deadline {
    fn start(budget: Option<Duration>) -> Self {
        Deadline(budget.map(|limit| Instant::now() + limit))
    }

    fn exceeded(&self) -> bool {
        self.0.is_some_and(|at| Instant::now() >= at)
    }
}

/// The synchronization engine.
///
/// ```no_run
/// # use std::path::Path;
/// # use graphdown::{config::WorkspaceConfig, sync::SyncEngine, workspace::DirectoryProvider};
/// # async fn demo() -> Result<(), graphdown::GraphdownError> {
/// let config = WorkspaceConfig::load(Path::new("notes"))?;
/// let provider = DirectoryProvider::new("notes", config.clone());
/// let mut engine = SyncEngine::new("notes", config);
/// let report = engine.load(&provider).await?;
/// tracing::info!("ready: {report}");
/// # Ok(())
/// # }
/// ```
pub struct SyncEngine {
    root: PathBuf,
    config: WorkspaceConfig,
    index: WorkspaceIndex,
    graph: TripleSet,
    documents: BTreeMap<PathBuf, DocumentEntry>,
    hasher: Box<dyn ContentHasher>,
}

impl SyncEngine {
    pub fn new(root: impl Into<PathBuf>, config: WorkspaceConfig) -> Self {
        Self::with_hasher(root, config, Box::new(Sha256Hasher))
    }

    pub fn with_hasher(
        root: impl Into<PathBuf>,
        config: WorkspaceConfig,
        hasher: Box<dyn ContentHasher>,
    ) -> Self {
        SyncEngine {
            root: root.into(),
            config,
            index: WorkspaceIndex::new(),
            graph: TripleSet::new(),
            documents: BTreeMap::new(),
            hasher,
        }
    }

    /// Open a workspace: read its `graphdown.toml` and prime the index
    /// from the persisted snapshot when one exists. The snapshot holds
    /// digests and subject claims, not facts, so a [`SyncEngine::load`]
    /// pass is still required to populate the graph.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GraphdownError> {
        let root = root.into();
        let config = WorkspaceConfig::load(&root)?;
        let index = WorkspaceIndex::load_from(&root.join(&config.snapshot_file))?;
        Ok(SyncEngine {
            root,
            config,
            index,
            graph: TripleSet::new(),
            documents: BTreeMap::new(),
            hasher: Box::new(Sha256Hasher),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// The provenance index. Read-only; every mutation goes through the
    /// engine so the graph and the index move together.
    pub fn index(&self) -> &WorkspaceIndex {
        &self.index
    }

    /// The merged graph of every accepted fact. Provenance facts are
    /// not in it; see [`SyncEngine::audit_graph`].
    pub fn graph(&self) -> &TripleSet {
        &self.graph
    }

    /// Facts matching `pattern`, copied out of the merged graph.
    pub fn matching(&self, pattern: &FactPattern) -> TripleSet {
        self.graph.matching(pattern).cloned().collect()
    }

    /// The merged graph plus one synthesized
    /// `gdp:definedIn <file://...>` fact per indexed document, for
    /// queries that need to know where a subject lives. Never fed back
    /// into the encoder.
    pub fn audit_graph(&self) -> TripleSet {
        let mut graph = self.graph.clone();
        for (path, subject) in self.index.documents() {
            let location = format!("file://{}", self.root.join(path).display());
            graph.insert(Fact::new(
                subject.clone(),
                vocab::DEFINED_IN.clone(),
                Term::node(Iri::new_unchecked(location)),
            ));
        }
        graph
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            documents: self
                .documents
                .values()
                .filter(|entry| entry.state != DocState::Removed)
                .count(),
            facts: self.graph.len(),
            dirty: self
                .documents
                .values()
                .filter(|entry| entry.state == DocState::Dirty)
                .count(),
        }
    }

    /// Lifecycle state of `path`. [`DocState::Unsynced`] for paths the
    /// engine has never decoded.
    pub fn document_state(&self, path: &Path) -> DocState {
        self.documents
            .get(path)
            .map(|entry| entry.state)
            .unwrap_or(DocState::Unsynced)
    }

    /// The buffered document for `path`, when one is loaded.
    pub fn document(&self, path: &Path) -> Option<&DecodedDocument> {
        self.documents.get(path).map(|entry| &entry.doc)
    }

    /// Decode every document the provider lists and merge their facts.
    /// Documents that fail to decode are reported and skipped; the rest
    /// of the workspace still loads.
    #[tracing::instrument(skip_all)]
    pub async fn load(
        &mut self,
        provider: &dyn DocumentProvider,
    ) -> Result<SyncReport, GraphdownError> {
        let deadline = Deadline::start(self.config.sync_deadline());
        let listed = provider.list()?;
        let total = listed.len();
        let mut report = SyncReport::default();

        for (synced, path) in listed.iter().enumerate() {
            if deadline.exceeded() {
                return Err(GraphdownError::DeadlineExceeded { synced, total });
            }
            let outcome = provider
                .read(path)
                .and_then(|bytes| self.ingest(path, bytes));
            match outcome {
                Ok(diagnostics) => {
                    report.loaded += 1;
                    report.diagnostics.extend(diagnostics);
                }
                Err(e) if e.is_document_scoped() => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    report.errors.push((path.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("workspace load: {report}");
        self.save_index()?;
        Ok(report)
    }

    /// Reconcile the engine with the provider's current listing: retract
    /// documents whose file disappeared, re-decode documents whose
    /// digest changed, pick up new files. Unchanged documents are not
    /// re-read beyond hashing.
    #[tracing::instrument(skip_all)]
    pub async fn sync(
        &mut self,
        provider: &dyn DocumentProvider,
    ) -> Result<SyncReport, GraphdownError> {
        let deadline = Deadline::start(self.config.sync_deadline());
        let listed = provider.list()?;
        let total = listed.len();
        let mut report = SyncReport::default();

        let present: BTreeSet<&PathBuf> = listed.iter().collect();
        let vanished: Vec<PathBuf> = self
            .index
            .paths()
            .filter(|path| !present.contains(path))
            .cloned()
            .collect();
        for path in vanished {
            // A claimed-but-never-written document has nothing on disk
            // to vanish.
            if self.index.hash_of(&path) == Some("") {
                continue;
            }
            self.retract_document(&path, &mut report);
        }

        for (synced, path) in listed.iter().enumerate() {
            if deadline.exceeded() {
                return Err(GraphdownError::DeadlineExceeded { synced, total });
            }
            match self.refresh_one(provider, path) {
                Ok(Refresh::Unchanged) => {}
                Ok(Refresh::Loaded(diagnostics)) => {
                    report.loaded += 1;
                    report.diagnostics.extend(diagnostics);
                }
                Ok(Refresh::Refreshed(diagnostics)) => {
                    report.refreshed += 1;
                    report.diagnostics.extend(diagnostics);
                }
                Err(e) if e.is_document_scoped() => {
                    tracing::warn!("skipping {}: {e}", path.display());
                    report.errors.push((path.clone(), e));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("workspace sync: {report}");
        self.save_index()?;
        Ok(report)
    }

    /// State a fact. Routed to the document owning its subject; a fact
    /// about an unknown subject creates a new document at the subject's
    /// canonical path. In immediate flush mode the owning document is
    /// written before this returns; an error from that write leaves the
    /// mutation buffered and the document dirty.
    pub async fn insert_fact(&mut self, fact: Fact) -> Result<(), GraphdownError> {
        let path = match self.owner_of(&fact.subject) {
            Some(path) => path,
            None => self.create_document(&fact.subject)?,
        };
        if let Some(entry) = self.documents.get_mut(&path) {
            entry.doc.layout.note_subject(&fact.subject);
            entry.doc.layout.note_predicate(&fact.subject, &fact.predicate);
            entry.doc.facts.insert(fact.clone());
            entry.state = DocState::Dirty;
        }
        self.graph.insert(fact);
        if self.config.flush_mode == FlushMode::Immediate {
            self.flush_entry(&path).await?;
        }
        Ok(())
    }

    /// Retract one fact. A fact the graph does not hold is a logged
    /// no-op. Returns whether anything was retracted.
    pub async fn retract_fact(&mut self, fact: &Fact) -> Result<bool, GraphdownError> {
        let Some(path) = self.owner_of_fact(fact) else {
            tracing::debug!("retract of unknown fact {fact}");
            return Ok(false);
        };
        let removed = self.apply_retract(&path, fact);
        if removed && self.config.flush_mode == FlushMode::Immediate {
            self.flush_entry(&path).await?;
        }
        Ok(removed)
    }

    /// Retract every fact matching `pattern`, routing each to its owning
    /// document. Returns how many facts were retracted.
    pub async fn retract_matching(
        &mut self,
        pattern: &FactPattern,
    ) -> Result<usize, GraphdownError> {
        let matches: Vec<Fact> = self.graph.matching(pattern).cloned().collect();
        let mut touched = BTreeSet::new();
        let mut count = 0;
        for fact in &matches {
            let Some(path) = self.owner_of_fact(fact) else {
                tracing::debug!("matched fact {fact} has no owning document");
                continue;
            };
            if self.apply_retract(&path, fact) {
                count += 1;
                touched.insert(path);
            }
        }
        if self.config.flush_mode == FlushMode::Immediate {
            for path in touched {
                self.flush_entry(&path).await?;
            }
        }
        Ok(count)
    }

    /// Write every dirty document back to disk, dirtiest path order.
    /// Each document is re-decoded from its rendered text and compared
    /// against the buffer before anything touches the file; a mismatch
    /// sidelines that document with [`GraphdownError::RoundTrip`] and
    /// writes nothing.
    #[tracing::instrument(skip_all)]
    pub async fn flush(&mut self) -> Result<SyncReport, GraphdownError> {
        let dirty: Vec<PathBuf> = self
            .documents
            .iter()
            .filter(|(_, entry)| entry.state == DocState::Dirty)
            .map(|(path, _)| path.clone())
            .collect();
        let mut report = SyncReport::default();

        for path in dirty {
            match self.flush_entry(&path).await {
                Ok(outcome) => {
                    if outcome.wrote {
                        report.flushed += 1;
                    }
                    report.diagnostics.extend(outcome.diagnostics);
                }
                Err(e) if e.is_document_scoped() => {
                    tracing::warn!("flush of {} failed: {e}", path.display());
                    report.errors.push((path, e));
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("workspace flush: {report}");
        self.save_index()?;
        Ok(report)
    }

    /// Persist the provenance index snapshot into the workspace.
    pub fn save_index(&self) -> Result<(), GraphdownError> {
        self.index.save_to(&self.root.join(&self.config.snapshot_file))
    }

    /// Decode `bytes` as the new content of `path`, replacing whatever
    /// the path contributed before. Nothing changes on error.
    fn ingest(
        &mut self,
        path: &Path,
        bytes: Vec<u8>,
    ) -> Result<Vec<SyncDiagnostic>, GraphdownError> {
        let hash = self.hasher.digest(&bytes);
        let text = String::from_utf8(bytes).map_err(|e| {
            GraphdownError::Codec(format!("{}: not valid UTF-8: {e}", path.display()))
        })?;
        let mut doc = codec::decode(path, &text)?;

        let previous = self.index.facts_of(path);
        let recorded = self
            .index
            .record_sync(path, hash, &doc.subject, &doc.facts, &doc.origins)?;
        for fact in previous.iter() {
            self.graph.remove(fact);
        }
        self.graph.extend(recorded.accepted.iter().cloned());

        let mut diagnostics = std::mem::take(&mut doc.diagnostics);
        diagnostics.extend(recorded.diagnostics);
        tracing::debug!(
            "ingested {} as <{}> ({} facts)",
            path.display(),
            doc.subject,
            recorded.accepted.len()
        );
        self.documents.insert(
            path.to_path_buf(),
            DocumentEntry {
                doc,
                state: DocState::Loaded,
            },
        );
        Ok(diagnostics)
    }

    /// Hash the file behind `path` and re-ingest it when it changed or
    /// was never buffered.
    fn refresh_one(
        &mut self,
        provider: &dyn DocumentProvider,
        path: &Path,
    ) -> Result<Refresh, GraphdownError> {
        let bytes = provider.read(path)?;
        let hash = self.hasher.digest(&bytes);
        if !self.index.changed_since(path, &hash) && self.documents.contains_key(path) {
            return Ok(Refresh::Unchanged);
        }

        let known = self.index.subject_of(path).is_some();
        let buffered = self
            .documents
            .get(path)
            .filter(|entry| entry.state == DocState::Dirty)
            .map(|entry| entry.doc.facts.clone());

        let ingest_diagnostics = self.ingest(path, bytes)?;

        let mut diagnostics = Vec::new();
        if let Some(buffered) = buffered {
            let kept = self.index.facts_of(path);
            let dropped = buffered.difference(&kept).len();
            tracing::warn!(
                "{} changed on disk with {dropped} buffered facts pending; disk wins",
                path.display()
            );
            self.drop_unowned(&buffered);
            diagnostics.push(SyncDiagnostic::concurrent_modification(
                path.display().to_string(),
                dropped,
            ));
        }
        diagnostics.extend(ingest_diagnostics);

        Ok(if known {
            Refresh::Refreshed(diagnostics)
        } else {
            Refresh::Loaded(diagnostics)
        })
    }

    /// Retract everything `path` contributes: its index slice, its share
    /// of the graph, and any buffered facts nothing else owns.
    fn retract_document(&mut self, path: &Path, report: &mut SyncReport) {
        let slice = self.index.remove(path);
        for fact in slice.iter() {
            self.graph.remove(fact);
        }
        if let Some(entry) = self.documents.get_mut(path) {
            if entry.state == DocState::Dirty {
                tracing::warn!(
                    "{} deleted on disk with {} buffered facts pending; deletion wins",
                    path.display(),
                    entry.doc.facts.len()
                );
                report.diagnostics.push(SyncDiagnostic::concurrent_modification(
                    path.display().to_string(),
                    entry.doc.facts.len(),
                ));
            }
            entry.state = DocState::Removed;
            let buffered = entry.doc.facts.clone();
            self.drop_unowned(&buffered);
        }
        tracing::info!("retracted {} ({} facts)", path.display(), slice.len());
        report.removed += 1;
    }

    /// Remove from the graph every fact in `facts` that no document owns
    /// anymore. Facts with surviving provenance stay.
    fn drop_unowned(&mut self, facts: &TripleSet) {
        for fact in facts.iter() {
            if self.index.provenance_of(fact).is_none() {
                self.graph.remove(fact);
            }
        }
    }

    /// The path that owns `subject`: its own document, or the document
    /// of the base subject it is scoped under.
    fn owner_of(&self, subject: &Iri) -> Option<PathBuf> {
        if let Some(path) = self.index.path_of(subject) {
            return Some(path.clone());
        }
        self.index.path_of(&base_subject(subject)).cloned()
    }

    /// The path that owns `fact`: recorded provenance first, then the
    /// subject's document for facts never yet flushed.
    fn owner_of_fact(&self, fact: &Fact) -> Option<PathBuf> {
        self.index
            .provenance_of(fact)
            .map(|provenance| provenance.path.clone())
            .or_else(|| self.owner_of(&fact.subject))
    }

    /// Start a new document for `subject` at its canonical path, claiming
    /// the subject in the index so later mutations route to it. Written
    /// on first flush.
    fn create_document(&mut self, subject: &Iri) -> Result<PathBuf, GraphdownError> {
        let base = base_subject(subject);
        let path = self.unclaimed_path_for(&base);
        self.index
            .record_sync(&path, "", &base, &TripleSet::new(), &BTreeMap::new())?;
        self.documents.insert(
            path.clone(),
            DocumentEntry {
                doc: DecodedDocument::empty(base.clone(), Dialect::NativeTriple),
                state: DocState::Dirty,
            },
        );
        tracing::info!("created {} for <{base}>", path.display());
        Ok(path)
    }

    /// The canonical path for `subject`, suffixed with a counter when
    /// another subject already sits there.
    fn unclaimed_path_for(&self, subject: &Iri) -> PathBuf {
        let candidate = paths::path_for_subject(subject, &self.config.canonical_extension);
        if self.path_is_free(&candidate) {
            return candidate;
        }
        let stem = candidate.with_extension("");
        let mut counter = 2usize;
        loop {
            let alternative = PathBuf::from(format!(
                "{}-{counter}.{}",
                stem.display(),
                self.config.canonical_extension
            ));
            if self.path_is_free(&alternative) {
                return alternative;
            }
            counter += 1;
        }
    }

    fn path_is_free(&self, path: &Path) -> bool {
        self.index.subject_of(path).is_none()
            && self
                .documents
                .get(path)
                .is_none_or(|entry| entry.state == DocState::Removed)
    }

    /// Remove `fact` from its owning document's buffer and the graph.
    fn apply_retract(&mut self, path: &Path, fact: &Fact) -> bool {
        let Some(entry) = self.documents.get_mut(path) else {
            tracing::debug!("retract routed to unloaded document {}", path.display());
            return false;
        };
        if !entry.doc.facts.remove(fact) {
            return false;
        }
        entry.state = DocState::Dirty;
        self.graph.remove(fact);
        true
    }

    /// Write one dirty document: conflict check, render, round-trip
    /// verify, then temp-file-and-rename. On a conflict the disk wins
    /// and nothing is written.
    async fn flush_entry(&mut self, path: &Path) -> Result<FlushEntryOutcome, GraphdownError> {
        let Some(entry) = self.documents.get(path) else {
            return Err(GraphdownError::NotFound(format!(
                "no buffered document for {}",
                path.display()
            )));
        };
        if entry.state != DocState::Dirty {
            return Ok(FlushEntryOutcome {
                wrote: false,
                diagnostics: Vec::new(),
            });
        }
        let doc = entry.doc.clone();
        let absolute = self.root.join(path);

        match tokio::fs::read(&absolute).await {
            Ok(disk) => {
                let disk_hash = self.hasher.digest(&disk);
                if self.index.changed_since(path, &disk_hash) {
                    return self.resolve_external_edit(path, disk, &doc);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.index.hash_of(path).is_some_and(|hash| !hash.is_empty()) {
                    return self.resolve_external_delete(path, &doc);
                }
                // Never written before; create it below.
            }
            Err(e) => return Err(GraphdownError::from(e)),
        }

        let options = EncodeOptions {
            regenerate_blocks: self.config.regenerate_blocks,
        };
        let text = codec::encode(&doc, &options)?;
        let reparsed = codec::decode(path, &text)?;
        if reparsed.facts != doc.facts {
            let lost = doc.facts.difference(&reparsed.facts).len();
            let invented = reparsed.facts.difference(&doc.facts).len();
            return Err(GraphdownError::RoundTrip {
                path: path.display().to_string(),
                detail: format!(
                    "re-decoding the rendered text lost {lost} facts and invented {invented}"
                ),
            });
        }

        if let Some(parent) = absolute.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = temp_sibling(&absolute)?;
        tokio::fs::write(&temp, text.as_bytes()).await?;
        tokio::fs::rename(&temp, &absolute).await?;

        let hash = self.hasher.digest(text.as_bytes());
        let recorded =
            self.index
                .record_sync(path, hash, &reparsed.subject, &reparsed.facts, &reparsed.origins)?;
        if let Some(entry) = self.documents.get_mut(path) {
            entry.doc = reparsed;
            entry.state = DocState::Loaded;
        }
        tracing::info!("flushed {} ({} bytes)", path.display(), text.len());
        Ok(FlushEntryOutcome {
            wrote: true,
            diagnostics: recorded.diagnostics,
        })
    }

    /// The file changed behind the buffer. Disk wins: re-ingest it and
    /// drop the buffered mutation.
    fn resolve_external_edit(
        &mut self,
        path: &Path,
        disk: Vec<u8>,
        buffered: &DecodedDocument,
    ) -> Result<FlushEntryOutcome, GraphdownError> {
        tracing::warn!(
            "{} changed on disk since last sync; disk content wins",
            path.display()
        );
        let ingest_diagnostics = self.ingest(path, disk)?;
        let kept = self.index.facts_of(path);
        let dropped = buffered.facts.difference(&kept).len();
        self.drop_unowned(&buffered.facts);
        let mut diagnostics = vec![SyncDiagnostic::concurrent_modification(
            path.display().to_string(),
            dropped,
        )];
        diagnostics.extend(ingest_diagnostics);
        Ok(FlushEntryOutcome {
            wrote: false,
            diagnostics,
        })
    }

    /// The file vanished behind the buffer. Deletion wins: retract the
    /// document and drop the buffered mutation.
    fn resolve_external_delete(
        &mut self,
        path: &Path,
        buffered: &DecodedDocument,
    ) -> Result<FlushEntryOutcome, GraphdownError> {
        tracing::warn!(
            "{} deleted on disk since last sync; deletion wins",
            path.display()
        );
        let slice = self.index.remove(path);
        for fact in slice.iter() {
            self.graph.remove(fact);
        }
        self.drop_unowned(&buffered.facts);
        if let Some(entry) = self.documents.get_mut(path) {
            entry.state = DocState::Removed;
        }
        Ok(FlushEntryOutcome {
            wrote: false,
            diagnostics: vec![SyncDiagnostic::concurrent_modification(
                path.display().to_string(),
                buffered.facts.len(),
            )],
        })
    }
}

impl GraphSource for SyncEngine {
    fn graph(&self) -> &TripleSet {
        self.graph()
    }

    fn matching(&self, pattern: &FactPattern) -> TripleSet {
        self.matching(pattern)
    }

    fn audit_graph(&self) -> TripleSet {
        self.audit_graph()
    }
}

/// `subject` without its fragment: the subject its document is keyed by.
fn base_subject(subject: &Iri) -> Iri {
    match subject.as_str().split_once('#') {
        Some((base, _)) => Iri::new_unchecked(base),
        None => subject.clone(),
    }
}

fn temp_sibling(path: &Path) -> Result<PathBuf, GraphdownError> {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Err(GraphdownError::Io(format!(
            "cannot derive a temporary name for {}",
            path.display()
        )));
    };
    Ok(path.with_file_name(format!(".{name}.tmp")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::Literal, workspace::DirectoryProvider};
    use std::fs;

    fn workspace() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("alpha.md"),
            "---\ntitle: Alpha\ntags:\n  - one\n  - two\n---\nAlpha prose.\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("beta.md"),
            "---\n@prefix gd: <https://graphdown.dev/schema/> .\n\n<urn:doc:beta> gd:title \"Beta\" .\n---\nBeta prose.\n",
        )
        .unwrap();
        dir
    }

    fn engine_for(dir: &tempfile::TempDir, config: WorkspaceConfig) -> (SyncEngine, DirectoryProvider) {
        let provider = DirectoryProvider::new(dir.path(), config.clone());
        let engine = SyncEngine::new(dir.path(), config);
        (engine, provider)
    }

    fn subject(name: &str) -> Iri {
        Iri::new_unchecked(format!("urn:doc:{name}"))
    }

    #[test_log::test(tokio::test)]
    async fn test_load_populates_graph_and_index() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());

        let report = engine.load(&provider).await.unwrap();
        assert_eq!(report.loaded, 2);
        assert!(report.is_clean());

        let stats = engine.stats();
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.facts, 4);
        assert_eq!(stats.dirty, 0);

        let title = Fact::new(subject("alpha"), vocab::TITLE.clone(), Literal::text("Alpha"));
        assert!(engine.graph().contains(&title));
        assert_eq!(
            engine.index().provenance_of(&title).unwrap().path,
            PathBuf::from("alpha.md")
        );
        assert!(dir.path().join(".graphdown-index.json").exists());
    }

    #[test_log::test(tokio::test)]
    async fn test_insert_immediate_writes_owning_document() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        engine
            .insert_fact(Fact::new(
                subject("alpha"),
                vocab::STATUS.clone(),
                Literal::text("active"),
            ))
            .await
            .unwrap();

        assert_eq!(engine.document_state(Path::new("alpha.md")), DocState::Loaded);
        let written = fs::read_to_string(dir.path().join("alpha.md")).unwrap();
        assert!(written.contains("status: active"));
        assert!(written.ends_with("Alpha prose.\n"));
    }

    #[test_log::test(tokio::test)]
    async fn test_insert_unknown_subject_creates_document() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        engine
            .insert_fact(Fact::new(
                subject("notes/gamma"),
                vocab::TITLE.clone(),
                Literal::text("Gamma"),
            ))
            .await
            .unwrap();

        let created = dir.path().join("notes").join("gamma.md");
        let written = fs::read_to_string(created).unwrap();
        assert!(written.starts_with("---\n"));
        assert!(written.contains("gd:title \"Gamma\""));
        assert_eq!(
            engine.index().path_of(&subject("notes/gamma")).unwrap(),
            &PathBuf::from("notes/gamma.md")
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_batched_mutations_stay_buffered_until_flush() {
        let dir = workspace();
        let config = WorkspaceConfig {
            flush_mode: FlushMode::Batched,
            ..WorkspaceConfig::default()
        };
        let (mut engine, provider) = engine_for(&dir, config);
        engine.load(&provider).await.unwrap();
        let before = fs::read_to_string(dir.path().join("alpha.md")).unwrap();

        engine
            .insert_fact(Fact::new(
                subject("alpha"),
                vocab::STATUS.clone(),
                Literal::text("active"),
            ))
            .await
            .unwrap();

        assert_eq!(engine.document_state(Path::new("alpha.md")), DocState::Dirty);
        assert_eq!(fs::read_to_string(dir.path().join("alpha.md")).unwrap(), before);

        let report = engine.flush().await.unwrap();
        assert_eq!(report.flushed, 1);
        assert_eq!(engine.document_state(Path::new("alpha.md")), DocState::Loaded);
        let after = fs::read_to_string(dir.path().join("alpha.md")).unwrap();
        assert!(after.contains("status: active"));
    }

    #[test_log::test(tokio::test)]
    async fn test_retract_matching_routes_and_counts() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        let pattern = FactPattern::any().with_predicate(vocab::TAG.clone());
        let count = engine.retract_matching(&pattern).await.unwrap();
        assert_eq!(count, 2);

        let written = fs::read_to_string(dir.path().join("alpha.md")).unwrap();
        assert!(!written.contains("tags"));
        assert!(engine.matching(&pattern).is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_retract_unknown_fact_is_a_noop() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        let ghost = Fact::new(subject("alpha"), vocab::SUMMARY.clone(), Literal::text("?"));
        assert!(!engine.retract_fact(&ghost).await.unwrap());
        assert_eq!(engine.stats().dirty, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_external_edit_wins_over_buffered_mutation() {
        let dir = workspace();
        let config = WorkspaceConfig {
            flush_mode: FlushMode::Batched,
            ..WorkspaceConfig::default()
        };
        let (mut engine, provider) = engine_for(&dir, config);
        engine.load(&provider).await.unwrap();

        engine
            .insert_fact(Fact::new(
                subject("alpha"),
                vocab::STATUS.clone(),
                Literal::text("buffered"),
            ))
            .await
            .unwrap();
        fs::write(
            dir.path().join("alpha.md"),
            "---\ntitle: Alpha revised\n---\nNew prose.\n",
        )
        .unwrap();

        let report = engine.flush().await.unwrap();
        assert_eq!(report.flushed, 0);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| d.is_concurrent_modification()));

        let revised = Fact::new(
            subject("alpha"),
            vocab::TITLE.clone(),
            Literal::text("Alpha revised"),
        );
        let buffered = Fact::new(
            subject("alpha"),
            vocab::STATUS.clone(),
            Literal::text("buffered"),
        );
        assert!(engine.graph().contains(&revised));
        assert!(!engine.graph().contains(&buffered));
        let on_disk = fs::read_to_string(dir.path().join("alpha.md")).unwrap();
        assert!(on_disk.contains("Alpha revised"));
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_retracts_deleted_documents() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();
        assert_eq!(engine.graph().len(), 4);

        fs::remove_file(dir.path().join("alpha.md")).unwrap();
        let report = engine.sync(&provider).await.unwrap();
        assert_eq!(report.removed, 1);

        assert_eq!(engine.document_state(Path::new("alpha.md")), DocState::Removed);
        assert_eq!(engine.graph().len(), 1);
        assert!(engine.index().subject_of(Path::new("alpha.md")).is_none());
    }

    #[test_log::test(tokio::test)]
    async fn test_sync_picks_up_new_and_changed_files() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        fs::write(
            dir.path().join("alpha.md"),
            "---\ntitle: Alpha v2\n---\nAlpha prose.\n",
        )
        .unwrap();
        fs::write(dir.path().join("delta.md"), "---\ntitle: Delta\n---\n").unwrap();

        let report = engine.sync(&provider).await.unwrap();
        assert_eq!(report.refreshed, 1);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.removed, 0);

        let v2 = Fact::new(subject("alpha"), vocab::TITLE.clone(), Literal::text("Alpha v2"));
        let v1 = Fact::new(subject("alpha"), vocab::TITLE.clone(), Literal::text("Alpha"));
        assert!(engine.graph().contains(&v2));
        assert!(!engine.graph().contains(&v1));
        assert!(engine.graph().contains(&Fact::new(
            subject("delta"),
            vocab::TITLE.clone(),
            Literal::text("Delta")
        )));
    }

    #[test_log::test(tokio::test)]
    async fn test_audit_graph_locates_every_document() {
        let dir = workspace();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());
        engine.load(&provider).await.unwrap();

        let audit = engine.audit_graph();
        assert_eq!(audit.len(), engine.graph().len() + 2);
        let pattern = FactPattern::any().with_predicate(vocab::DEFINED_IN.clone());
        let located: Vec<&Fact> = audit.matching(&pattern).collect();
        assert_eq!(located.len(), 2);
        for fact in located {
            let target = fact.object.as_node().unwrap().as_str();
            assert!(target.starts_with("file://"));
            assert!(target.ends_with(".md"));
        }
        // Synthesized facts never land in the serializable graph.
        assert_eq!(engine.graph().len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn test_zero_deadline_means_unlimited() {
        let dir = workspace();
        let config = WorkspaceConfig {
            sync_deadline_ms: 0,
            ..WorkspaceConfig::default()
        };
        let (mut engine, provider) = engine_for(&dir, config);
        assert!(engine.load(&provider).await.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn test_unreadable_document_is_sidelined_not_fatal() {
        let dir = workspace();
        fs::write(dir.path().join("binary.md"), [0xff, 0xfe, 0x00, 0x01]).unwrap();
        let (mut engine, provider) = engine_for(&dir, WorkspaceConfig::default());

        let report = engine.load(&provider).await.unwrap();
        assert_eq!(report.loaded, 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, PathBuf::from("binary.md"));
        assert_eq!(engine.stats().documents, 2);
    }

    #[test]
    fn test_base_subject_strips_fragments() {
        assert_eq!(
            base_subject(&Iri::new_unchecked("urn:doc:a#contact")).as_str(),
            "urn:doc:a"
        );
        assert_eq!(base_subject(&subject("a")), subject("a"));
    }

    #[test]
    fn test_temp_sibling_is_hidden_neighbor() {
        let temp = temp_sibling(Path::new("notes/alpha.md")).unwrap();
        assert_eq!(temp, PathBuf::from("notes/.alpha.md.tmp"));
    }
}
