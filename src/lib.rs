//! # graphdown
//!
//! A Rust library for synchronizing Markdown documents with structured headers
//! into an RDF-style fact graph, bidirectionally.
//!
//! The name comes from "graph" + "markdown": documents stay documents, but the
//! structured statements inside them become one queryable graph.
//!
//! ## Overview
//!
//! graphdown treats a directory of text documents as a distributed database of
//! facts. Each document may open with a `---`-delimited header region stating
//! facts about the document's subject, in one of two dialects: a YAML-like
//! key-value form or a Turtle-like native triple form. Prose after the header
//! belongs to the author and is preserved byte-for-byte. Facts can also live in
//! ` ```graphdown ` fenced blocks embedded in the prose.
//!
//! The engine keeps three views consistent: the files on disk, a buffered
//! decoded form of each document, and the merged graph of every accepted fact.
//! Facts can flow both ways: decoding pulls document statements into the graph,
//! and programmatic mutations are routed back into the owning document and
//! written out without disturbing anything else in the file.
//!
//! ### Key Features
//!
//! - **Two header dialects, one model**: YAML-like headers for everyday notes,
//!   Turtle-like headers for multi-subject statements; both decode to the same
//!   [`model::Fact`] form and auto-detect on parse
//! - **Round-trip safety**: a decode/encode/decode cycle yields an equal fact
//!   set and byte-identical prose; any rendering that would break this is
//!   refused before the file is touched
//! - **Exclusive provenance**: every fact is owned by exactly one document;
//!   duplicates are demoted to diagnostics, and deleting a file retracts
//!   exactly its contribution
//! - **External-wins conflicts**: concurrent on-disk edits beat buffered
//!   mutations, always, with a diagnostic trail instead of a merge
//! - **Error tolerance**: a malformed document or embedded block sidelines
//!   itself with a per-path error or diagnostic; the rest of the workspace
//!   keeps loading
//! - **Embedded blocks**: fenced ` ```graphdown ` blocks scope facts to
//!   sub-subjects and can be regenerated in place from the live graph
//!
//! ## Architecture
//!
//! - **[`model`]**: the fact vocabulary (`Iri`, `Literal`, `Term`, `Fact`,
//!   `TripleSet`, `FactPattern`)
//! - **[`codec`]**: document decoding and encoding, dialect detection, the
//!   embedded-block scanner, and diagnostics
//! - **[`index`]**: the provenance index mapping facts to owning documents and
//!   digests for change detection
//! - **[`sync`]**: the synchronization engine tying provider, codec, index and
//!   graph together
//! - **[`workspace`]**: the document provider seam and its directory-walking
//!   default
//! - **[`query`]**: the read seam ([`query::GraphSource`]) consumers program
//!   against
//! - **[`vocab`]** / **[`schema`]**: well-known IRIs, reserved header keys, and
//!   the predicate type registry
//!
//! ## Quick Start
//!
//! ### Loading a workspace
//!
//! ```rust,no_run
//! use graphdown::{config::WorkspaceConfig, sync::SyncEngine, workspace::DirectoryProvider};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WorkspaceConfig::load(std::path::Path::new("./notes"))?;
//!     let provider = DirectoryProvider::new("./notes", config.clone());
//!     let mut engine = SyncEngine::new("./notes", config);
//!
//!     let report = engine.load(&provider).await?;
//!     println!("{report}");
//!
//!     for fact in engine.graph().iter() {
//!         println!("{fact}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Mutating the graph
//!
//! A fact inserted through the engine is routed to the document owning its
//! subject and, in immediate flush mode, written back before the call returns:
//!
//! ```rust,no_run
//! # use graphdown::{codec::SyncDiagnostic, config::WorkspaceConfig,
//! #     model::{Fact, Iri, Literal}, sync::SyncEngine, vocab,
//! #     workspace::DirectoryProvider};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let config = WorkspaceConfig::default();
//! # let provider = DirectoryProvider::new("./notes", config.clone());
//! # let mut engine = SyncEngine::new("./notes", config);
//! # engine.load(&provider).await?;
//! engine
//!     .insert_fact(Fact::new(
//!         Iri::new_unchecked("urn:doc:readme"),
//!         vocab::STATUS.clone(),
//!         Literal::text("reviewed"),
//!     ))
//!     .await?;
//!
//! let report = engine.sync(&provider).await?;
//! for diagnostic in &report.diagnostics {
//!     match diagnostic {
//!         SyncDiagnostic::DuplicateProvenance { fact, kept, .. } => {
//!             println!("{fact} already stated by {kept}");
//!         }
//!         SyncDiagnostic::ConcurrentModification { path, .. } => {
//!             println!("{path} was edited externally; disk content kept");
//!         }
//!         other => println!("{other}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! ### Documents and Dialects
//!
//! A key-value header reads like ordinary front matter:
//!
//! ```markdown
//! ---
//! title: Planning notes
//! status: active
//! tags:
//!   - roadmap
//! ---
//! Prose goes here, preserved byte-for-byte.
//! ```
//!
//! The same statements in the native triple dialect, which can also state
//! facts about other subjects:
//!
//! ```text
//! ---
//! @prefix gd: <https://graphdown.dev/schema/> .
//!
//! <urn:doc:plan> gd:title "Planning notes" ;
//!     gd:status "active" ;
//!     gd:tag "roadmap" .
//! ---
//! Prose goes here, preserved byte-for-byte.
//! ```
//!
//! Dialect detection is automatic: a header mentioning `@prefix`, `@base`, or
//! an IRI in angle brackets parses as native triples, anything else as
//! key-value. A document with no header at byte zero has no facts and is left
//! entirely alone.
//!
//! ### The Round-Trip Law
//!
//! Decoding a document and encoding it again must produce text that decodes to
//! an equal fact set, with the prose unchanged. The writers uphold this by
//! refusing to emit anything the dialect cannot faithfully express (the
//! key-value form, for instance, cannot state language-tagged text) and the
//! engine verifies the law on every flush before bytes reach the disk.
//!
//! ### Provenance and Exclusive Ownership
//!
//! Every accepted fact records the document that stated it. When two documents
//! state the same fact, the first one synced owns it and the second statement
//! becomes a [`codec::SyncDiagnostic::DuplicateProvenance`] record. Ownership
//! is what makes retraction precise: removing a file retracts exactly the
//! facts that file owned. The provenance vocabulary itself
//! (`gdp:` predicates) is never written into documents; it appears only in
//! [`sync::SyncEngine::audit_graph`] output.
//!
//! ### Conflict Policy
//!
//! The engine never merges. If a file changed on disk after it was last
//! synced, the disk content wins: buffered mutations for that document are
//! discarded with a [`codec::SyncDiagnostic::ConcurrentModification`]
//! diagnostic, and the file is re-decoded. Deletion is an edit too; a file
//! removed externally retracts its facts even if mutations were pending.
//!
//! ## Comparison to Other Tools
//!
//! - **Front-matter parsers**: read YAML headers but stop there; graphdown
//!   merges every document into one graph and writes changes back
//! - **RDF stores** (Oxigraph, rdflib): own the data in a database; graphdown
//!   keeps the documents authoritative and the graph derived
//! - **Knowledge-base apps** (Obsidian, Dendron): similar document-first
//!   stance, but graphdown is a library with typed facts and provenance, not
//!   an editor
//!
//! ## Module Guide
//!
//! Start with [`sync::SyncEngine`] for whole-workspace work, or call
//! [`codec::decode`] directly to inspect a single document. [`vocab`] lists
//! the reserved header keys and well-known predicates.

pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod model;
pub mod paths;
pub mod query;
pub mod schema;
pub mod sync;
pub mod vocab;
pub mod workspace;

pub use error::*;
