//! The read seam between the engine and whatever consumes the graph.
//!
//! Query planning, traversal and any richer query surface live outside
//! this crate. Consumers program against [`GraphSource`] so they can be
//! handed a live [`crate::sync::SyncEngine`], a snapshot, or a test
//! fixture interchangeably.

use crate::model::{Fact, FactPattern, Iri, Term, TripleSet};

/// Read access to a merged fact graph.
pub trait GraphSource {
    /// The merged content graph. Provenance facts are not part of it.
    fn graph(&self) -> &TripleSet;

    /// Facts matching `pattern`, copied out.
    fn matching(&self, pattern: &FactPattern) -> TripleSet {
        self.graph().matching(pattern).cloned().collect()
    }

    /// The content graph plus synthesized provenance facts locating each
    /// subject's document.
    fn audit_graph(&self) -> TripleSet;

    /// Every fact stated about `subject`.
    fn facts_about(&self, subject: &Iri) -> TripleSet {
        self.graph().filter_subject(subject)
    }

    /// Objects of `(subject, predicate, ?)`, in graph order.
    fn objects(&self, subject: &Iri, predicate: &Iri) -> Vec<Term> {
        let pattern = FactPattern::any()
            .with_subject(subject.clone())
            .with_predicate(predicate.clone());
        self.graph()
            .matching(&pattern)
            .map(|fact| fact.object.clone())
            .collect()
    }
}

/// A frozen graph is a source too; useful for snapshots and fixtures.
impl GraphSource for TripleSet {
    fn graph(&self) -> &TripleSet {
        self
    }

    fn audit_graph(&self) -> TripleSet {
        self.clone()
    }
}
