//! Namespace constants and the reserved-key vocabulary.
//!
//! Documents in the key-value dialect use short keys (`title`, `tags`,
//! `parent`) that map onto fixed predicates in the graphdown schema
//! namespace. The table here is the single source of truth for that mapping
//! in both directions: the parser resolves keys through
//! [key_to_predicate], the writer picks the canonical key for a predicate
//! through [canonical_key].

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::model::Iri;

/// Document schema namespace. Predicates for titles, tags, hierarchy and
/// cross-document relations live here.
pub const SCHEMA_NS: &str = "https://graphdown.dev/schema/";

/// Internal provenance namespace. Facts under it are bookkeeping and are
/// never serialized into documents.
pub const PROVENANCE_NS: &str = "https://graphdown.dev/provenance/";

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema#";

pub fn schema(name: &str) -> Iri {
    Iri::new_unchecked(format!("{SCHEMA_NS}{name}"))
}

pub fn provenance(name: &str) -> Iri {
    Iri::new_unchecked(format!("{PROVENANCE_NS}{name}"))
}

pub fn rdf(name: &str) -> Iri {
    Iri::new_unchecked(format!("{RDF_NS}{name}"))
}

pub fn xsd(name: &str) -> Iri {
    Iri::new_unchecked(format!("{XSD_NS}{name}"))
}

pub static RDF_TYPE: Lazy<Iri> = Lazy::new(|| rdf("type"));
pub static TITLE: Lazy<Iri> = Lazy::new(|| schema("title"));
pub static SUMMARY: Lazy<Iri> = Lazy::new(|| schema("summary"));
pub static TAG: Lazy<Iri> = Lazy::new(|| schema("tag"));
pub static PART_OF: Lazy<Iri> = Lazy::new(|| schema("partOf"));
pub static HAS_PART: Lazy<Iri> = Lazy::new(|| schema("hasPart"));
pub static RELATES_TO: Lazy<Iri> = Lazy::new(|| schema("relatesTo"));
pub static SOURCE: Lazy<Iri> = Lazy::new(|| schema("source"));
pub static CREATED: Lazy<Iri> = Lazy::new(|| schema("created"));
pub static UPDATED: Lazy<Iri> = Lazy::new(|| schema("updated"));
pub static STATUS: Lazy<Iri> = Lazy::new(|| schema("status"));
pub static PRIORITY: Lazy<Iri> = Lazy::new(|| schema("priority"));
pub static ID: Lazy<Iri> = Lazy::new(|| schema("id"));

/// Provenance predicate linking a subject to the `file://` identifier of
/// the document that defines it. Synthesized for audit queries only.
pub static DEFINED_IN: Lazy<Iri> = Lazy::new(|| provenance("definedIn"));

/// Reserved header keys in declaration order. The first key listed for a
/// predicate is its canonical spelling; later entries are accepted
/// aliases.
pub static RESERVED_KEYS: Lazy<Vec<(&'static str, Iri)>> = Lazy::new(|| {
    vec![
        ("type", RDF_TYPE.clone()),
        ("title", TITLE.clone()),
        ("summary", SUMMARY.clone()),
        ("description", SUMMARY.clone()),
        ("tags", TAG.clone()),
        ("parent", PART_OF.clone()),
        ("children", HAS_PART.clone()),
        ("relates-to", RELATES_TO.clone()),
        ("relates_to", RELATES_TO.clone()),
        ("source", SOURCE.clone()),
        ("sources", SOURCE.clone()),
        ("created", CREATED.clone()),
        ("updated", UPDATED.clone()),
        ("status", STATUS.clone()),
        ("priority", PRIORITY.clone()),
        ("id", ID.clone()),
    ]
});

static KEY_TO_PREDICATE: Lazy<BTreeMap<&'static str, Iri>> = Lazy::new(|| {
    RESERVED_KEYS
        .iter()
        .map(|(key, predicate)| (*key, predicate.clone()))
        .collect()
});

static CANONICAL_KEY: Lazy<BTreeMap<Iri, &'static str>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for (key, predicate) in RESERVED_KEYS.iter() {
        map.entry(predicate.clone()).or_insert(*key);
    }
    map
});

/// Resolve a header key to its predicate. Reserved keys use the fixed
/// table; scheme-qualified keys are taken verbatim as predicates; anything
/// else lands in the schema namespace under a sanitized name.
pub fn key_to_predicate(key: &str) -> Iri {
    if let Some(predicate) = KEY_TO_PREDICATE.get(key) {
        return predicate.clone();
    }
    if let Ok(iri) = Iri::new(key) {
        return iri;
    }
    schema(&sanitize_key(key))
}

/// The canonical header key for a predicate: the reserved spelling when
/// there is one, the schema-local name for generic schema predicates, and
/// the full identifier otherwise.
pub fn canonical_key(predicate: &Iri) -> String {
    if let Some(key) = CANONICAL_KEY.get(predicate) {
        return (*key).to_string();
    }
    match predicate.as_str().strip_prefix(SCHEMA_NS) {
        Some(local) => local.to_string(),
        None => predicate.as_str().to_string(),
    }
}

/// Replace characters that cannot appear in an identifier segment.
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "key".to_string()
    } else {
        cleaned
    }
}

/// Prefixes the native-dialect writer may rely on without a document-local
/// declaration. Emitted as `@prefix` lines when used.
pub static STANDARD_PREFIXES: Lazy<Vec<(&'static str, &'static str)>> =
    Lazy::new(|| vec![("gd", SCHEMA_NS), ("rdf", RDF_NS), ("xsd", XSD_NS)]);
