//! Expected-type schema for predicates.
//!
//! Key-value headers carry untyped-ish scalars, and "looks numeric" is not
//! evidence of being numeric: identifier codes such as `51990-0` must stay
//! strings. Literal conversion is therefore gated on a per-predicate
//! expected type. Scalars convert to numbers, dates or booleans only when
//! the predicate's registered type says so; predicates without a
//! registration keep the scalar's native typing untouched.
//!
//! The registry is runtime-extensible so downstream vocabularies can
//! register their own predicates, mirroring the global codec registration
//! pattern used elsewhere in the crate.

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::{
    model::{is_date_lexeme, Iri, Literal, LiteralKind},
    vocab,
};

/// Global singleton schema with the built-in vocabulary registered.
pub static SCHEMA: Lazy<PredicateSchema> = Lazy::new(PredicateSchema::create);

/// The value kind a predicate expects in object position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
}

/// Thread-safe predicate → expected-type registry.
pub struct PredicateSchema(Arc<RwLock<HashMap<Iri, ExpectedType>>>);

impl Clone for PredicateSchema {
    fn clone(&self) -> Self {
        PredicateSchema(self.0.clone())
    }
}

impl PredicateSchema {
    /// Create a registry with the built-in graphdown vocabulary.
    pub fn create() -> Self {
        let schema = PredicateSchema(Arc::new(RwLock::new(HashMap::new())));

        schema.register(vocab::PRIORITY.clone(), ExpectedType::Integer);
        schema.register(vocab::CREATED.clone(), ExpectedType::Date);
        schema.register(vocab::UPDATED.clone(), ExpectedType::Date);
        schema.register(vocab::TITLE.clone(), ExpectedType::Text);
        schema.register(vocab::SUMMARY.clone(), ExpectedType::Text);
        schema.register(vocab::STATUS.clone(), ExpectedType::Text);
        schema.register(vocab::TAG.clone(), ExpectedType::Text);
        schema.register(vocab::ID.clone(), ExpectedType::Text);

        schema
    }

    /// Register an expected type for a predicate. Overwrites log at info
    /// level so downstream registrations are visible.
    pub fn register(&self, predicate: Iri, expected: ExpectedType) {
        let mut writer = self.0.write();
        if writer.contains_key(&predicate) {
            tracing::info!(
                "[PredicateSchema::register] Overwriting expected type for {predicate}"
            );
        }
        writer.insert(predicate, expected);
    }

    pub fn get(&self, predicate: &Iri) -> Option<ExpectedType> {
        self.0.read().get(predicate).copied()
    }

    /// All registered predicates, in identifier order.
    pub fn list(&self) -> Vec<Iri> {
        let mut predicates: Vec<Iri> = self.0.read().keys().cloned().collect();
        predicates.sort();
        predicates
    }

    /// Apply the conversion gate to a literal bound for `predicate`.
    ///
    /// Text lexemes convert to the expected kind only when registered and
    /// shape-valid; natively-typed values under a `Text` expectation get
    /// their lexical form preserved as text. Everything else passes
    /// through unchanged.
    pub fn coerce(&self, predicate: &Iri, literal: Literal) -> Literal {
        let Some(expected) = self.get(predicate) else {
            return literal;
        };
        match (expected, literal.kind()) {
            (ExpectedType::Integer, LiteralKind::Text) if is_integer_lexeme(literal.lexeme()) => {
                Literal::integer_lexeme(literal.lexeme())
            }
            (ExpectedType::Decimal, LiteralKind::Text) if is_decimal_lexeme(literal.lexeme()) => {
                Literal::decimal_lexeme(literal.lexeme())
            }
            (ExpectedType::Decimal, LiteralKind::Integer) => {
                Literal::decimal_lexeme(literal.lexeme())
            }
            (ExpectedType::Boolean, LiteralKind::Text)
                if matches!(literal.lexeme(), "true" | "false") =>
            {
                Literal::boolean(literal.lexeme() == "true")
            }
            (ExpectedType::Date, LiteralKind::Text) if is_date_lexeme(literal.lexeme()) => {
                Literal::date(literal.lexeme())
            }
            (
                ExpectedType::Text,
                LiteralKind::Integer | LiteralKind::Decimal | LiteralKind::Boolean,
            ) => Literal::text(literal.lexeme()),
            _ => literal,
        }
    }
}

pub fn is_integer_lexeme(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_decimal_lexeme(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let Some((whole, frac)) = unsigned.split_once('.') else {
        return is_integer_lexeme(s);
    };
    !(whole.is_empty() && frac.is_empty())
        && whole.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}
