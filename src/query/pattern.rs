//! `Pattern<T>`: a clause position that is either bound to a variable name,
//! fixed to a constant, constrained by a scalar predicate while still
//! binding a variable, or left as a wildcard.
//!
//! Generalised from the teacher's `query/pattern.rs` (`Variable`/`Constant`/
//! `Blank` over `u64`) in the same way the rest of the store generalises
//! from a `u64` namespace to [`Ident`]/[`Value`], plus one addition the
//! teacher never needed: `Probe`, grounded in `spec.md` §4.7's `{?var:
//! predicate}` term — a position that binds a variable the way `Variable`
//! does, but only for rows whose field value also satisfies a scalar
//! predicate (`$eq`/`$ne`/`$gt`/`$gte`/`$lt`/`$lte`/`$in`).

use crate::datom::Value;
use crate::ident::Ident;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Pattern<T> {
    Variable(String),
    Constant(T),
    Probe(String, Vec<Predicate<T>>),
    #[default]
    Blank,
}

impl<T> Pattern<T> {
    pub fn variable(name: &str) -> Self {
        Self::Variable(name.to_string())
    }

    pub fn constant(value: T) -> Self {
        Self::Constant(value)
    }

    pub fn probe(name: &str, predicates: Vec<Predicate<T>>) -> Self {
        Self::Probe(name.to_string(), predicates)
    }

    /// The variable this position binds, whether plainly (`Variable`) or
    /// under a predicate (`Probe`). `Constant` and `Blank` bind nothing.
    pub fn variable_name(&self) -> Option<&str> {
        match self {
            Pattern::Variable(name) | Pattern::Probe(name, _) => Some(name),
            Pattern::Constant(_) | Pattern::Blank => None,
        }
    }
}

impl Pattern<Ident> {
    pub fn id(ident: Ident) -> Self {
        Self::Constant(ident)
    }
}

impl Pattern<Value> {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }
}

/// A single scalar constraint a `Probe` position's bound value must satisfy.
/// `spec.md` §6's `Operator` enum, generalised over whichever field type the
/// clause position holds (`Ident` for entity/attribute, `Value` for the
/// value position).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate<T> {
    Eq(T),
    Ne(T),
    Gt(T),
    Gte(T),
    Lt(T),
    Lte(T),
    In(Vec<T>),
}

impl<T: PartialEq + PartialOrd> Predicate<T> {
    pub fn matches(&self, actual: &T) -> bool {
        match self {
            Predicate::Eq(expected) => actual == expected,
            Predicate::Ne(expected) => actual != expected,
            Predicate::Gt(bound) => actual > bound,
            Predicate::Gte(bound) => actual >= bound,
            Predicate::Lt(bound) => actual < bound,
            Predicate::Lte(bound) => actual <= bound,
            Predicate::In(candidates) => candidates.iter().any(|candidate| candidate == actual),
        }
    }
}
