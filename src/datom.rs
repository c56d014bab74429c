//! The five-tuple datom and the value types that can occupy its `v` slot.
//!
//! Generalises the teacher's `Value`/`Op`/`Datom` (originally `u64`-keyed,
//! fixed to a small set of scalar variants) to the spec's data model: every
//! position except `v` is always an [`Ident`], and `v` is either an `Ident`
//! (a reference to another entity) or one of a small set of literal scalars.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ident::Ident;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Ident(Ident),
    Str(String),
    Int(i64),
    Float(OrderedFloat<f64>),
    Bool(bool),
    /// Stored as milliseconds since the epoch so the derived `Ord` gives the
    /// natural chronological order.
    Instant(i64),
}

impl Value {
    pub fn instant(at: OffsetDateTime) -> Self {
        Value::Instant((at.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    pub fn as_ident(&self) -> Option<Ident> {
        match self {
            Value::Ident(ident) => Some(*ident),
            _ => None,
        }
    }

    /// A literal value never stands on its own as a datom's `v` once
    /// fabricated into a structured-literal entity; this flags values that
    /// still need fabrication.
    pub fn is_literal(&self) -> bool {
        !matches!(self, Value::Ident(_))
    }
}

impl From<Ident> for Value {
    fn from(ident: Ident) -> Self {
        Value::Ident(ident)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(OrderedFloat(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Op {
    Assert,
    Retract,
}

/// An immutable fact: at transaction `tx`, `op` was applied asserting (or
/// retracting) that entity `entity` has attribute `attribute` with value
/// `value`. Datoms are never mutated or deleted once saved; history is
/// recovered by scanning for the matching retraction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Datom {
    pub entity: Ident,
    pub attribute: Ident,
    pub value: Value,
    pub tx: Ident,
    pub op: Op,
}

impl Datom {
    pub fn assert(entity: Ident, attribute: Ident, value: impl Into<Value>, tx: Ident) -> Self {
        Self {
            entity,
            attribute,
            value: value.into(),
            tx,
            op: Op::Assert,
        }
    }

    pub fn retract(entity: Ident, attribute: Ident, value: impl Into<Value>, tx: Ident) -> Self {
        Self {
            entity,
            attribute,
            value: value.into(),
            tx,
            op: Op::Retract,
        }
    }
}
