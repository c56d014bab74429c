//! Transaction request types: what a caller hands the [`engine::TransactionEngine`].
//!
//! Generalises the teacher's `tx/mod.rs` (`Entity`/`Operation`/`Transaction`,
//! keyed by `u64` entity ids and plain attribute idents) to the spec's model,
//! where an entity, attribute or referenced value can be named by an
//! already-known [`Ident`], a resource name to resolve or intern, or a
//! transaction-local temp id; and where a value can instead be a literal
//! scalar that the engine fabricates into its own structured-literal entity.

pub mod engine;

use crate::datom::Value;
use crate::ident::Ident;

/// Names an entity within a transaction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    /// Allocate a brand new entity.
    New,
    /// Refer to an entity allocated earlier in the same transaction by the
    /// temp id it was given.
    TempId(String),
    /// Refer to (creating if necessary) the entity a resource name is
    /// interned on.
    Resource(String),
    /// Refer to an already-known entity directly.
    Id(Ident),
}

/// Names an attribute. Attributes are always resources (CURIEs/URIs) or
/// already-known idents; they are never fabricated as literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeRef {
    Resource(String),
    Id(Ident),
}

/// The `v` position of an asserted or retracted triple.
#[derive(Debug, Clone, PartialEq)]
pub enum TxValue {
    /// A reference to another entity.
    Ref(EntityRef),
    /// A scalar to be fabricated into its own structured-literal entity.
    Literal(Value),
}

impl TxValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        TxValue::Literal(value.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Assert,
    Retract,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOp {
    pub kind: OpKind,
    pub entity: EntityRef,
    pub attribute: AttributeRef,
    pub value: TxValue,
}

impl TxOp {
    pub fn assert(entity: EntityRef, attribute: AttributeRef, value: TxValue) -> Self {
        Self {
            kind: OpKind::Assert,
            entity,
            attribute,
            value,
        }
    }

    pub fn retract(entity: EntityRef, attribute: AttributeRef, value: TxValue) -> Self {
        Self {
            kind: OpKind::Retract,
            entity,
            attribute,
            value,
        }
    }
}

/// A batch of operations to commit together under a single freshly minted
/// transaction ident.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub operations: Vec<TxOp>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, op: TxOp) -> Self {
        self.operations.push(op);
        self
    }
}

use std::collections::HashMap;

use crate::datom::Datom;

#[derive(Debug)]
pub struct TransactionResult {
    pub tx: Ident,
    pub tx_data: Vec<Datom>,
    pub temp_ids: HashMap<String, Ident>,
}
