//! Storage abstraction the rest of the crate is written against, plus the
//! `Restricts` query the five covering indexes are searched with.
//!
//! Grounded in the teacher's `storage/mod.rs` `ReadStorage`/`WriteStorage`
//! trait split (kept verbatim in shape) and `storage/restricts.rs`'s
//! `Restricts`/`TxRestrict` (kept verbatim in spirit, generalised from
//! `u64` entity/attribute/value ids to [`Ident`] and [`Value`]).

pub mod memory;
pub mod mongo;

use crate::datom::{Datom, Value};
use crate::ident::Ident;

/// Read side of the storage seam. `find` returns all non-retracted datoms
/// matching `restricts`; callers that need retracted history (none, at
/// present — retraction is always resolved by the writer before a new
/// assertion) would add a dedicated method rather than overload this one.
pub trait ReadStorage {
    type Error: std::error::Error + Send + Sync + 'static;
    type Iter: Iterator<Item = Result<Datom, Self::Error>>;

    fn find(&self, restricts: Restricts) -> Self::Iter;
}

pub trait WriteStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    fn save(&mut self, datoms: &[Datom]) -> Result<(), Self::Error>;
}

/// A conjunction of optional equality constraints over a datom's four named
/// positions, plus a transaction-visibility bound. `None` means "unconstrained
/// in this position"; an absent `tx` bound (the default) means "as of now".
#[derive(Debug, Clone, Default)]
pub struct Restricts {
    pub entity: Option<Ident>,
    pub attribute: Option<Ident>,
    pub value: Option<Value>,
    pub tx: TxRestrict,
}

impl Restricts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity: Ident) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_attribute(mut self, attribute: Ident) -> Self {
        self.attribute = Some(attribute);
        self
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn as_of(mut self, tx: Ident) -> Self {
        self.tx = TxRestrict::AtMost(tx);
        self
    }

    pub fn at_tx(mut self, tx: Ident) -> Self {
        self.tx = TxRestrict::Exact(tx);
        self
    }

    pub fn test(&self, datom: &Datom) -> bool {
        self.entity.map_or(true, |e| datom.entity == e)
            && self.attribute.map_or(true, |a| datom.attribute == a)
            && self.value.as_ref().map_or(true, |v| &datom.value == v)
            && self.tx.test(datom.tx)
    }
}

/// Bounds which transactions a read may see. `AtMost` composes `AsOfView`'s
/// resolved cutoff transaction with a caller's pattern; `Exact` pins a
/// lookup to one transaction (used by the `T` index when resolving a
/// specific transaction's reifying datoms).
#[derive(Debug, Clone)]
pub enum TxRestrict {
    AtMost(Ident),
    Exact(Ident),
    Unbounded,
}

impl Default for TxRestrict {
    fn default() -> Self {
        TxRestrict::Unbounded
    }
}

impl TxRestrict {
    fn test(&self, tx: Ident) -> bool {
        match self {
            TxRestrict::AtMost(bound) => tx <= *bound,
            TxRestrict::Exact(exact) => tx == *exact,
            TxRestrict::Unbounded => true,
        }
    }
}

/// Collapses a stream of assert/retract datoms down to the ones in effect:
/// for each distinct `(entity, attribute, value)`, only the highest-`tx`
/// datom can be current, and it is only current if that datom is an
/// assertion. Every `ReadStorage` implementation's `find` must apply this
/// before returning, since the indexes themselves store full history.
pub fn reconcile(datoms: impl Iterator<Item = Datom>) -> Vec<Datom> {
    use std::collections::HashMap;

    let mut latest: HashMap<(Ident, Ident, Value), Datom> = HashMap::new();
    for datom in datoms {
        let key = (datom.entity, datom.attribute, datom.value.clone());
        match latest.get(&key) {
            Some(existing) if existing.tx >= datom.tx => {}
            _ => {
                latest.insert(key, datom);
            }
        }
    }
    latest
        .into_values()
        .filter(|datom| datom.op == crate::datom::Op::Assert)
        .collect()
}
