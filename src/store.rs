//! `DatomStore`: the validated, append-only front door onto a storage
//! backend. Owns the storage handle and the clock, drives the transaction
//! engine, and is the one place that enforces the structured-value and
//! single-transaction invariants (I1-I3) before anything reaches storage.
//!
//! Grounded in the teacher's `transactor.rs` `Transactor<S, C>`: same
//! "wraps storage and a clock, `transact` computes datoms then writes them
//! under one lock" shape. Diverges in two ways the spec requires: datom
//! computation is delegated to [`crate::tx::engine::TransactionEngine`]
//! rather than inlined, and every write passes through [`DatomStore::insert_batch`],
//! which validates I1-I3 the teacher's `Transactor` never checked.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::clock::Clock;
use crate::datom::Datom;
use crate::ident::Ident;
use crate::reify;
use crate::resolver::{IdsForError, ResourceResolver, UnresolvableIdent};
use crate::storage::{ReadStorage, Restricts, WriteStorage};
use crate::tx::engine::{TransactionEngine, TransactionError};
use crate::tx::{Transaction, TransactionResult};
use crate::wellknown::{generated_at_time, qudt_value, reserved_uris, uri_ref, vaem_id};

pub struct DatomStore<S, C> {
    storage: S,
    clock: C,
    engine: TransactionEngine,
}

impl<S, C> DatomStore<S, C>
where
    S: ReadStorage + WriteStorage,
    C: Clock,
{
    pub fn new(storage: S, clock: C) -> Self {
        Self {
            storage,
            clock,
            engine: TransactionEngine::new(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn resolver(&self) -> &ResourceResolver {
        self.engine.resolver()
    }

    /// Seeds the four reserved idents' `uri-ref` datoms under one bootstrap
    /// transaction (S1), then warms the resolver cache with them so the
    /// very next lookup for any of the four canonical URIs never touches
    /// storage.
    ///
    /// `drop_guard` mirrors the original's refusal to recreate a collection
    /// that already holds history: when `true` (the safe default), a store
    /// that already has a `uri-ref` datom is left untouched and this
    /// returns [`StoreError::AlreadyBootstrapped`]. Passing `false` is an
    /// explicit "reseed anyway" that only fills in whichever reserved
    /// idents are still missing, never duplicating one that is already
    /// present (I4).
    pub async fn bootstrap(&mut self, drop_guard: bool) -> Result<(), StoreError<S::Error>> {
        let already_bootstrapped = self.storage.find(Restricts::new().with_attribute(uri_ref())).next().is_some();
        if already_bootstrapped {
            if drop_guard {
                tracing::debug!("store already bootstrapped; drop_guard refused reseeding");
                return Err(StoreError::AlreadyBootstrapped);
            }
            tracing::warn!("reseeding an already-bootstrapped store (drop_guard disabled)");
        }

        let tx = Ident::generate();
        let mut datoms: Vec<Datom> = reserved_uris()
            .into_iter()
            .filter(|(ident, _)| self.storage.find(Restricts::new().with_entity(*ident)).next().is_none())
            .map(|(ident, uri)| Datom::assert(ident, uri_ref(), uri, tx))
            .collect();
        if !datoms.is_empty() {
            datoms.extend(reify::reifying_datoms(&self.storage, &self.clock, tx));
            self.insert_batch(&datoms)?;
            tracing::info!(tx = %tx, seeded = datoms.len(), "bootstrapped reserved idents");
        }

        for (_, uri) in reserved_uris() {
            self.engine.resolver().resolve(&self.storage, uri);
        }
        Ok(())
    }

    /// Compiles `transaction` against the current storage contents and
    /// writes the result in one call, mirroring the teacher's `transact`
    /// acquiring its write lock once for the whole batch.
    pub async fn transact(
        &mut self,
        transaction: Transaction,
        prefixes: &HashMap<String, String>,
    ) -> Result<TransactionResult, StoreError<S::Error>> {
        let result = self
            .engine
            .transact(&self.storage, &self.clock, transaction, prefixes)
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "compiling transaction failed");
                StoreError::Transaction(err)
            })?;
        self.insert_batch(&result.tx_data)?;
        tracing::debug!(tx = %result.tx, datoms = result.tx_data.len(), "committed transaction");
        Ok(result)
    }

    /// Validates I1-I3 and writes `datoms` atomically, returning the entity
    /// each inserted datom describes in the same order. `WriteRejected`
    /// covers every way the spec allows a write to fail: a batch spanning
    /// more than one transaction, a non-reserved attribute carrying a
    /// non-Ident value, or the underlying store's own rejection.
    pub fn insert_batch(&mut self, datoms: &[Datom]) -> Result<Vec<Ident>, StoreError<S::Error>> {
        let txs: HashSet<Ident> = datoms.iter().map(|datom| datom.tx).collect();
        if txs.len() > 1 {
            return Err(StoreError::Write(WriteRejected::MixedTransactions));
        }
        for datom in datoms {
            // `generated-at-time` is not in `spec.md`'s literal-valued
            // exception list for I2, but the transaction reification it
            // requires (§3) stores a wall-clock instant there, which can
            // only be a literal — the exception set is widened to the three
            // reserved attributes that are ever written with a non-Ident
            // value (see DESIGN.md).
            let literal_valued =
                datom.attribute == vaem_id() || datom.attribute == qudt_value() || datom.attribute == generated_at_time();
            if !literal_valued && datom.value.as_ident().is_none() {
                let rejected = WriteRejected::StructuredValueViolation {
                    entity: datom.entity,
                    attribute: datom.attribute,
                };
                tracing::warn!(entity = %datom.entity, attribute = %datom.attribute, "rejected write: structured-value violation");
                return Err(StoreError::Write(rejected));
            }
        }
        self.storage.save(datoms).map_err(|err| {
            tracing::error!(error = %err, "storage rejected write");
            StoreError::Write(WriteRejected::Storage(err))
        })?;
        Ok(datoms.iter().map(|datom| datom.entity).collect())
    }

    pub fn find(&self, restricts: Restricts) -> S::Iter {
        self.storage.find(restricts)
    }

    /// Batched resource interning (`spec.md` §4.3), delegated straight to
    /// the shared resolver.
    pub async fn ids_for(&mut self, names: &[String]) -> Result<HashMap<String, Ident>, IdsForError<S::Error>> {
        self.engine.resolver().ids_for(&mut self.storage, &self.clock, names).await
    }

    /// Batched reverse materialisation (`spec.md` §4.3).
    pub fn refs_for(&self, ids: &[Ident]) -> Result<HashMap<Ident, String>, UnresolvableIdent> {
        self.engine.resolver().refs_for(&self.storage, ids)
    }
}

#[derive(Debug, Error)]
pub enum WriteRejected<E> {
    #[error("a batch of datoms spanned more than one transaction")]
    MixedTransactions,
    #[error("entity {entity} attribute {attribute} carries a non-Ident value for a non-literal-valued attribute")]
    StructuredValueViolation { entity: Ident, attribute: Ident },
    #[error("the underlying store rejected the write: {0}")]
    Storage(E),
}

#[derive(Debug, Error)]
pub enum StoreError<E> {
    #[error("compiling the transaction failed: {0}")]
    Transaction(#[from] TransactionError<E>),
    #[error("writing the transaction failed: {0}")]
    Write(#[from] WriteRejected<E>),
    #[error("store is already bootstrapped and drop_guard prevented reseeding")]
    AlreadyBootstrapped,
}
