//! Computes the datoms a [`Transaction`] request commits, without touching
//! storage itself — the caller (`DatomStore`) is the one that calls
//! `WriteStorage::save` with the result, same separation the teacher keeps
//! between `Transactor::transact` (pure datom computation) and whatever
//! calls `WriteStorage::save` on its result.
//!
//! Grounded in the teacher's `tx/transactor.rs` `Transactor`: kept the
//! "allocate temp ids up front, mint one tx id, turn each operation into
//! datoms under that tx id" structure. Diverges from it in two ways the
//! spec requires: entity/attribute/value positions resolve through
//! [`ResourceResolver`] instead of a fixed `u64` namespace, and there is no
//! cardinality-one auto-retraction — attributes are cardinality-many by
//! convention, so superseding a value is always an explicit `Retract` op.

use std::collections::HashMap;

use thiserror::Error;

use crate::clock::Clock;
use crate::datom::{Datom, Value};
use crate::ident::Ident;
use crate::reify;
use crate::resolver::{ResolveError, ResourceResolver};
use crate::storage::ReadStorage;
use crate::wellknown::{expand, qudt_value, vaem_id};

use super::{AttributeRef, EntityRef, OpKind, Transaction, TransactionResult, TxValue};

#[derive(Debug, Error)]
pub enum TransactionError<E> {
    #[error("duplicate temp id `{0}`")]
    DuplicateTempId(String),
    #[error("temp id `{0}` was never assigned in this transaction")]
    TempIdNotFound(String),
    #[error("resolving a resource name failed: {0}")]
    Resolve(#[from] ResolveError<E>),
}

#[derive(Default)]
pub struct TransactionEngine {
    resolver: ResourceResolver,
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exposes the engine's interning cache so other components that also
    /// need to resolve or intern resource names ([`crate::store::DatomStore`]
    /// for bootstrap warm-up, the query evaluator for materialisation) share
    /// one cache with the engine rather than keeping a second, cold one.
    pub fn resolver(&self) -> &ResourceResolver {
        &self.resolver
    }

    /// `prefixes` are the caller-supplied additions to the base prefix map
    /// (`spec.md` §4.5 step 1: "Expand compact URIs in E/A/V using PREFIXES
    /// ⊕ caller prefixes"), consulted before [`ResourceResolver`] ever sees a
    /// resource name.
    pub async fn transact<S: ReadStorage>(
        &self,
        storage: &S,
        clock: &dyn Clock,
        transaction: Transaction,
        prefixes: &HashMap<String, String>,
    ) -> Result<TransactionResult, TransactionError<S::Error>> {
        let tx = Ident::generate();
        let mut datoms = Vec::new();
        let mut temp_ids: HashMap<String, Ident> = HashMap::new();

        self.allocate_temp_ids(&transaction, &mut temp_ids)?;

        for op in &transaction.operations {
            let entity = self
                .resolve_entity(storage, &op.entity, &temp_ids, tx, prefixes, &mut datoms)
                .await?;
            let attribute = self
                .resolve_attribute(storage, &op.attribute, tx, prefixes, &mut datoms)
                .await?;
            let value = self
                .resolve_value(storage, &op.value, &temp_ids, tx, prefixes, &mut datoms)
                .await?;
            let datom = match op.kind {
                OpKind::Assert => Datom::assert(entity, attribute, value, tx),
                OpKind::Retract => Datom::retract(entity, attribute, value, tx),
            };
            datoms.push(datom);
        }

        datoms.extend(reify::reifying_datoms(storage, clock, tx));
        tracing::trace!(tx = %tx, ops = transaction.operations.len(), datoms = datoms.len(), "compiled transaction");

        Ok(TransactionResult {
            tx,
            tx_data: datoms,
            temp_ids,
        })
    }

    fn allocate_temp_ids<E>(
        &self,
        transaction: &Transaction,
        temp_ids: &mut HashMap<String, Ident>,
    ) -> Result<(), TransactionError<E>> {
        for op in &transaction.operations {
            if let EntityRef::TempId(name) = &op.entity {
                if temp_ids.contains_key(name) {
                    continue;
                }
                temp_ids.insert(name.clone(), Ident::generate());
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_entity<S: ReadStorage>(
        &self,
        storage: &S,
        entity: &EntityRef,
        temp_ids: &HashMap<String, Ident>,
        tx: Ident,
        prefixes: &HashMap<String, String>,
        datoms: &mut Vec<Datom>,
    ) -> Result<Ident, TransactionError<S::Error>> {
        match entity {
            EntityRef::New => Ok(Ident::generate()),
            EntityRef::Id(ident) => Ok(*ident),
            EntityRef::TempId(name) => temp_ids
                .get(name)
                .copied()
                .ok_or_else(|| TransactionError::TempIdNotFound(name.clone())),
            EntityRef::Resource(name) => self.resolve_resource(storage, name, tx, prefixes, datoms).await,
        }
    }

    async fn resolve_attribute<S: ReadStorage>(
        &self,
        storage: &S,
        attribute: &AttributeRef,
        tx: Ident,
        prefixes: &HashMap<String, String>,
        datoms: &mut Vec<Datom>,
    ) -> Result<Ident, TransactionError<S::Error>> {
        match attribute {
            AttributeRef::Id(ident) => Ok(*ident),
            AttributeRef::Resource(name) => self.resolve_resource(storage, name, tx, prefixes, datoms).await,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn resolve_value<S: ReadStorage>(
        &self,
        storage: &S,
        value: &TxValue,
        temp_ids: &HashMap<String, Ident>,
        tx: Ident,
        prefixes: &HashMap<String, String>,
        datoms: &mut Vec<Datom>,
    ) -> Result<Value, TransactionError<S::Error>> {
        match value {
            TxValue::Ref(entity_ref) => {
                let ident = self
                    .resolve_entity(storage, entity_ref, temp_ids, tx, prefixes, datoms)
                    .await?;
                Ok(Value::Ident(ident))
            }
            TxValue::Literal(literal) => {
                let fabricated = Ident::generate();
                let shareable_id = reify::allocate_shareable_id(storage);
                datoms.push(Datom::assert(fabricated, qudt_value(), literal.clone(), tx));
                datoms.push(Datom::assert(fabricated, vaem_id(), shareable_id, tx));
                Ok(Value::Ident(fabricated))
            }
        }
    }

    /// Expands `name` against the base prefix map plus `prefixes`, then
    /// resolves it, interning it under `uri-ref` and recording the
    /// interning datom directly into the in-flight `datoms` buffer if it
    /// hasn't been seen before. The datom becomes visible to storage only
    /// once the caller saves the whole batch, so two concurrent
    /// transactions racing to intern the same brand-new name may each mint
    /// a distinct ident for it; see the store's handling of this race.
    async fn resolve_resource<S: ReadStorage>(
        &self,
        storage: &S,
        name: &str,
        tx: Ident,
        prefixes: &HashMap<String, String>,
        datoms: &mut Vec<Datom>,
    ) -> Result<Ident, TransactionError<S::Error>> {
        let name = expand(name, prefixes);
        if let Some(ident) = self.resolver.resolve(storage, &name) {
            return Ok(ident);
        }
        let mut interning_datom = None;
        let ident = self
            .resolver
            .resolve_or_create(storage, &name, |ident| {
                interning_datom = Some(Datom::assert(ident, crate::wellknown::uri_ref(), name.clone(), tx));
                Ok::<_, std::convert::Infallible>(())
            })
            .await?;
        if let Some(datom) = interning_datom {
            tracing::trace!(name, ident = %ident, "interned resource name within transaction");
            datoms.push(datom);
        }
        Ok(ident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::storage::memory::MemoryStorage;
    use crate::tx::TxOp;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn asserts_a_literal_value_as_a_fabricated_entity() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();
        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::New,
            AttributeRef::Resource("qudt:value".to_string()),
            TxValue::literal(42i64),
        ));

        let result = engine
            .transact(&storage, &clock, transaction, &HashMap::new())
            .await
            .unwrap();
        // entity assertion + uri-ref interning + fabricated literal's two
        // datoms + two tx reification datoms.
        assert_eq!(5, result.tx_data.len());

        let fabricated = result
            .tx_data
            .iter()
            .find(|d| d.attribute == qudt_value())
            .map(|d| d.entity)
            .unwrap();
        let vaem_datom = result.tx_data.iter().find(|d| d.entity == fabricated && d.attribute == vaem_id()).unwrap();
        assert!(matches!(vaem_datom.value, Value::Int(_)));
    }

    #[tokio::test]
    async fn temp_ids_resolve_to_the_same_entity_within_a_transaction() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();
        let transaction = Transaction::new()
            .with(TxOp::assert(
                EntityRef::TempId("alice".to_string()),
                AttributeRef::Resource("rdf:type".to_string()),
                TxValue::literal("person"),
            ))
            .with(TxOp::assert(
                EntityRef::TempId("alice".to_string()),
                AttributeRef::Resource("rdf:type".to_string()),
                TxValue::literal("employee"),
            ));

        let result = engine
            .transact(&storage, &clock, transaction, &HashMap::new())
            .await
            .unwrap();
        let alice = result.temp_ids["alice"];
        let entity_datoms: Vec<_> = result.tx_data.iter().filter(|d| d.entity == alice).collect();
        assert_eq!(2, entity_datoms.len());
    }

    #[tokio::test]
    async fn unknown_temp_id_is_an_error() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();
        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::TempId("nobody".to_string()),
            AttributeRef::Resource("rdf:type".to_string()),
            TxValue::Ref(EntityRef::TempId("also-nobody".to_string())),
        ));

        let result = engine.transact(&storage, &clock, transaction, &HashMap::new()).await;
        assert!(matches!(result, Err(TransactionError::TempIdNotFound(_))));
    }

    #[tokio::test]
    async fn reifies_the_transaction_with_time_and_shareable_id() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();
        let result = engine
            .transact(&storage, &clock, Transaction::new(), &HashMap::new())
            .await
            .unwrap();

        let reifying: Vec<_> = result.tx_data.iter().filter(|d| d.entity == result.tx).collect();
        assert_eq!(2, reifying.len());
        let vaem_datom = reifying.iter().find(|d| d.attribute == vaem_id()).unwrap();
        assert!(matches!(vaem_datom.value, Value::Int(_)));
    }

    #[tokio::test]
    async fn expands_caller_supplied_prefixes_before_resolving() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();
        let prefixes = HashMap::from([("myns".to_string(), "scheme://host/ns/mine#".to_string())]);
        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::New,
            AttributeRef::Resource("myns:comment".to_string()),
            TxValue::literal("a comment"),
        ));

        let result = engine.transact(&storage, &clock, transaction, &prefixes).await.unwrap();
        let interned = result
            .tx_data
            .iter()
            .find(|d| d.attribute == crate::wellknown::uri_ref())
            .unwrap();
        assert_eq!(Value::Str("scheme://host/ns/mine#comment".to_string()), interned.value);
    }
}
