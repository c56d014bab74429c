//! Orchestrates a [`super::QuerySpec`] end to end (`spec.md` §4.7): compile,
//! join, project, materialise, compact.
//!
//! Replaces the teacher's `query/database.rs` `Database::query`
//! (resolve-idents-then-dispatch-to-`Resolver`-or-`aggregator`). Dispatch is
//! gone along with aggregation, and ground-term resolution never mints an
//! `Ident` (`ResourceResolver::resolve` only ever reads), so unlike
//! `TransactionEngine::transact` this whole pipeline stays synchronous.

use std::collections::{HashMap, HashSet};

use crate::asof::AsOfView;
use crate::datom::Value;
use crate::ident::Ident;
use crate::resolver::ResourceResolver;
use crate::storage::ReadStorage;
use crate::wellknown::compact;

use super::projector::project;
use super::resolver::Resolver;
use super::{compile, QueryError, QuerySpec};

/// One projected, materialised result row (`spec.md` §4.7 steps 5-7): a
/// user-chosen `?var` name mapped to the reference or scalar it resolved to.
pub type ResultRow = HashMap<String, ResultValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    /// A compacted `prefix:local` CURIE, a full URI, or `"_:" + shareableId`.
    Ref(String),
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// RFC 3339.
    Instant(String),
}

/// Runs `spec` against `storage` as seen through `view`, using `resolver`
/// both to resolve the spec's ground terms and to materialise Ident-valued
/// bindings back into references (`spec.md` §4.7 steps 1-7).
pub fn evaluate<S: ReadStorage>(
    storage: &S,
    view: &AsOfView,
    resolver: &ResourceResolver,
    spec: &QuerySpec,
) -> Result<Vec<ResultRow>, QueryError<S::Error>> {
    let Some(clauses) = compile(storage, resolver, spec)? else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for assignment in Resolver::new(storage, view, clauses) {
        let assignment = assignment.map_err(QueryError::Storage)?;
        rows.push(project(assignment, spec.select.as_deref()));
    }

    materialize(storage, resolver, &spec.prefixes, rows)
}

fn materialize<S: ReadStorage>(
    storage: &S,
    resolver: &ResourceResolver,
    prefixes: &HashMap<String, String>,
    rows: Vec<HashMap<String, Value>>,
) -> Result<Vec<ResultRow>, QueryError<S::Error>> {
    let idents: Vec<Ident> = rows
        .iter()
        .flat_map(|row| row.values())
        .filter_map(Value::as_ident)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let refs = resolver
        .refs_for(storage, &idents)
        .map_err(|unresolvable| QueryError::UnresolvableIdent(unresolvable.0))?;

    Ok(rows
        .into_iter()
        .map(|row| row.into_iter().map(|(variable, value)| (variable, materialize_value(&refs, prefixes, value))).collect())
        .collect())
}

fn materialize_value(refs: &HashMap<Ident, String>, prefixes: &HashMap<String, String>, value: Value) -> ResultValue {
    match value {
        Value::Ident(ident) => {
            let reference = refs.get(&ident).cloned().unwrap_or_default();
            ResultValue::Ref(compact(&reference, prefixes))
        }
        Value::Str(s) => ResultValue::Str(s),
        Value::Int(n) => ResultValue::Int(n),
        Value::Float(f) => ResultValue::Float(f.into_inner()),
        Value::Bool(b) => ResultValue::Bool(b),
        Value::Instant(millis) => {
            let instant = time::OffsetDateTime::UNIX_EPOCH + time::Duration::milliseconds(millis);
            let formatted = instant.format(&time::format_description::well_known::Rfc3339).unwrap_or_default();
            ResultValue::Instant(formatted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::datom::Datom;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::WriteStorage;
    use crate::tx::engine::TransactionEngine;
    use crate::tx::{AttributeRef, EntityRef, Transaction, TxOp, TxValue};
    use time::OffsetDateTime;

    #[tokio::test]
    async fn evaluates_a_query_end_to_end_and_materialises_the_ident_binding() {
        let mut storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let engine = TransactionEngine::new();

        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::Resource("myns:alice".to_string()),
            AttributeRef::Resource("rdf:type".to_string()),
            TxValue::Ref(EntityRef::Resource("myns:person".to_string())),
        ));
        let prefixes = HashMap::from([("myns".to_string(), "scheme://host/ns/mine#".to_string())]);
        let result = engine.transact(&storage, &clock, transaction, &prefixes).await.unwrap();
        storage.save(&result.tx_data).unwrap();

        let spec: QuerySpec = serde_json::from_value(serde_json::json!({
            "where": [["?person", "rdf:type", "myns:person"]],
            "prefixes": {"myns": "scheme://host/ns/mine#"}
        }))
        .unwrap();

        let rows = evaluate(&storage, &AsOfView::now(), engine.resolver(), &spec).unwrap();
        assert_eq!(1, rows.len());
        assert_eq!(Some(&ResultValue::Ref("myns:alice".to_string())), rows[0].get("?person"));
    }

    #[test]
    fn a_query_with_no_matching_rows_returns_an_empty_list() {
        let storage = MemoryStorage::new();
        let resolver = ResourceResolver::new();
        let spec: QuerySpec = serde_json::from_value(serde_json::json!({"where": [["?e", "qudt:value", "?v"]]})).unwrap();

        let rows = evaluate(&storage, &AsOfView::now(), &resolver, &spec).unwrap();
        assert!(rows.is_empty());
    }
}
