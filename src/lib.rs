pub mod asof;
pub mod clock;
pub mod datom;
pub mod ident;
pub mod idcodec;
pub mod query;
pub mod reify;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod tx;
pub mod wellknown;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use time::OffsetDateTime;

    use crate::asof::AsOfView;
    use crate::clock::MockClock;
    use crate::query::evaluator::{evaluate, ResultValue};
    use crate::query::QuerySpec;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::Restricts;
    use crate::store::DatomStore;
    use crate::tx::{AttributeRef, EntityRef, Transaction, TxOp, TxValue};
    use crate::wellknown::{qudt_value, uri_ref, vaem_id};

    fn store() -> DatomStore<MemoryStorage, MockClock> {
        DatomStore::new(MemoryStorage::new(), MockClock::new(OffsetDateTime::UNIX_EPOCH))
    }

    fn spec(json: serde_json::Value) -> QuerySpec {
        serde_json::from_value(json).unwrap()
    }

    // S1 - four `uri-ref` datoms for the reserved idents, plus the bootstrap
    // transaction's own reification, and nothing else.
    #[tokio::test]
    async fn bootstrap_seeds_exactly_the_reserved_idents() {
        let mut store = store();
        store.bootstrap(true).await.unwrap();

        let interned: Vec<_> = store.find(Restricts::new().with_attribute(uri_ref())).map(Result::unwrap).collect();
        assert_eq!(4, interned.len());
        assert_eq!(6, store.find(Restricts::new()).count());
    }

    // S2 - asserting a literal value fabricates exactly one structured-literal
    // entity carrying `qudt:value` and `vaem:id`.
    #[tokio::test]
    async fn structured_literal_expansion_fabricates_one_entity() {
        let mut store = store();
        store.bootstrap(true).await.unwrap();

        let prefixes = HashMap::from([("myns".to_string(), "scheme://host/ns/mine#".to_string())]);
        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::Resource("vaem:id".to_string()),
            AttributeRef::Resource("myns:comment".to_string()),
            TxValue::literal("A shareable ID"),
        ));
        let result = store.transact(transaction, &prefixes).await.unwrap();

        let fabricated: Vec<_> = result.tx_data.iter().filter(|d| d.attribute == qudt_value()).collect();
        assert_eq!(1, fabricated.len());
        let literal_entity = fabricated[0].entity;

        let vaem_datoms: Vec<_> = result.tx_data.iter().filter(|d| d.entity == literal_entity && d.attribute == vaem_id()).collect();
        assert_eq!(1, vaem_datoms.len());

        // entity resolution + attribute interning + 2 fabricated datoms + 2 reifying datoms.
        assert_eq!(5, result.tx_data.len());
    }

    // S3 - querying with a scalar predicate over a bound-date range returns
    // every matching row, materialised back to its CURIE.
    #[tokio::test]
    async fn as_of_query_over_a_date_bound_returns_every_matching_key() {
        let mut store = store();
        store.bootstrap(true).await.unwrap();
        let prefixes = HashMap::from([("myns".to_string(), "scheme://host/ns/mine#".to_string())]);
        let modified_at = crate::datom::Value::instant(
            OffsetDateTime::parse("2020-11-01T00:00:00Z", &time::format_description::well_known::Rfc3339).unwrap(),
        );

        for i in 0..20 {
            let transaction = Transaction::new().with(TxOp::assert(
                EntityRef::Resource(format!("myns:key{i:02}")),
                AttributeRef::Resource("myns:dateModified".to_string()),
                TxValue::literal(modified_at.clone()),
            ));
            store.transact(transaction, &prefixes).await.unwrap();
        }

        let spec = spec(serde_json::json!({
            "where": [
                ["?key", "myns:dateModified", "?sv"],
                ["?sv", "qudt:value", {"?dt": {"$gt": "2020-10-31", "$lt": "2020-11-02"}}]
            ],
            "select": ["?key", "?dt"],
            "prefixes": {"myns": "scheme://host/ns/mine#"}
        }));

        let rows = evaluate(store.storage(), &AsOfView::now(), store.resolver(), &spec).unwrap();
        assert_eq!(20, rows.len());
        for row in &rows {
            let Some(ResultValue::Ref(key)) = row.get("?key") else { panic!("missing ?key") };
            assert!(key.starts_with("myns:key"));
            assert_eq!(Some(&ResultValue::Instant("2020-11-01T00:00:00Z".to_string())), row.get("?dt"));
        }
    }

    // S4 - retracting one of the 20 triples leaves history as-of the instant
    // before the retraction intact, but the current view drops it.
    #[tokio::test]
    async fn historical_query_is_invariant_to_a_later_retraction() {
        let mut store = store();
        store.bootstrap(true).await.unwrap();
        let prefixes = HashMap::from([("myns".to_string(), "scheme://host/ns/mine#".to_string())]);

        let transaction = Transaction::new().with(TxOp::assert(
            EntityRef::Resource("myns:key00".to_string()),
            AttributeRef::Resource("myns:dateModified".to_string()),
            TxValue::literal("2020-11-01T00:00:00Z"),
        ));
        let asserted = store.transact(transaction, &prefixes).await.unwrap();
        let before_retraction = asserted.tx;

        let key_entity = store.resolver().resolve(store.storage(), "scheme://host/ns/mine#key00").unwrap();
        let key_attribute = store.resolver().resolve(store.storage(), "scheme://host/ns/mine#dateModified").unwrap();
        let value_entity = asserted
            .tx_data
            .iter()
            .find(|d| d.entity == key_entity && d.attribute == key_attribute)
            .unwrap()
            .value
            .clone();

        let retraction = Transaction::new().with(TxOp::retract(
            EntityRef::Resource("myns:key00".to_string()),
            AttributeRef::Resource("myns:dateModified".to_string()),
            TxValue::Ref(EntityRef::Id(value_entity.as_ident().unwrap())),
        ));
        store.transact(retraction, &prefixes).await.unwrap();

        let as_of_before = AsOfView::at_tx(before_retraction);
        assert_eq!(1, as_of_before.find(store.storage(), Restricts::new().with_attribute(key_attribute)).count());

        let as_of_now = AsOfView::now();
        assert_eq!(0, as_of_now.find(store.storage(), Restricts::new().with_attribute(key_attribute)).count());
    }
}
