//! External storage binding to MongoDB, grounded in
//! `original_source/maggtomic/__init__.py`'s pymongo-based implementation:
//! same five-index strategy (`INDEX_MODELS` there maps directly onto the
//! compound indexes created here), same `{_id, e, a, v, t, o}` document
//! shape, same write concern (`w: majority, journal: true`).
//!
//! `ReadStorage`/`WriteStorage` are synchronous traits (kept from the
//! teacher's `storage/mod.rs`), so every method here bridges into the
//! async `mongodb` driver via the current Tokio runtime, the same way the
//! teacher's `storage/disk.rs` bridges into synchronous `rocksdb` calls —
//! from the trait's point of view storage I/O is just "might block".

use bson::{doc, Document};
use mongodb::options::{CreateCollectionOptions, IndexOptions, WriteConcern};
use mongodb::{Collection, Database, IndexModel};
use thiserror::Error;
use tokio::runtime::Handle;

use crate::datom::{Datom, Op, Value};
use crate::ident::Ident;

use super::{reconcile, ReadStorage, Restricts, TxRestrict, WriteStorage};

const COLLECTION: &str = "datoms";

#[derive(Debug, Error)]
pub enum MongoStorageError {
    #[error("mongodb operation failed: {0}")]
    Driver(#[from] mongodb::error::Error),
    #[error("stored document did not match the datom schema: {0}")]
    Malformed(String),
    #[error("storage method called outside of a Tokio runtime")]
    NoRuntime,
}

pub struct MongoStorage {
    collection: Collection<Document>,
}

impl MongoStorage {
    /// Connects and ensures the five covering indexes and the `{_id, e, a,
    /// v, t, o}` document validator exist, mirroring
    /// `create_collection`/`INDEX_MODELS` in the original implementation.
    pub async fn connect(database: &Database) -> Result<Self, MongoStorageError> {
        tracing::debug!(database = database.name(), "connecting to mongo storage");
        ensure_schema_validator(database).await?;
        let collection = database.collection::<Document>(COLLECTION);
        let storage = Self { collection };
        storage.ensure_indexes().await?;
        tracing::info!(database = database.name(), "mongo storage ready");
        Ok(storage)
    }

    async fn ensure_indexes(&self) -> Result<(), MongoStorageError> {
        let vaet = IndexModel::builder()
            .keys(doc! { "v": 1, "a": 1, "e": 1, "t": -1, "o": 1 })
            .options(
                IndexOptions::builder()
                    .name("vaet".to_string())
                    .partial_filter_expression(doc! { "v": { "$type": "objectId" } })
                    .build(),
            )
            .build();
        let models = [
            index_model(doc! { "e": 1, "a": 1, "v": 1, "t": -1, "o": 1 }, "eavt"),
            index_model(doc! { "a": 1, "e": 1, "v": 1, "t": -1, "o": 1 }, "aevt"),
            index_model(doc! { "a": 1, "v": 1, "e": 1, "t": -1, "o": 1 }, "avet"),
            vaet,
            index_model(doc! { "t": -1 }, "t"),
        ];
        self.collection.create_indexes(models, None).await?;
        Ok(())
    }

    fn handle(&self) -> Result<Handle, MongoStorageError> {
        Handle::try_current().map_err(|_| MongoStorageError::NoRuntime)
    }

    async fn find_async(&self, restricts: &Restricts) -> Result<Vec<Datom>, MongoStorageError> {
        let filter = filter_for(restricts);
        let mut cursor = self.collection.find(filter, None).await?;
        let mut datoms = Vec::new();
        while cursor.advance().await? {
            datoms.push(datom_from_document(cursor.deserialize_current()?)?);
        }
        Ok(reconcile(datoms.into_iter()))
    }

    async fn save_async(&self, datoms: &[Datom]) -> Result<(), MongoStorageError> {
        if datoms.is_empty() {
            return Ok(());
        }
        let documents: Vec<Document> = datoms.iter().map(document_from_datom).collect();
        let write_concern = WriteConcern::builder().journal(true).w(mongodb::options::Acknowledgment::Majority).build();
        let options = mongodb::options::InsertManyOptions::builder()
            .write_concern(write_concern)
            .build();
        self.collection.insert_many(documents, options).await?;
        Ok(())
    }
}

impl ReadStorage for MongoStorage {
    type Error = MongoStorageError;
    type Iter = std::vec::IntoIter<Result<Datom, MongoStorageError>>;

    fn find(&self, restricts: Restricts) -> Self::Iter {
        let result = self
            .handle()
            .and_then(|handle| handle.block_on(self.find_async(&restricts)));
        into_iter_result(result)
    }

}

impl WriteStorage for MongoStorage {
    type Error = MongoStorageError;

    fn save(&mut self, datoms: &[Datom]) -> Result<(), Self::Error> {
        let handle = self.handle()?;
        handle.block_on(self.save_async(datoms))
    }
}

fn into_iter_result(
    result: Result<Vec<Datom>, MongoStorageError>,
) -> std::vec::IntoIter<Result<Datom, MongoStorageError>> {
    match result {
        Ok(datoms) => datoms.into_iter().map(Ok).collect::<Vec<_>>().into_iter(),
        Err(error) => vec![Err(error)].into_iter(),
    }
}

/// `spec.md` §6's "document-level schema validator": exactly the six
/// `{_id, e, a, v, t, o}` fields, nothing extra, `e`/`a`/`t` always
/// ObjectIds and `o` always boolean. `$jsonSchema` can only be attached at
/// creation or via `collMod`, so this tries `createCollection` first (a
/// brand new database) and falls back to `collMod` when the collection
/// already exists from a prior run.
async fn ensure_schema_validator(database: &Database) -> Result<(), MongoStorageError> {
    let validator = doc! {
        "$jsonSchema": {
            "bsonType": "object",
            "required": ["_id", "e", "a", "v", "t", "o"],
            "additionalProperties": false,
            "properties": {
                "_id": {},
                "e": { "bsonType": "objectId" },
                "a": { "bsonType": "objectId" },
                "v": {},
                "t": { "bsonType": "objectId" },
                "o": { "bsonType": "bool" },
            },
        }
    };

    let options = CreateCollectionOptions::builder().validator(validator.clone()).build();
    match database.create_collection(COLLECTION, options).await {
        Ok(()) => Ok(()),
        Err(_) => {
            // Collection already exists (e.g. a prior bootstrap run): attach
            // the validator in place via `collMod` instead.
            database
                .run_command(doc! { "collMod": COLLECTION, "validator": validator }, None)
                .await?;
            Ok(())
        }
    }
}

fn index_model(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

fn filter_for(restricts: &Restricts) -> Document {
    let mut filter = Document::new();
    if let Some(entity) = restricts.entity {
        filter.insert("e", entity.as_object_id());
    }
    if let Some(attribute) = restricts.attribute {
        filter.insert("a", attribute.as_object_id());
    }
    if let Some(value) = &restricts.value {
        filter.insert("v", bson_from_value(value));
    }
    match &restricts.tx {
        TxRestrict::AtMost(bound) => {
            filter.insert("t", doc! { "$lte": bound.as_object_id() });
        }
        TxRestrict::Exact(tx) => {
            filter.insert("t", tx.as_object_id());
        }
        TxRestrict::Unbounded => {}
    }
    filter
}

fn bson_from_value(value: &Value) -> bson::Bson {
    match value {
        Value::Ident(ident) => bson::Bson::ObjectId(ident.as_object_id()),
        Value::Str(s) => bson::Bson::String(s.clone()),
        Value::Int(n) => bson::Bson::Int64(*n),
        Value::Float(f) => bson::Bson::Double(f.0),
        Value::Bool(b) => bson::Bson::Boolean(*b),
        Value::Instant(millis) => bson::Bson::DateTime(bson::DateTime::from_millis(*millis)),
    }
}

fn value_from_bson(bson: &bson::Bson) -> Result<Value, MongoStorageError> {
    Ok(match bson {
        bson::Bson::ObjectId(oid) => Value::Ident(Ident::new(*oid)),
        bson::Bson::String(s) => Value::Str(s.clone()),
        bson::Bson::Int64(n) => Value::Int(*n),
        bson::Bson::Int32(n) => Value::Int(*n as i64),
        bson::Bson::Double(f) => Value::Float(ordered_float::OrderedFloat(*f)),
        bson::Bson::Boolean(b) => Value::Bool(*b),
        bson::Bson::DateTime(dt) => Value::Instant(dt.timestamp_millis()),
        other => return Err(MongoStorageError::Malformed(format!("unsupported value type: {other:?}"))),
    })
}

fn document_from_datom(datom: &Datom) -> Document {
    doc! {
        "e": datom.entity.as_object_id(),
        "a": datom.attribute.as_object_id(),
        "v": bson_from_value(&datom.value),
        "t": datom.tx.as_object_id(),
        "o": matches!(datom.op, Op::Assert),
    }
}

fn datom_from_document(document: Document) -> Result<Datom, MongoStorageError> {
    let get_oid = |field: &str| -> Result<bson::oid::ObjectId, MongoStorageError> {
        document
            .get_object_id(field)
            .map_err(|_| MongoStorageError::Malformed(format!("missing `{field}`")))
    };
    let entity = Ident::new(get_oid("e")?);
    let attribute = Ident::new(get_oid("a")?);
    let tx = Ident::new(get_oid("t")?);
    let value = value_from_bson(
        document
            .get("v")
            .ok_or_else(|| MongoStorageError::Malformed("missing `v`".to_string()))?,
    )?;
    let asserted = document
        .get_bool("o")
        .map_err(|_| MongoStorageError::Malformed("missing `o`".to_string()))?;
    let op = if asserted { Op::Assert } else { Op::Retract };
    Ok(Datom {
        entity,
        attribute,
        value,
        tx,
        op,
    })
}
