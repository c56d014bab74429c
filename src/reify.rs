//! Builds the two reifying datoms every transaction entity (`t`) carries
//! (I3): a wall-clock `generated-at-time` and a unique shareable `vaem-id`.
//!
//! Pulled out of `tx/engine.rs` into its own module because three
//! components mint a transaction ident and must reify it the same way:
//! [`crate::tx::engine::TransactionEngine`] for user transactions,
//! [`crate::resolver::ResourceResolver::ids_for`] for the batch interning
//! transaction `spec.md` §4.3 describes, and [`crate::store::DatomStore`]
//! for the bootstrap transaction (S1). Grounded in the teacher's
//! `tx/transactor.rs::create_tx_datom`, generalised from a single logical
//! timestamp datom to the spec's pair plus the uniqueness-checked shareable
//! id allocation `spec.md` §4.5 calls for.

use crate::clock::Clock;
use crate::datom::{Datom, Value};
use crate::ident::Ident;
use crate::idcodec;
use crate::storage::{ReadStorage, Restricts};
use crate::wellknown::{generated_at_time, vaem_id};

/// Same shareable-id shape `spec.md` §6 specifies for user-facing ids:
/// 10 characters (8 data + 2 checksum), hyphenated every 5.
const SHAREABLE_ID_LENGTH: usize = 10;
const SHAREABLE_ID_SPLIT: usize = 5;

/// Generates a random base-32 shareable id, decodes it, and retries on
/// collision against any existing `(a=OID_VAEM_ID, v=decoded)` datom, per
/// `spec.md` §4.5's "retry generation until the constraint holds" and I5's
/// global uniqueness invariant. Collisions are astronomically unlikely (a
/// 1-in-2^40 chance per existing row) but the loop is what actually
/// guarantees I5 rather than merely making it likely.
pub fn allocate_shareable_id<S: ReadStorage>(storage: &S) -> i64 {
    loop {
        let encoded = idcodec::generate(SHAREABLE_ID_LENGTH, SHAREABLE_ID_SPLIT, true);
        let decoded = idcodec::decode(&encoded, true).expect("freshly generated id decodes") as i64;
        let taken = storage
            .find(Restricts::new().with_attribute(vaem_id()).with_value(Value::Int(decoded)))
            .next()
            .is_some();
        if !taken {
            return decoded;
        }
    }
}

/// The two datoms `(tx, generated-at-time, now, tx, +)` and
/// `(tx, vaem-id, decoded, tx, +)` every transaction entity must carry (I3).
pub fn reifying_datoms<S: ReadStorage>(storage: &S, clock: &dyn Clock, tx: Ident) -> Vec<Datom> {
    let decoded = allocate_shareable_id(storage);
    vec![
        Datom::assert(tx, generated_at_time(), Value::instant(clock.now()), tx),
        Datom::assert(tx, vaem_id(), decoded, tx),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::storage::memory::MemoryStorage;
    use time::OffsetDateTime;

    #[test]
    fn allocates_distinct_shareable_ids() {
        let storage = MemoryStorage::new();
        let a = allocate_shareable_id(&storage);
        let b = allocate_shareable_id(&storage);
        assert_ne!(a, b);
    }

    #[test]
    fn reifying_datoms_cover_both_reserved_attributes() {
        let storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let tx = Ident::generate();
        let datoms = reifying_datoms(&storage, &clock, tx);
        assert_eq!(2, datoms.len());
        assert!(datoms.iter().all(|d| d.entity == tx && d.tx == tx));
        assert!(datoms.iter().any(|d| d.attribute == generated_at_time()));
        assert!(datoms.iter().any(|d| d.attribute == vaem_id()));
    }
}
