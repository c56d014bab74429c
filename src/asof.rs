//! Resolves a wall-clock instant (or an already-known transaction) into a
//! transaction cutoff and composes it with caller-supplied query filters.
//!
//! There is no teacher counterpart for this component — the teacher reads
//! its whole history unfiltered — so this is grounded directly in `spec.md`
//! §4.6: a single reverse scan on `generated-at-time` to find the latest `t`
//! whose wall-clock stamp is `≤ τ`, then a filter that is the identity on
//! its input plus `t ≤ t0`, built out of `storage::Restricts`'s existing
//! `TxRestrict` rather than a new filter representation.

use thiserror::Error;
use time::OffsetDateTime;

use crate::datom::Value;
use crate::ident::Ident;
use crate::storage::{ReadStorage, Restricts, TxRestrict};
use crate::wellknown::generated_at_time;

#[derive(Debug, Clone, Copy)]
pub struct AsOfView {
    bound: TxRestrict,
}

impl AsOfView {
    /// No cutoff: every currently-visible datom is in scope. The default
    /// view used when a caller doesn't ask for a historical perspective.
    pub fn now() -> Self {
        Self { bound: TxRestrict::Unbounded }
    }

    /// Pins visibility to `t ≤ t0` directly, skipping the instant scan.
    /// Used when the caller already has a transaction Ident to pin to (e.g.
    /// re-running a query at the exact cutoff a prior call resolved).
    pub fn at_tx(t0: Ident) -> Self {
        Self { bound: TxRestrict::AtMost(t0) }
    }

    /// Resolves `instant` to the latest transaction whose `generated-at-time`
    /// is `≤ instant`, by scanning every `generated-at-time` datom and
    /// keeping the one with the greatest `t` among those satisfying the
    /// bound — idents being monotone in creation instant (I7) means the
    /// greatest qualifying `t` is also the most recent one.
    pub fn at_instant<S: ReadStorage>(storage: &S, instant: OffsetDateTime) -> Result<Self, AsOfError<S::Error>> {
        tracing::trace!(%instant, "resolving as-of cutoff transaction");
        let bound = Value::instant(instant);
        let mut best: Option<Ident> = None;
        for result in storage.find(Restricts::new().with_attribute(generated_at_time())) {
            let datom = result.map_err(AsOfError::Storage)?;
            let improves = match best {
                Some(b) => datom.tx > b,
                None => true,
            };
            if datom.value <= bound && improves {
                best = Some(datom.tx);
            }
        }
        match best {
            Some(tx) => {
                tracing::debug!(%instant, tx = %tx, "resolved as-of cutoff");
                Ok(Self::at_tx(tx))
            }
            None => {
                tracing::warn!(%instant, "no transaction committed before requested instant");
                Err(AsOfError::NoTransactionBefore)
            }
        }
    }

    /// Composes this view's cutoff with `restricts`, without mutating
    /// `restricts` in place — it is consumed and a new value handed back, so
    /// a caller holding no other reference never observes the view's bound
    /// leaking into its own copy.
    pub fn extend(&self, mut restricts: Restricts) -> Restricts {
        restricts.tx = match (self.bound, restricts.tx) {
            (TxRestrict::Unbounded, existing) => existing,
            (TxRestrict::AtMost(t0), TxRestrict::Unbounded) => TxRestrict::AtMost(t0),
            (TxRestrict::AtMost(t0), TxRestrict::AtMost(existing)) => TxRestrict::AtMost(t0.min(existing)),
            // An exact single-transaction lookup (history traversal) is more
            // specific than an as-of cutoff; leave it untouched.
            (TxRestrict::AtMost(_), exact @ TxRestrict::Exact(_)) => exact,
            (exact @ TxRestrict::Exact(_), _) => exact,
        };
        restricts
    }

    /// Convenience wrapper around `storage.find(self.extend(restricts))`.
    pub fn find<S: ReadStorage>(&self, storage: &S, restricts: Restricts) -> S::Iter {
        storage.find(self.extend(restricts))
    }
}

#[derive(Debug, Error)]
pub enum AsOfError<E> {
    #[error("no transaction was committed before the requested instant")]
    NoTransactionBefore,
    #[error("storage error while resolving an as-of cutoff: {0}")]
    Storage(E),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MockClock};
    use crate::datom::Datom;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::WriteStorage;

    fn transact_at(storage: &mut MemoryStorage, clock: &MockClock) -> Ident {
        let tx = Ident::generate();
        storage
            .save(&[Datom::assert(tx, generated_at_time(), Value::instant(clock.now()), tx)])
            .unwrap();
        tx
    }

    #[test]
    fn now_sees_everything() {
        let mut storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let tx = transact_at(&mut storage, &clock);

        let view = AsOfView::now();
        let restricts = view.extend(Restricts::new().with_entity(tx));
        assert_eq!(1, storage.find(restricts).count());
    }

    #[test]
    fn at_instant_resolves_the_latest_qualifying_transaction() {
        let mut storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let first = transact_at(&mut storage, &clock);
        clock.advance(time::Duration::seconds(10));
        let _second = transact_at(&mut storage, &clock);

        let view = AsOfView::at_instant(&storage, OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(5)).unwrap();
        let restricts = view.extend(Restricts::new());
        let visible: Vec<_> = storage.find(restricts).map(Result::unwrap).collect();
        assert_eq!(vec![first], visible.iter().map(|d| d.entity).collect::<Vec<_>>());
    }

    #[test]
    fn at_instant_before_any_transaction_fails() {
        let storage = MemoryStorage::new();
        let result = AsOfView::at_instant(&storage, OffsetDateTime::UNIX_EPOCH);
        assert!(matches!(result, Err(AsOfError::NoTransactionBefore)));
    }

    #[test]
    fn extend_tightens_an_existing_bound_to_the_lesser_transaction() {
        let mut storage = MemoryStorage::new();
        let clock = MockClock::new(OffsetDateTime::UNIX_EPOCH);
        let first = transact_at(&mut storage, &clock);
        clock.advance(time::Duration::seconds(10));
        let second = transact_at(&mut storage, &clock);

        let view = AsOfView::at_tx(second);
        let restricts = view.extend(Restricts::new().as_of(first));
        let visible: Vec<_> = storage.find(restricts).map(Result::unwrap).collect();
        assert_eq!(1, visible.len());
        assert_eq!(first, visible[0].entity);
    }
}
