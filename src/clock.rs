//! Wall-clock abstraction, so transaction stamping and `AsOfView` can be
//! tested without real time passing.
//!
//! Kept from the teacher's `clock.rs` almost unchanged: same `Clock` trait
//! shape, generalised from a `u64` logical tick to a real
//! `time::OffsetDateTime`, since the spec's transactions are stamped with
//! wall-clock instants (`generated-at-time`), not a logical counter.

use std::sync::atomic::{AtomicI64, Ordering};

use time::OffsetDateTime;

pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock whose reading is set explicitly, for deterministic tests of
/// transaction stamping and `AsOfView` cutoffs.
pub struct MockClock {
    now_millis: AtomicI64,
}

impl MockClock {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now_millis: AtomicI64::new((now.unix_timestamp_nanos() / 1_000_000) as i64),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        self.now_millis
            .store((now.unix_timestamp_nanos() / 1_000_000) as i64, Ordering::SeqCst);
    }

    pub fn advance(&self, duration: time::Duration) {
        self.now_millis
            .fetch_add(duration.whole_milliseconds() as i64, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> OffsetDateTime {
        let millis = self.now_millis.load(Ordering::SeqCst);
        OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}
