//! Shared fixtures for morsel integration tests.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use sldg_core::hash::LedgerHash;
use sldg_core::source::{ColumnValue, SaltSeed, SourceRow};
use sldg_store::backend::MemoryBackend;
use sldg_store::ledger::Ledger;

/// The fixture seed every test ledger salts with.
#[must_use]
pub fn seed() -> SaltSeed {
    SaltSeed::new([0x01; 32])
}

/// The source row ledgered at `rn`: three string columns derived from the
/// row number.
#[must_use]
pub fn source_row(rn: u64) -> SourceRow {
    SourceRow::from_values(
        rn,
        vec![
            ColumnValue::String(format!("entry-{rn}")),
            ColumnValue::Long(i64::try_from(rn).expect("fits")),
            ColumnValue::String(format!("payload-{rn}")),
        ],
        &seed(),
    )
    .expect("source row")
}

/// A ledger of `count` rows whose input-hashes come from [`source_row`].
#[must_use]
pub fn source_ledger(count: u64) -> Ledger<MemoryBackend> {
    let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
    for rn in 1..=count {
        ledger
            .append(source_row(rn).input_hash())
            .expect("append");
    }
    ledger
}

/// A degenerate crumtrail witnessing `hash` directly (empty proof).
#[must_use]
pub fn trail_for(hash: LedgerHash, utc_ms: i64) -> sldg_core::crumtrail::Crumtrail {
    sldg_core::crumtrail::Crumtrail::new(
        hash,
        Vec::new(),
        hash,
        utc_ms,
        "crums://witness".into(),
    )
    .expect("trail")
}
