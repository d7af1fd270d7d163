//! Morsel packing: build, canonical encoding, verify-on-load.

#![allow(
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    reason = "test fixtures have fixed layouts"
)]

mod common;

use std::collections::BTreeSet;

use common::{source_ledger, source_row, trail_for};
use sldg_core::error::LedgerError;
use sldg_core::source::SourceCell;
use sldg_morsel::build::MorselBuilder;
use sldg_morsel::error::MorselError;
use sldg_morsel::pack::{ColumnMeta, Morsel, MorselMeta, RowEntry};

#[test]
fn state_morsel_carries_reference_rows() {
    let ledger = source_ledger(4);
    let morsel = MorselBuilder::from_path(&ledger.state_path().expect("path"))
        .build()
        .expect("morsel");
    assert_eq!(morsel.declared_state(), (4, ledger.ledger_hash()));
    // Full rows 1, 2, 4; row 3 joins as a reference because row 4 cites it.
    assert!(morsel.full_row(1).is_some());
    assert!(morsel.full_row(2).is_some());
    assert!(morsel.full_row(4).is_some());
    assert!(matches!(
        morsel.rows().get(&3),
        Some(RowEntry::Reference { .. })
    ));
    assert_eq!(
        morsel.rows().get(&3).map(RowEntry::hash),
        Some(ledger.row_hash(3).expect("H(3)"))
    );
}

#[test]
fn canonical_bytes_are_stable_and_round_trip() {
    let ledger = source_ledger(9);
    let build = || {
        let mut builder = MorselBuilder::from_path(&ledger.path_to(&[5]).expect("path"));
        builder.add_source(source_row(5));
        builder.add_trail(8, trail_for(ledger.row_hash(8).expect("H(8)"), 44_000));
        builder.meta(MorselMeta {
            name: "accounts".into(),
            description: "monthly close".into(),
            date_format: "yyyy-MM-dd".into(),
            columns: vec![ColumnMeta {
                column: 1,
                name: "entry".into(),
                description: String::new(),
            }],
        });
        builder.assets(b"report-template".to_vec());
        builder.build().expect("morsel")
    };
    let first = build();
    let second = build();
    // Two independent builds of the same logical morsel: identical bytes.
    assert_eq!(first.to_bytes(), second.to_bytes());

    let reloaded = Morsel::from_bytes(&first.to_bytes()).expect("reload");
    assert_eq!(reloaded, first);
    assert_eq!(reloaded.to_bytes(), first.to_bytes());
    assert_eq!(
        reloaded.sources().get(&5).map(|s| s.input_hash()),
        Some(source_row(5).input_hash())
    );
    assert_eq!(
        reloaded.assets().map(sldg_morsel::pack::MorselAssets::blob),
        Some(b"report-template".as_slice())
    );
}

#[test]
fn redacted_sources_survive_the_codec() {
    let ledger = source_ledger(5);
    let redacted = source_row(5).redacted(&BTreeSet::from([3]));
    let mut builder = MorselBuilder::from_path(&ledger.state_path().expect("path"));
    builder.add_source(redacted.clone());
    let morsel = builder.build().expect("morsel");

    let reloaded = Morsel::from_bytes(&morsel.to_bytes()).expect("reload");
    let source = reloaded.sources().get(&5).expect("source 5");
    assert_eq!(source.input_hash(), source_row(5).input_hash());
    assert!(source.cells()[2].is_redacted());
    assert!(matches!(source.cells()[0], SourceCell::Value { .. }));
}

#[test]
fn trail_timestamps_bound_row_ages() {
    let ledger = source_ledger(64);
    let mut builder = MorselBuilder::from_path(&ledger.state_path().expect("path"));
    builder.add_trail(64, trail_for(ledger.ledger_hash(), 1_000_000));
    let morsel = builder.build().expect("morsel");
    assert_eq!(
        morsel
            .rows()
            .keys()
            .filter(|rn| morsel.full_row(**rn).is_some())
            .copied()
            .collect::<Vec<_>>(),
        vec![1, 2, 4, 8, 16, 32, 64]
    );
    for rn in [1, 2, 4, 8, 16, 32, 64] {
        assert_eq!(morsel.witnessed_at(rn), Some(1_000_000));
    }
    assert_eq!(morsel.witnessed_at(65), None);
}

#[test]
fn trails_for_unrelated_rows_are_dropped_at_build() {
    let ledger = source_ledger(8);
    let mut builder = MorselBuilder::from_path(&ledger.state_path().expect("path"));
    builder.add_trail(5, trail_for(ledger.row_hash(5).expect("H(5)"), 9));
    let morsel = builder.build().expect("morsel");
    // Row 5 is neither carried nor referenced by the state path of 8.
    assert!(morsel.trails().is_empty());
}

#[test]
fn mismatched_trail_is_rejected() {
    let ledger = source_ledger(8);
    let mut builder = MorselBuilder::from_path(&ledger.state_path().expect("path"));
    builder.add_trail(8, trail_for(ledger.row_hash(7).expect("H(7)"), 9));
    let err = builder.build().expect_err("trail for the wrong hash");
    assert!(matches!(
        err,
        MorselError::Ledger(LedgerError::HashConflict(8))
    ));
}

#[test]
fn source_without_full_row_is_rejected() {
    let ledger = source_ledger(8);
    let mut builder = MorselBuilder::from_path(&ledger.state_path().expect("path"));
    builder.add_source(source_row(5));
    let err = builder.build().expect_err("no full row 5");
    assert!(matches!(
        err,
        MorselError::Ledger(LedgerError::MissingRow(5))
    ));
}

#[test]
fn tampered_bytes_fail_on_load() {
    let ledger = source_ledger(4);
    let morsel = MorselBuilder::from_path(&ledger.state_path().expect("path"))
        .build()
        .expect("morsel");
    let clean = morsel.to_bytes();

    // Truncation.
    assert!(Morsel::from_bytes(&clean[..clean.len() - 1]).is_err());
    // Bad magic.
    let mut bad = clean.clone();
    bad[0] ^= 0xFF;
    assert!(matches!(
        Morsel::from_bytes(&bad),
        Err(MorselError::Format { section: "file", .. })
    ));
    // Flip one bit inside the row section: some hash check must fail.
    let mut forged = clean.clone();
    let at = forged.len() - 1;
    forged[at] ^= 0x01;
    assert!(Morsel::from_bytes(&forged).is_err());
}

#[test]
fn sources_and_declared_inputs_must_agree() {
    let ledger = source_ledger(5);
    // Row 3 rides along only as a reference row, so it cannot anchor a
    // source row.
    let mut builder = MorselBuilder::from_path(&ledger.path_to(&[4]).expect("path"));
    builder.add_source(source_row(3));
    let err = builder.build().expect_err("source keyed to a reference row");
    assert!(matches!(
        err,
        MorselError::Ledger(LedgerError::MissingRow(3))
    ));

    let mut builder = MorselBuilder::from_path(&ledger.path_to(&[4]).expect("path"));
    let forged = sldg_core::source::SourceRow::from_values(
        4,
        vec![sldg_core::source::ColumnValue::String("forged".into())],
        &common::seed(),
    )
    .expect("forged source");
    builder.add_source(forged);
    let err = builder.build().expect_err("content drift");
    assert!(matches!(
        err,
        MorselError::Ledger(LedgerError::SourceMismatch { rn: 4 })
    ));
}
