//! Command implementations behind the CLI surface.

pub mod ledger;
pub mod morsel;

use std::io::Write as _;

use sldg_core::source::{SourceCell, SourceRow};

/// A mistake in what the user asked for, as opposed to a failure doing it.
/// Mapped to exit code 2 at the process boundary.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct UserError(pub String);

/// Write a line of command output to stdout.
///
/// # Errors
/// Propagates the underlying write failure.
pub fn emit(line: &str) -> eyre::Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{line}")?;
    Ok(())
}

/// Map a failure to the documented process exit codes: 2 for user errors,
/// 3 for I/O, 1 otherwise.
#[must_use]
pub fn exit_code(err: &eyre::Report) -> i32 {
    for cause in err.chain() {
        if cause.is::<UserError>() {
            return 2;
        }
        if cause.is::<std::io::Error>() {
            return 3;
        }
        if let Some(store) = cause.downcast_ref::<sldg_store::error::StoreError>() {
            if matches!(store, sldg_store::error::StoreError::Io(_)) {
                return 3;
            }
        }
        if let Some(log) = cause.downcast_ref::<sldg_logs::error::LogError>() {
            if matches!(log, sldg_logs::error::LogError::Io(_)) {
                return 3;
            }
        }
        if let Some(morsel) = cause.downcast_ref::<sldg_morsel::error::MorselError>() {
            if matches!(morsel, sldg_morsel::error::MorselError::Io(_)) {
                return 3;
            }
        }
    }
    1
}

/// A source row rendered for JSON output: per cell, the kind plus either
/// the revealed value and salt or the substituted hash.
#[must_use]
pub fn source_row_json(source: &SourceRow) -> serde_json::Value {
    let cells: Vec<serde_json::Value> = source
        .cells()
        .iter()
        .map(|cell| match cell {
            SourceCell::Hashed(hash) => serde_json::json!({
                "kind": "hash",
                "hash": hash,
            }),
            SourceCell::Value { value, salt } => serde_json::json!({
                "column": value,
                "salt": salt,
            }),
        })
        .collect();
    serde_json::json!({
        "rn": source.rn(),
        "input_hash": source.input_hash(),
        "cells": cells,
    })
}
