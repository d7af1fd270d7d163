//! Client-side command implementations over `.mrsl` files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context as _, Result};
use sldg_morsel::ops;
use sldg_morsel::pack::Morsel;

use super::{UserError, emit, source_row_json};
use crate::cli::{parse_column_list, parse_rn_list};

fn load(file: &Path) -> Result<Morsel> {
    let bytes =
        fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    Morsel::from_bytes(&bytes)
        .with_context(|| format!("{} failed verification", file.display()))
}

/// `morsel sum`: one-line summary.
pub fn sum(file: &Path) -> Result<()> {
    let morsel = load(file)?;
    let (hi_rn, hi_hash) = morsel.declared_state();
    emit(&format!("{hi_rn} {hi_hash}"))
}

/// `morsel info`: content counts and metadata.
pub fn info(file: &Path) -> Result<()> {
    let morsel = load(file)?;
    let full = morsel
        .rows()
        .values()
        .filter(|entry| entry.as_full().is_some())
        .count();
    emit(&format!("declared row:   {}", morsel.hi_rn()))?;
    emit(&format!("state hash:     {}", morsel.hi_hash()))?;
    emit(&format!(
        "rows:           {} ({} full, {} reference)",
        morsel.rows().len(),
        full,
        morsel.rows().len().saturating_sub(full)
    ))?;
    emit(&format!("source rows:    {}", morsel.sources().len()))?;
    emit(&format!("witnesses:      {}", morsel.trails().len()))?;
    if let Some(meta) = morsel.meta() {
        emit(&format!("name:           {}", meta.name))?;
        emit(&format!("description:    {}", meta.description))?;
    }
    if let Some(assets) = morsel.assets() {
        emit(&format!(
            "assets:         {} byte(s), sha256 {}",
            assets.blob().len(),
            assets.hash()
        ))?;
    }
    Ok(())
}

/// `morsel state`: verify and print the declared state.
pub fn state(file: &Path) -> Result<()> {
    let morsel = load(file)?;
    let (hi_rn, hi_hash) = morsel.declared_state();
    emit(&format!("verified: {hi_rn} rows committed to {hi_hash}"))
}

/// `morsel entry`: one source row as JSON.
pub fn entry(file: &Path, rn: u64) -> Result<()> {
    let morsel = load(file)?;
    let source = morsel
        .sources()
        .get(&rn)
        .ok_or_else(|| UserError(format!("no source row {rn} in {}", file.display())))?;
    emit(&serde_json::to_string_pretty(&source_row_json(source))?)
}

/// `morsel history`: witness records and their times.
pub fn history(file: &Path) -> Result<()> {
    let morsel = load(file)?;
    if morsel.trails().is_empty() {
        return emit("no witnessed rows");
    }
    for (rn, trail) in morsel.trails() {
        emit(&format!(
            "{rn}\tutc_ms {}\t{}",
            trail.utc_ms(),
            trail.ref_url()
        ))?;
    }
    Ok(())
}

/// `morsel merge`: combine inputs into one file.
pub fn merge(inputs: &[PathBuf], out: &Path) -> Result<()> {
    let morsels = inputs.iter().map(|path| load(path)).collect::<Result<Vec<_>>>()?;
    let merged = ops::merge(&morsels)?;
    fs::write(out, merged.to_bytes())
        .with_context(|| format!("Failed to write {}", out.display()))?;
    emit(&format!(
        "wrote {} declaring state {} ({} rows, {} source row(s))",
        out.display(),
        merged.hi_hash(),
        merged.rows().len(),
        merged.sources().len()
    ))
}

/// `morsel submerge`: extract and redact.
pub fn submerge(
    file: &Path,
    out: &Path,
    rows: &str,
    redact: Option<&str>,
    comment: Option<&str>,
) -> Result<()> {
    let morsel = load(file)?;
    let keep = parse_rn_list(rows).map_err(|err| UserError(err.to_string()))?;
    if keep.is_empty() {
        return Err(UserError("no rows to keep".into()).into());
    }
    let columns: BTreeSet<u32> = match redact {
        Some(list) => parse_column_list(list)
            .map_err(|err| UserError(err.to_string()))?
            .into_iter()
            .collect(),
        None => BTreeSet::new(),
    };
    let sub = ops::submerge(&morsel, &keep, &columns, comment)?;
    fs::write(out, sub.to_bytes())
        .with_context(|| format!("Failed to write {}", out.display()))?;
    emit(&format!(
        "wrote {} with {} source row(s), {} column(s) redacted",
        out.display(),
        sub.sources().len(),
        columns.len()
    ))
}

/// `morsel dump`: the whole bundle as JSON.
pub fn dump(file: &Path) -> Result<()> {
    let morsel = load(file)?;
    let rows: Vec<serde_json::Value> = morsel
        .rows()
        .values()
        .map(|entry| match entry.as_full() {
            Some(row) => serde_json::json!({
                "rn": row.rn(),
                "kind": "full",
                "hash": entry.hash(),
                "cells": row.cells(),
            }),
            None => serde_json::json!({
                "rn": entry.rn(),
                "kind": "reference",
                "hash": entry.hash(),
            }),
        })
        .collect();
    let sources: Vec<serde_json::Value> =
        morsel.sources().values().map(source_row_json).collect();
    let trails: Vec<serde_json::Value> = morsel
        .trails()
        .iter()
        .map(|(rn, trail)| serde_json::json!({ "rn": rn, "trail": trail }))
        .collect();
    let value = serde_json::json!({
        "declared": {
            "rn": morsel.hi_rn(),
            "hash": morsel.hi_hash(),
        },
        "rows": rows,
        "sources": sources,
        "trails": trails,
        "meta": morsel.meta(),
        "assets_sha256": morsel.assets().map(sldg_morsel::pack::MorselAssets::hash),
    });
    emit(&serde_json::to_string_pretty(&value)?)
}
