//! Operations over morsels: merge and sub-morsel extraction.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sldg_core::error::LedgerError;
use sldg_core::numbering::pointer_rns;
use sldg_core::source::{SourceCell, SourceRow, check_cell_hash, column_number};
use tracing::debug;

use crate::error::MorselError;
use crate::pack::{Morsel, MorselMeta, RowEntry};

/// Merge morsels from the same ledger into one.
///
/// The **authority** is the input declaring the largest row number (ties
/// broken by full-row count, then input order); its declared state, metadata
/// and assets carry into the result. Row, source, and trail sets are
/// unioned, preferring full rows over references and revealed cells over
/// redacted ones.
///
/// # Errors
/// - [`LedgerError::HashConflict`] if any row number carried by two inputs
///   has disagreeing row-hashes (the morsels are from different ledgers);
/// - [`MorselError::NotMergeable`] if the inputs are empty or some input
///   shares no row with the rest (no common ancestor);
/// - [`LedgerError::InvalidColumn`] if a revealed cell does not hash to a
///   redacted counterpart;
/// - any verification failure of the combined result.
pub fn merge(inputs: &[Morsel]) -> Result<Morsel, MorselError> {
    let Some(first) = inputs.first() else {
        return Err(MorselError::NotMergeable("nothing to merge".into()));
    };
    if inputs.len() == 1 {
        return Ok(first.clone());
    }
    check_shared_lineage(inputs)?;
    let authority = authority_of(inputs);
    debug!(
        hi_rn = authority.hi_rn(),
        inputs = inputs.len(),
        "merging morsels"
    );

    // Absorb inputs into the authority's sets, connectivity checked as we
    // go: an input with no row in common with what has been absorbed so far
    // shares no lineage with it.
    let mut rows = authority.rows().clone();
    let mut sources = authority.sources().clone();
    let mut trails = authority.trails().clone();
    let mut pending: VecDeque<&Morsel> = inputs
        .iter()
        .filter(|input| !std::ptr::eq(*input, authority))
        .collect();
    let mut stalled = 0_usize;
    while let Some(input) = pending.pop_front() {
        let connected = input.rows().keys().any(|rn| rows.contains_key(rn));
        if !connected {
            stalled = stalled.saturating_add(1);
            if stalled > pending.len() {
                return Err(MorselError::NotMergeable(
                    "no common ancestor links every input".into(),
                ));
            }
            pending.push_back(input);
            continue;
        }
        stalled = 0;
        absorb_rows(&mut rows, input.rows());
        absorb_sources(&mut sources, input.sources())?;
        for (&rn, trail) in input.trails() {
            trails.entry(rn).or_insert_with(|| trail.clone());
        }
    }
    trails.retain(|rn, _| rows.contains_key(rn));

    Morsel::from_parts(
        authority.hi_rn(),
        authority.hi_hash(),
        rows,
        sources,
        trails,
        authority.meta().cloned(),
        authority.assets().cloned(),
    )
}

/// Fail with the smallest conflicting row number if any two inputs disagree
/// on a row-hash.
fn check_shared_lineage(inputs: &[Morsel]) -> Result<(), MorselError> {
    for (at, left) in inputs.iter().enumerate() {
        for right in inputs.iter().skip(at.saturating_add(1)) {
            for (&rn, entry) in left.rows() {
                if let Some(other) = right.rows().get(&rn) {
                    if entry.hash() != other.hash() {
                        return Err(LedgerError::HashConflict(rn).into());
                    }
                }
            }
        }
    }
    Ok(())
}

/// The input with the largest declared row number; ties broken by full-row
/// count, then by input order (first wins).
fn authority_of(inputs: &[Morsel]) -> &Morsel {
    let mut best = inputs.first().unwrap_or_else(|| {
        unreachable!("callers check for emptiness")
    });
    for input in inputs.iter().skip(1) {
        let candidate = (input.hi_rn(), full_count(input));
        if candidate > (best.hi_rn(), full_count(best)) {
            best = input;
        }
    }
    best
}

fn full_count(morsel: &Morsel) -> usize {
    morsel
        .rows()
        .values()
        .filter(|entry| entry.as_full().is_some())
        .count()
}

/// Union row entries, upgrading references to full rows where available.
fn absorb_rows(rows: &mut BTreeMap<u64, RowEntry>, other: &BTreeMap<u64, RowEntry>) {
    for (&rn, entry) in other {
        match rows.get(&rn) {
            None => {
                rows.insert(rn, entry.clone());
            }
            Some(existing)
                if existing.as_full().is_none() && entry.as_full().is_some() =>
            {
                rows.insert(rn, entry.clone());
            }
            Some(_) => {}
        }
    }
}

/// Union source rows, merging cell-wise so a cell revealed by either side
/// stays revealed.
fn absorb_sources(
    sources: &mut BTreeMap<u64, SourceRow>,
    other: &BTreeMap<u64, SourceRow>,
) -> Result<(), MorselError> {
    for (&rn, source) in other {
        match sources.get(&rn) {
            None => {
                sources.insert(rn, source.clone());
            }
            Some(base) => {
                let merged = merge_source_cells(base, source)?;
                sources.insert(rn, merged);
            }
        }
    }
    Ok(())
}

fn merge_source_cells(base: &SourceRow, other: &SourceRow) -> Result<SourceRow, MorselError> {
    if base.cells().len() != other.cells().len() {
        // Structurally different claims for the same row; both verify
        // against the same input-hash or not at all, so keep the base.
        return Ok(base.clone());
    }
    let rn = base.rn();
    let mut cells = Vec::with_capacity(base.cells().len());
    for (at, (ours, theirs)) in base.cells().iter().zip(other.cells()).enumerate() {
        let column = column_number(at);
        let cell = match (ours, theirs) {
            (SourceCell::Hashed(declared), revealed @ SourceCell::Value { .. }) => {
                check_cell_hash(revealed, *declared, rn, column)?;
                revealed.clone()
            }
            (revealed @ SourceCell::Value { .. }, SourceCell::Hashed(declared)) => {
                check_cell_hash(revealed, *declared, rn, column)?;
                revealed.clone()
            }
            (ours, theirs) => {
                if ours.cell_hash() != theirs.cell_hash() {
                    return Err(LedgerError::InvalidColumn { rn, column }.into());
                }
                ours.clone()
            }
        };
        cells.push(cell);
    }
    Ok(SourceRow::new(rn, cells)?)
}

/// Extract a sub-morsel: the rows needed to prove each row in `keep_rns`
/// (and the declared state), the corresponding source rows with the 1-based
/// `redact_columns` replaced by their cell hashes, and every trail of the
/// input that witnesses a retained row. An optional `comment` becomes the
/// output's meta description.
///
/// # Errors
/// - [`LedgerError::MissingRow`] if a kept row has no source row in the
///   input;
/// - any verification failure of the extracted result.
pub fn submerge(
    morsel: &Morsel,
    keep_rns: &[u64],
    redact_columns: &BTreeSet<u32>,
    comment: Option<&str>,
) -> Result<Morsel, MorselError> {
    let mut retained: BTreeSet<u64> =
        sldg_core::path::state_path_rns(morsel.hi_rn()).into_iter().collect();
    let mut sources = BTreeMap::new();
    for &rn in keep_rns {
        let source = morsel
            .sources()
            .get(&rn)
            .ok_or(LedgerError::MissingRow(rn))?;
        retained.extend(chain_to(morsel, rn)?);
        sources.insert(rn, source.redacted(redact_columns));
    }

    let mut rows = BTreeMap::new();
    for &rn in &retained {
        let row = morsel
            .full_row(rn)
            .ok_or(LedgerError::MissingRow(rn))?
            .clone();
        rows.insert(rn, RowEntry::Full(row));
    }
    // Reference rows for every pointer that left the full set.
    let referenced: Vec<(u64, sldg_core::hash::LedgerHash)> = rows
        .values()
        .filter_map(RowEntry::as_full)
        .flat_map(|row| {
            pointer_rns(row.rn())
                .into_iter()
                .zip(row.ptr_cells().iter().copied())
        })
        .filter(|&(rn, _)| rn >= 1)
        .collect();
    for (rn, hash) in referenced {
        rows.entry(rn).or_insert(RowEntry::Reference { rn, hash });
    }

    let trails: BTreeMap<u64, _> = morsel
        .trails()
        .iter()
        .filter(|(rn, _)| rows.contains_key(rn))
        .map(|(&rn, trail)| (rn, trail.clone()))
        .collect();

    let meta = match (morsel.meta(), comment) {
        (Some(meta), Some(comment)) => Some(MorselMeta {
            description: comment.to_owned(),
            ..meta.clone()
        }),
        (Some(meta), None) => Some(meta.clone()),
        (None, Some(comment)) => Some(MorselMeta {
            description: comment.to_owned(),
            ..MorselMeta::default()
        }),
        (None, None) => None,
    };

    debug!(
        hi_rn = morsel.hi_rn(),
        kept = keep_rns.len(),
        redacted = redact_columns.len(),
        "extracting sub-morsel"
    );
    Morsel::from_parts(
        morsel.hi_rn(),
        morsel.hi_hash(),
        rows,
        sources,
        trails,
        meta,
        None,
    )
}

/// A shortest pointer chain from the declared row down to `target` through
/// the morsel's full rows, largest jumps preferred.
fn chain_to(morsel: &Morsel, target: u64) -> Result<Vec<u64>, MorselError> {
    let hi = morsel.hi_rn();
    if target == hi {
        return Ok(vec![hi]);
    }
    let mut parent: BTreeMap<u64, u64> = BTreeMap::new();
    let mut queue = VecDeque::from([hi]);
    while let Some(rn) = queue.pop_front() {
        let Some(row) = morsel.full_row(rn) else {
            continue;
        };
        // Largest jump first keeps the chain aligned with skip paths.
        for ptr_rn in pointer_rns(row.rn()).into_iter().rev() {
            if ptr_rn < target || ptr_rn == 0 {
                continue;
            }
            if morsel.rows().contains_key(&ptr_rn)
                && !parent.contains_key(&ptr_rn)
            {
                parent.insert(ptr_rn, rn);
                if ptr_rn == target {
                    let mut chain = vec![target];
                    let mut cur = target;
                    while let Some(&up) = parent.get(&cur) {
                        chain.push(up);
                        cur = up;
                    }
                    return Ok(chain);
                }
                queue.push_back(ptr_rn);
            }
        }
    }
    Err(LedgerError::MissingRow(target).into())
}
