//! Assembling morsels from verified paths.

use std::collections::BTreeMap;

use sldg_core::crumtrail::Crumtrail;
use sldg_core::path::Path;
use sldg_core::row::Row;
use sldg_core::source::SourceRow;
use tracing::debug;

use crate::error::MorselError;
use crate::pack::{Morsel, MorselAssets, MorselMeta, RowEntry};

/// A stateless morsel builder: feed it a verified path and any sources,
/// trails, metadata, and assets, then [`MorselBuilder::build`].
///
/// Reference rows are filled in automatically: every row a carried full row
/// points at is present at least as a reference.
#[derive(Debug, Default)]
pub struct MorselBuilder {
    rows: BTreeMap<u64, RowEntry>,
    sources: BTreeMap<u64, SourceRow>,
    trails: BTreeMap<u64, Crumtrail>,
    meta: Option<MorselMeta>,
    assets: Option<MorselAssets>,
    hi_rn: u64,
}

impl MorselBuilder {
    /// Start from a verified path; its tail becomes the declared state.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let mut builder = Self::default();
        for row in path.rows() {
            builder.add_full_row(row.clone());
        }
        builder.hi_rn = path.tail().rn();
        builder
    }

    /// Carry another full row (e.g. from a second path over the same
    /// ledger). The declared state stays the highest row seen.
    pub fn add_full_row(&mut self, row: Row) -> &mut Self {
        self.hi_rn = self.hi_rn.max(row.rn());
        self.rows.insert(row.rn(), RowEntry::Full(row));
        self
    }

    /// Carry a source row; its ledger row must be in the set at build time.
    pub fn add_source(&mut self, source: SourceRow) -> &mut Self {
        self.sources.insert(source.rn(), source);
        self
    }

    /// Carry a witness record indexed at `rn`. Trails for rows outside the
    /// final row set are dropped at build time.
    pub fn add_trail(&mut self, rn: u64, trail: Crumtrail) -> &mut Self {
        self.trails.insert(rn, trail);
        self
    }

    /// Attach descriptive metadata.
    pub fn meta(&mut self, meta: MorselMeta) -> &mut Self {
        self.meta = Some(meta);
        self
    }

    /// Attach an asset blob, committed by its SHA-256.
    pub fn assets(&mut self, blob: Vec<u8>) -> &mut Self {
        self.assets = Some(MorselAssets::new(blob));
        self
    }

    /// Fill in reference rows, drop irrelevant trails, and verify.
    ///
    /// # Errors
    /// The verification errors of [`Morsel::from_parts`].
    pub fn build(self) -> Result<Morsel, MorselError> {
        let Self {
            mut rows,
            sources,
            mut trails,
            meta,
            assets,
            hi_rn,
        } = self;
        let hi_hash = rows
            .get(&hi_rn)
            .map(RowEntry::hash)
            .unwrap_or_default();
        // Any row a full row points at joins the set, at least by reference.
        let referenced: Vec<(u64, sldg_core::hash::LedgerHash)> = rows
            .values()
            .filter_map(RowEntry::as_full)
            .flat_map(|row| {
                sldg_core::numbering::pointer_rns(row.rn())
                    .into_iter()
                    .zip(row.ptr_cells().iter().copied())
            })
            .filter(|&(rn, _)| rn >= 1)
            .collect();
        for (rn, hash) in referenced {
            rows.entry(rn).or_insert(RowEntry::Reference { rn, hash });
        }
        trails.retain(|rn, _| rows.contains_key(rn));
        debug!(
            hi_rn,
            rows = rows.len(),
            sources = sources.len(),
            trails = trails.len(),
            "building morsel"
        );
        Morsel::from_parts(hi_rn, hi_hash, rows, sources, trails, meta, assets)
    }
}
