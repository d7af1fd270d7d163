//! The morsel: a self-contained, tamper-evident bundle.
//!
//! A morsel declares a ledger state `(hi_rn, hi_hash)` and carries a row
//! set sufficient to verify everything else it holds against that
//! commitment: source rows (possibly redacted), crumtrails, descriptive
//! metadata, and an optional asset blob. Every constructor and the parser
//! run the full verification; a `Morsel` value in hand has already proved
//! itself.

use std::collections::{BTreeMap, BTreeSet};

use sldg_core::crumtrail::Crumtrail;
use sldg_core::error::LedgerError;
use sldg_core::hash::{LedgerHash, sha256};
use sldg_core::numbering::{pointer_rns, skip_count};
use sldg_core::path::state_path_rns;
use sldg_core::row::Row;
use sldg_core::source::{
    ColumnValue, SourceCell, SourceRow, TAG_BYTES, TAG_DATE, TAG_DOUBLE, TAG_HASH, TAG_LONG,
    TAG_NULL, TAG_STRING,
};

use crate::codec::{
    MAGIC, SectionReader, TAG_ASSETS, TAG_META, TAG_ROWS, TAG_SOURCES, TAG_STATE, TAG_TRAILS,
    VERSION, put_section, put_str,
};
use crate::error::MorselError;

/// A row carried by a morsel: full cells, or just the row-hash when the row
/// is only referenced by higher rows in the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowEntry {
    /// All cells of the row.
    Full(Row),
    /// Only the row-hash.
    Reference {
        /// The row number.
        rn: u64,
        /// The row-hash.
        hash: LedgerHash,
    },
}

impl RowEntry {
    /// The row number.
    #[must_use]
    pub const fn rn(&self) -> u64 {
        match self {
            Self::Full(row) => row.rn(),
            Self::Reference { rn, .. } => *rn,
        }
    }

    /// The row-hash: recomputed for a full row, declared for a reference.
    #[must_use]
    pub fn hash(&self) -> LedgerHash {
        match self {
            Self::Full(row) => row.hash(),
            Self::Reference { hash, .. } => *hash,
        }
    }

    /// The full row, if this entry carries one.
    #[must_use]
    pub const fn as_full(&self) -> Option<&Row> {
        match self {
            Self::Full(row) => Some(row),
            Self::Reference { .. } => None,
        }
    }
}

/// Per-column descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct ColumnMeta {
    /// 1-based column number.
    pub column: u32,
    /// Column name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

/// Descriptive metadata; never hashed, purely presentational.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct MorselMeta {
    /// Morsel name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Display format for `date` columns.
    pub date_format: String,
    /// Column annotations, ascending by column number.
    pub columns: Vec<ColumnMeta>,
}

/// An opaque asset blob committed by its SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MorselAssets {
    hash: LedgerHash,
    blob: Vec<u8>,
}

impl MorselAssets {
    /// Commit a blob under its SHA-256.
    #[must_use]
    pub fn new(blob: Vec<u8>) -> Self {
        Self {
            hash: sha256(&blob),
            blob,
        }
    }

    /// The committed hash.
    #[must_use]
    pub const fn hash(&self) -> LedgerHash {
        self.hash
    }

    /// The blob bytes.
    #[must_use]
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }
}

/// A verified, self-contained bundle of ledger evidence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Morsel {
    hi_rn: u64,
    hi_hash: LedgerHash,
    rows: BTreeMap<u64, RowEntry>,
    sources: BTreeMap<u64, SourceRow>,
    trails: BTreeMap<u64, Crumtrail>,
    meta: Option<MorselMeta>,
    assets: Option<MorselAssets>,
}

impl Morsel {
    /// Assemble a morsel from parts and verify the whole.
    ///
    /// # Errors
    /// Any verification failure; see [`Self::verify`].
    pub fn from_parts(
        hi_rn: u64,
        hi_hash: LedgerHash,
        rows: BTreeMap<u64, RowEntry>,
        sources: BTreeMap<u64, SourceRow>,
        trails: BTreeMap<u64, Crumtrail>,
        meta: Option<MorselMeta>,
        assets: Option<MorselAssets>,
    ) -> Result<Self, MorselError> {
        let morsel = Self {
            hi_rn,
            hi_hash,
            rows,
            sources,
            trails,
            meta,
            assets,
        };
        morsel.verify()?;
        Ok(morsel)
    }

    /// Re-run the structural verification performed at construction:
    ///
    /// 1. the declared row is present in full and hashes to `hi_hash`;
    /// 2. every full row's pointer cells resolve within the set (the
    ///    sentinel standing in for row zero) and match the referenced
    ///    row-hashes;
    /// 3. every carried row is reachable from the declared row, so its hash
    ///    is pinned by the commitment;
    /// 4. the skip path from row 1 to the declared row is present in full;
    /// 5. every source row recomputes to its full row's input-hash;
    /// 6. every crumtrail folds to its root and witnesses a carried row;
    /// 7. the asset blob, if any, hashes to its committed hash.
    ///
    /// # Errors
    /// The first failure, as the corresponding [`MorselError`] kind.
    pub fn verify(&self) -> Result<(), MorselError> {
        self.verify_declared_state()?;
        self.verify_links()?;
        self.verify_reachability()?;
        self.verify_state_path()?;
        self.verify_sources()?;
        self.verify_trails()?;
        if let Some(assets) = &self.assets {
            if sha256(assets.blob()) != assets.hash() {
                return Err(LedgerError::IntegrityFailure(
                    "asset blob does not hash to its committed hash".into(),
                )
                .into());
            }
        }
        Ok(())
    }

    fn verify_declared_state(&self) -> Result<(), MorselError> {
        if self.hi_rn == 0 {
            return Err(MorselError::Format {
                section: "state",
                detail: "declared row number must be positive".into(),
            });
        }
        let hi = self
            .rows
            .get(&self.hi_rn)
            .ok_or(LedgerError::MissingRow(self.hi_rn))?;
        if hi.as_full().is_none() {
            return Err(MorselError::Format {
                section: "rows",
                detail: format!("declared row {} must be carried in full", self.hi_rn),
            });
        }
        if hi.hash() != self.hi_hash {
            return Err(LedgerError::HashConflict(self.hi_rn).into());
        }
        Ok(())
    }

    fn verify_links(&self) -> Result<(), MorselError> {
        for (&rn, entry) in &self.rows {
            if entry.rn() != rn {
                return Err(MorselError::Format {
                    section: "rows",
                    detail: format!("entry keyed {rn} declares row {}", entry.rn()),
                });
            }
            let Some(row) = entry.as_full() else {
                continue;
            };
            for (ptr_rn, cell) in pointer_rns(rn).into_iter().zip(row.ptr_cells()) {
                if ptr_rn == 0 {
                    if !cell.is_sentinel() {
                        return Err(LedgerError::LinkBroken { from: 0, to: rn }.into());
                    }
                    continue;
                }
                let target = self
                    .rows
                    .get(&ptr_rn)
                    .ok_or(LedgerError::MissingRow(ptr_rn))?;
                if target.hash() != *cell {
                    return Err(LedgerError::LinkBroken {
                        from: ptr_rn,
                        to: rn,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn verify_reachability(&self) -> Result<(), MorselError> {
        let mut seen = BTreeSet::from([self.hi_rn]);
        let mut stack = vec![self.hi_rn];
        while let Some(rn) = stack.pop() {
            let Some(row) = self.rows.get(&rn).and_then(RowEntry::as_full) else {
                continue;
            };
            for ptr_rn in pointer_rns(row.rn()) {
                if ptr_rn >= 1 && seen.insert(ptr_rn) {
                    stack.push(ptr_rn);
                }
            }
        }
        if let Some(&stray) = self.rows.keys().find(|rn| !seen.contains(rn)) {
            return Err(LedgerError::IntegrityFailure(format!(
                "row {stray} is not linked under the declared state"
            ))
            .into());
        }
        Ok(())
    }

    fn verify_state_path(&self) -> Result<(), MorselError> {
        for rn in state_path_rns(self.hi_rn) {
            match self.rows.get(&rn) {
                None => return Err(LedgerError::MissingRow(rn).into()),
                Some(entry) if entry.as_full().is_none() => {
                    return Err(MorselError::Format {
                        section: "rows",
                        detail: format!("state-path row {rn} must be carried in full"),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn verify_sources(&self) -> Result<(), MorselError> {
        for (&rn, source) in &self.sources {
            if source.rn() != rn {
                return Err(MorselError::Format {
                    section: "sources",
                    detail: format!("source keyed {rn} declares row {}", source.rn()),
                });
            }
            let row = self
                .rows
                .get(&rn)
                .and_then(RowEntry::as_full)
                .ok_or(LedgerError::MissingRow(rn))?;
            source.verify_against(row.input_hash())?;
        }
        Ok(())
    }

    fn verify_trails(&self) -> Result<(), MorselError> {
        for (&rn, trail) in &self.trails {
            trail.verify()?;
            let entry = self.rows.get(&rn).ok_or(LedgerError::MissingRow(rn))?;
            if trail.hashed_value() != entry.hash() {
                return Err(LedgerError::HashConflict(rn).into());
            }
        }
        Ok(())
    }

    /// The declared state: `(hi_rn, hi_hash)`.
    #[must_use]
    pub const fn declared_state(&self) -> (u64, LedgerHash) {
        (self.hi_rn, self.hi_hash)
    }

    /// The declared row number.
    #[must_use]
    pub const fn hi_rn(&self) -> u64 {
        self.hi_rn
    }

    /// The declared commitment hash.
    #[must_use]
    pub const fn hi_hash(&self) -> LedgerHash {
        self.hi_hash
    }

    /// The row set, ascending.
    #[must_use]
    pub const fn rows(&self) -> &BTreeMap<u64, RowEntry> {
        &self.rows
    }

    /// The full row numbered `rn`, if carried in full.
    #[must_use]
    pub fn full_row(&self, rn: u64) -> Option<&Row> {
        self.rows.get(&rn).and_then(RowEntry::as_full)
    }

    /// The source rows, ascending by row number.
    #[must_use]
    pub const fn sources(&self) -> &BTreeMap<u64, SourceRow> {
        &self.sources
    }

    /// The crumtrails, ascending by witnessed row number.
    #[must_use]
    pub const fn trails(&self) -> &BTreeMap<u64, Crumtrail> {
        &self.trails
    }

    /// Descriptive metadata, if any.
    #[must_use]
    pub const fn meta(&self) -> Option<&MorselMeta> {
        self.meta.as_ref()
    }

    /// The committed asset blob, if any.
    #[must_use]
    pub const fn assets(&self) -> Option<&MorselAssets> {
        self.assets.as_ref()
    }

    /// The earliest witnessed time covering row `rn`, in UTC milliseconds.
    ///
    /// A trail indexed at `t` witnesses every row `<= t`, so this is the
    /// minimum timestamp over trails at or above `rn`.
    #[must_use]
    pub fn witnessed_at(&self, rn: u64) -> Option<i64> {
        self.trails
            .range(rn..)
            .map(|(_, trail)| trail.utc_ms())
            .min()
    }

    /// Serialize to the canonical `.mrsl` byte layout.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_be_bytes());
        put_section(&mut out, TAG_STATE, &self.state_payload());
        put_section(&mut out, TAG_ROWS, &self.rows_payload());
        if !self.sources.is_empty() {
            put_section(&mut out, TAG_SOURCES, &self.sources_payload());
        }
        if !self.trails.is_empty() {
            put_section(&mut out, TAG_TRAILS, &self.trails_payload());
        }
        if let Some(meta) = &self.meta {
            put_section(&mut out, TAG_META, &meta_payload(meta));
        }
        if let Some(assets) = &self.assets {
            let mut payload = Vec::with_capacity(assets.blob().len().saturating_add(32));
            payload.extend_from_slice(assets.hash().as_ref());
            payload.extend_from_slice(assets.blob());
            put_section(&mut out, TAG_ASSETS, &payload);
        }
        out
    }

    fn state_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(40);
        out.extend_from_slice(&self.hi_rn.to_be_bytes());
        out.extend_from_slice(self.hi_hash.as_ref());
        out
    }

    fn rows_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&count_u32(self.rows.len()).to_be_bytes());
        for (&rn, entry) in &self.rows {
            out.extend_from_slice(&rn.to_be_bytes());
            match entry {
                RowEntry::Reference { hash, .. } => {
                    out.push(0);
                    out.extend_from_slice(hash.as_ref());
                }
                RowEntry::Full(row) => {
                    out.push(1);
                    for cell in row.cells() {
                        out.extend_from_slice(cell.as_ref());
                    }
                }
            }
        }
        out
    }

    fn sources_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&count_u32(self.sources.len()).to_be_bytes());
        for (&rn, source) in &self.sources {
            out.extend_from_slice(&rn.to_be_bytes());
            out.extend_from_slice(&count_u32(source.cells().len()).to_be_bytes());
            for cell in source.cells() {
                match cell {
                    SourceCell::Hashed(hash) => {
                        out.push(TAG_HASH);
                        out.extend_from_slice(hash.as_ref());
                    }
                    SourceCell::Value { value, salt } => {
                        out.push(value.type_tag());
                        out.extend_from_slice(salt.as_ref());
                        let bytes = value.canonical_bytes();
                        out.extend_from_slice(&count_u32(bytes.len()).to_be_bytes());
                        out.extend_from_slice(&bytes);
                    }
                }
            }
        }
        out
    }

    fn trails_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&count_u32(self.trails.len()).to_be_bytes());
        for (&rn, trail) in &self.trails {
            out.extend_from_slice(&rn.to_be_bytes());
            let bytes = trail.to_bytes();
            out.extend_from_slice(&count_u32(bytes.len()).to_be_bytes());
            out.extend_from_slice(&bytes);
        }
        out
    }

    /// Parse and verify the canonical `.mrsl` byte layout.
    ///
    /// # Errors
    /// [`MorselError::Format`] on structural problems; the verification
    /// errors of [`Self::from_parts`] otherwise.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MorselError> {
        let mut file = SectionReader::new("file", data);
        if file.take_array::<4>()? != MAGIC {
            return Err(file.bad("bad magic"));
        }
        let version = u16::from_be_bytes(file.take_array::<2>()?);
        if version != VERSION {
            return Err(file.bad(format!("unknown version {version}")));
        }
        let mut state = None;
        let mut rows = None;
        let mut sources = BTreeMap::new();
        let mut trails = BTreeMap::new();
        let mut meta = None;
        let mut assets = None;
        let mut prev_tag = 0_u8;
        while file.remaining() > 0 {
            let tag = file.take_u8()?;
            if tag <= prev_tag {
                return Err(file.bad(format!(
                    "section {tag:#04x} out of order after {prev_tag:#04x}"
                )));
            }
            prev_tag = tag;
            let len = usize::try_from(file.take_u32()?)
                .map_err(|_| file.bad("section length overflows memory"))?;
            let payload = file.take(len)?;
            match tag {
                TAG_STATE => state = Some(parse_state(payload)?),
                TAG_ROWS => rows = Some(parse_rows(payload)?),
                TAG_SOURCES => sources = parse_sources(payload)?,
                TAG_TRAILS => trails = parse_trails(payload)?,
                TAG_META => meta = Some(parse_meta(payload)?),
                TAG_ASSETS => assets = Some(parse_assets(payload)?),
                unknown => {
                    return Err(file.bad(format!("unknown section tag {unknown:#04x}")));
                }
            }
        }
        let (hi_rn, hi_hash) = state.ok_or_else(|| file.bad("missing state section"))?;
        let rows = rows.ok_or_else(|| file.bad("missing rows section"))?;
        Self::from_parts(hi_rn, hi_hash, rows, sources, trails, meta, assets)
    }
}

/// Clamp a collection length into the `u32` count fields.
fn count_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

fn meta_payload(meta: &MorselMeta) -> Vec<u8> {
    let mut out = Vec::new();
    put_str(&mut out, &meta.name);
    put_str(&mut out, &meta.description);
    put_str(&mut out, &meta.date_format);
    out.extend_from_slice(&count_u32(meta.columns.len()).to_be_bytes());
    for column in &meta.columns {
        out.extend_from_slice(&column.column.to_be_bytes());
        put_str(&mut out, &column.name);
        put_str(&mut out, &column.description);
    }
    out
}

fn parse_state(payload: &[u8]) -> Result<(u64, LedgerHash), MorselError> {
    let mut reader = SectionReader::new("state", payload);
    let hi_rn = reader.take_u64()?;
    let hi_hash = reader.take_hash()?;
    reader.finish()?;
    Ok((hi_rn, hi_hash))
}

fn parse_rows(payload: &[u8]) -> Result<BTreeMap<u64, RowEntry>, MorselError> {
    let mut reader = SectionReader::new("rows", payload);
    let count = reader.take_u32()?;
    let mut rows = BTreeMap::new();
    let mut prev_rn = None;
    for _ in 0..count {
        let rn = reader.take_u64()?;
        if prev_rn.is_some_and(|prev| rn <= prev) {
            return Err(reader.bad(format!("row {rn} out of order")));
        }
        prev_rn = Some(rn);
        if rn == 0 {
            return Err(reader.bad("the sentinel row cannot be carried"));
        }
        let entry = match reader.take_u8()? {
            0 => RowEntry::Reference {
                rn,
                hash: reader.take_hash()?,
            },
            1 => {
                let input_hash = reader.take_hash()?;
                let mut ptrs = Vec::new();
                for _ in 0..skip_count(rn) {
                    ptrs.push(reader.take_hash()?);
                }
                RowEntry::Full(Row::new(rn, input_hash, ptrs)?)
            }
            other => return Err(reader.bad(format!("unknown row kind {other:#04x}"))),
        };
        rows.insert(rn, entry);
    }
    reader.finish()?;
    if rows.is_empty() {
        return Err(MorselError::Format {
            section: "rows",
            detail: "empty row set".into(),
        });
    }
    Ok(rows)
}

fn parse_sources(payload: &[u8]) -> Result<BTreeMap<u64, SourceRow>, MorselError> {
    let mut reader = SectionReader::new("sources", payload);
    let count = reader.take_u32()?;
    if count == 0 {
        return Err(reader.bad("empty section must be omitted"));
    }
    let mut sources = BTreeMap::new();
    let mut prev_rn = None;
    for _ in 0..count {
        let rn = reader.take_u64()?;
        if prev_rn.is_some_and(|prev| rn <= prev) {
            return Err(reader.bad(format!("source row {rn} out of order")));
        }
        prev_rn = Some(rn);
        let columns = reader.take_u32()?;
        let mut cells = Vec::new();
        for _ in 0..columns {
            cells.push(parse_cell(&mut reader)?);
        }
        sources.insert(rn, SourceRow::new(rn, cells)?);
    }
    reader.finish()?;
    Ok(sources)
}

fn parse_cell(reader: &mut SectionReader<'_>) -> Result<SourceCell, MorselError> {
    let tag = reader.take_u8()?;
    if tag == TAG_HASH {
        return Ok(SourceCell::Hashed(reader.take_hash()?));
    }
    let salt = reader.take_hash()?;
    let len = usize::try_from(reader.take_u32()?)
        .map_err(|_| reader.bad("cell length overflows memory"))?;
    let bytes = reader.take(len)?;
    let value = match tag {
        TAG_NULL => {
            if !bytes.is_empty() {
                return Err(reader.bad("null cell with a payload"));
            }
            ColumnValue::Null
        }
        TAG_STRING => ColumnValue::String(
            String::from_utf8(bytes.to_vec())
                .map_err(|_| reader.bad("string cell is not UTF-8"))?,
        ),
        TAG_LONG => ColumnValue::Long(i64::from_be_bytes(fixed8(reader, bytes)?)),
        TAG_DOUBLE => ColumnValue::Double(f64::from_be_bytes(fixed8(reader, bytes)?)),
        TAG_DATE => ColumnValue::Date(i64::from_be_bytes(fixed8(reader, bytes)?)),
        TAG_BYTES => ColumnValue::Bytes(bytes.to_vec()),
        unknown => return Err(reader.bad(format!("unknown cell tag {unknown:#04x}"))),
    };
    Ok(SourceCell::Value { value, salt })
}

fn fixed8(reader: &SectionReader<'_>, bytes: &[u8]) -> Result<[u8; 8], MorselError> {
    bytes
        .try_into()
        .map_err(|_| reader.bad(format!("expected 8 canonical bytes, got {}", bytes.len())))
}

fn parse_trails(payload: &[u8]) -> Result<BTreeMap<u64, Crumtrail>, MorselError> {
    let mut reader = SectionReader::new("trails", payload);
    let count = reader.take_u32()?;
    if count == 0 {
        return Err(reader.bad("empty section must be omitted"));
    }
    let mut trails = BTreeMap::new();
    let mut prev_rn = None;
    for _ in 0..count {
        let rn = reader.take_u64()?;
        if prev_rn.is_some_and(|prev| rn <= prev) {
            return Err(reader.bad(format!("trail for row {rn} out of order")));
        }
        prev_rn = Some(rn);
        let len = usize::try_from(reader.take_u32()?)
            .map_err(|_| reader.bad("trail length overflows memory"))?;
        let bytes = reader.take(len)?;
        trails.insert(rn, Crumtrail::from_bytes(bytes)?);
    }
    reader.finish()?;
    Ok(trails)
}

fn parse_meta(payload: &[u8]) -> Result<MorselMeta, MorselError> {
    let mut reader = SectionReader::new("meta", payload);
    let name = reader.take_str()?;
    let description = reader.take_str()?;
    let date_format = reader.take_str()?;
    let count = reader.take_u32()?;
    let mut columns = Vec::new();
    let mut prev_col = None;
    for _ in 0..count {
        let column = reader.take_u32()?;
        if prev_col.is_some_and(|prev| column <= prev) {
            return Err(reader.bad(format!("column {column} metadata out of order")));
        }
        prev_col = Some(column);
        columns.push(ColumnMeta {
            column,
            name: reader.take_str()?,
            description: reader.take_str()?,
        });
    }
    reader.finish()?;
    Ok(MorselMeta {
        name,
        description,
        date_format,
        columns,
    })
}

fn parse_assets(payload: &[u8]) -> Result<MorselAssets, MorselError> {
    let mut reader = SectionReader::new("assets", payload);
    let hash = reader.take_hash()?;
    let blob = reader.take(reader.remaining())?.to_vec();
    if sha256(&blob) != hash {
        return Err(LedgerError::IntegrityFailure(
            "asset blob does not hash to its committed hash".into(),
        )
        .into());
    }
    Ok(MorselAssets { hash, blob })
}
