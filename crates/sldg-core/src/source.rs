//! Source-row hashing: salted column hashes composed into a row input-hash.
//!
//! Each column value hashes to a 32-byte cell hash under a per-(row, column)
//! salt; the row's input-hash is the Merkle root of its cell hashes. Because
//! a `hash`-kind cell contributes its literal bytes, replacing any cell with
//! its precomputed hash (and withholding the salt) leaves the input-hash
//! intact. That substitution is the redaction primitive.

use std::collections::BTreeSet;
use std::fmt;

use secrecy::{ExposeSecret as _, SecretBox};
use sha2::{Digest as _, Sha256};

use crate::error::LedgerError;
use crate::hash::{HASH_WIDTH, LedgerHash, merkle_root};

/// Type-tag byte for the `null` kind.
pub const TAG_NULL: u8 = 0x00;
/// Type-tag byte for the `string` kind.
pub const TAG_STRING: u8 = 0x01;
/// Type-tag byte for the `long` kind.
pub const TAG_LONG: u8 = 0x02;
/// Type-tag byte for the `double` kind.
pub const TAG_DOUBLE: u8 = 0x03;
/// Type-tag byte for the `date` kind.
pub const TAG_DATE: u8 = 0x04;
/// Type-tag byte for the `bytes` kind.
pub const TAG_BYTES: u8 = 0x05;
/// Type-tag byte for the `hash` kind.
pub const TAG_HASH: u8 = 0xFF;

/// A column value of a source row.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum ColumnValue {
    /// Absent value; hashes over empty canonical bytes.
    Null,
    /// UTF-8 text.
    String(String),
    /// 64-bit signed integer, canonically 8 bytes big-endian.
    Long(i64),
    /// IEEE-754 double, canonically 8 bytes big-endian.
    Double(f64),
    /// UTC instant as signed milliseconds since the Unix epoch.
    Date(i64),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// A literal 32-byte hash; the substituted form of a redacted value.
    Hash(LedgerHash),
}

impl ColumnValue {
    /// The kind's type-tag byte.
    #[must_use]
    pub const fn type_tag(&self) -> u8 {
        match self {
            Self::Null => TAG_NULL,
            Self::String(_) => TAG_STRING,
            Self::Long(_) => TAG_LONG,
            Self::Double(_) => TAG_DOUBLE,
            Self::Date(_) => TAG_DATE,
            Self::Bytes(_) => TAG_BYTES,
            Self::Hash(_) => TAG_HASH,
        }
    }

    /// The bit-exact canonical encoding hashed under the cell salt.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            Self::Null => Vec::new(),
            Self::String(s) => s.as_bytes().to_vec(),
            Self::Long(v) | Self::Date(v) => v.to_be_bytes().to_vec(),
            Self::Double(v) => v.to_be_bytes().to_vec(),
            Self::Bytes(b) => b.clone(),
            Self::Hash(h) => h.to_bytes().to_vec(),
        }
    }
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        // Doubles compare by bit pattern, matching the canonical encoding.
        self.type_tag() == other.type_tag() && self.canonical_bytes() == other.canonical_bytes()
    }
}

impl Eq for ColumnValue {}

/// The ledger-wide 32-byte seed from which every cell salt derives.
///
/// The seed never leaves the process: only per-(row, column) salts may be
/// revealed, and only alongside their revealed values. The backing memory is
/// zeroed on drop.
pub struct SaltSeed(SecretBox<[u8; HASH_WIDTH]>);

impl SaltSeed {
    /// Wrap a 32-byte seed.
    #[must_use]
    pub fn new(seed: [u8; HASH_WIDTH]) -> Self {
        Self(SecretBox::new(Box::new(seed)))
    }

    /// The salt shared by all cells of row `rn`: `SHA256(seed || rn)` with
    /// `rn` as 8 bytes big-endian.
    #[must_use]
    pub fn row_salt(&self, rn: u64) -> LedgerHash {
        let mut hasher = Sha256::new();
        hasher.update(self.0.expose_secret());
        hasher.update(rn.to_be_bytes());
        LedgerHash::new(hasher.finalize().into())
    }

    /// The salt of column `column` (1-based) of row `rn`:
    /// `SHA256(row_salt || column)` with `column` as 4 bytes big-endian.
    #[must_use]
    pub fn cell_salt(&self, rn: u64, column: u32) -> LedgerHash {
        let mut hasher = Sha256::new();
        hasher.update(self.row_salt(rn).as_ref());
        hasher.update(column.to_be_bytes());
        LedgerHash::new(hasher.finalize().into())
    }
}

impl Clone for SaltSeed {
    fn clone(&self) -> Self {
        Self::new(*self.0.expose_secret())
    }
}

impl fmt::Debug for SaltSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SaltSeed([REDACTED])")
    }
}

/// One cell of a source row: either revealed material with its salt, or the
/// substituted cell hash of a redacted value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCell {
    /// A revealed value together with its derived salt.
    Value {
        /// The column value.
        value: ColumnValue,
        /// The per-(row, column) salt the value hashes under.
        salt: LedgerHash,
    },
    /// A redacted cell: only the 32-byte cell hash remains.
    Hashed(LedgerHash),
}

impl SourceCell {
    /// The cell hash: `SHA256(salt || type-tag || canonical-bytes)` for a
    /// revealed cell; the literal hash for a redacted one.
    #[must_use]
    pub fn cell_hash(&self) -> LedgerHash {
        match self {
            Self::Value { value, salt } => {
                let mut hasher = Sha256::new();
                hasher.update(salt.as_ref());
                hasher.update([value.type_tag()]);
                hasher.update(value.canonical_bytes());
                LedgerHash::new(hasher.finalize().into())
            }
            Self::Hashed(hash) => *hash,
        }
    }

    /// Whether the cell's value has been substituted by its hash.
    #[must_use]
    pub const fn is_redacted(&self) -> bool {
        matches!(self, Self::Hashed(_))
    }

    /// The revealed value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&ColumnValue> {
        match self {
            Self::Value { value, .. } => Some(value),
            Self::Hashed(_) => None,
        }
    }
}

/// A source row: the preimage of a skip-ledger row's input-hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    rn: u64,
    cells: Vec<SourceCell>,
}

impl SourceRow {
    /// Build a source row from its cells.
    ///
    /// # Errors
    /// - [`LedgerError::InvalidFormat`] if `rn` is zero or `cells` is empty;
    /// - [`LedgerError::MixedRedaction`] if a cell pairs a `hash`-kind value
    ///   with a salt: a redacted cell must carry only its hash.
    pub fn new(rn: u64, cells: Vec<SourceCell>) -> Result<Self, LedgerError> {
        if rn == 0 {
            return Err(LedgerError::InvalidFormat {
                section: "source row",
                detail: "row numbers start at 1".into(),
            });
        }
        if cells.is_empty() {
            return Err(LedgerError::InvalidFormat {
                section: "source row",
                detail: format!("source row {rn} has no columns"),
            });
        }
        for (at, cell) in cells.iter().enumerate() {
            if let SourceCell::Value {
                value: ColumnValue::Hash(_),
                ..
            } = cell
            {
                return Err(LedgerError::MixedRedaction {
                    rn,
                    column: column_number(at),
                });
            }
        }
        Ok(Self { rn, cells })
    }

    /// Build a source row from plain values, deriving each cell's salt from
    /// the seed. `hash`-kind values become redacted cells.
    ///
    /// # Errors
    /// [`LedgerError::InvalidFormat`] if `rn` is zero or `values` is empty.
    pub fn from_values(
        rn: u64,
        values: Vec<ColumnValue>,
        seed: &SaltSeed,
    ) -> Result<Self, LedgerError> {
        let cells = values
            .into_iter()
            .enumerate()
            .map(|(at, value)| match value {
                ColumnValue::Hash(hash) => SourceCell::Hashed(hash),
                revealed @ (ColumnValue::Null
                | ColumnValue::String(_)
                | ColumnValue::Long(_)
                | ColumnValue::Double(_)
                | ColumnValue::Date(_)
                | ColumnValue::Bytes(_)) => SourceCell::Value {
                    value: revealed,
                    salt: seed.cell_salt(rn, column_number(at)),
                },
            })
            .collect();
        Self::new(rn, cells)
    }

    /// The row number this source belongs to.
    #[must_use]
    pub const fn rn(&self) -> u64 {
        self.rn
    }

    /// The cells, in column order.
    #[must_use]
    pub fn cells(&self) -> &[SourceCell] {
        &self.cells
    }

    /// The cell hashes, in column order.
    #[must_use]
    pub fn cell_hashes(&self) -> Vec<LedgerHash> {
        self.cells.iter().map(SourceCell::cell_hash).collect()
    }

    /// The row's input-hash: the Merkle root of its cell hashes.
    #[must_use]
    pub fn input_hash(&self) -> LedgerHash {
        merkle_root(&self.cell_hashes())
            .unwrap_or_else(|| unreachable!("source rows are non-empty by construction"))
    }

    /// A copy with the 1-based `columns` replaced by their cell hashes and
    /// their salts dropped. Indices past the column count are ignored. The
    /// input-hash is unchanged.
    #[must_use]
    pub fn redacted(&self, columns: &BTreeSet<u32>) -> Self {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(at, cell)| {
                if columns.contains(&column_number(at)) {
                    SourceCell::Hashed(cell.cell_hash())
                } else {
                    cell.clone()
                }
            })
            .collect();
        Self { rn: self.rn, cells }
    }

    /// Check this source against the input-hash its ledger row declares.
    ///
    /// # Errors
    /// [`LedgerError::SourceMismatch`] if the recomputed input-hash differs.
    pub fn verify_against(&self, declared: LedgerHash) -> Result<(), LedgerError> {
        if self.input_hash() == declared {
            Ok(())
        } else {
            Err(LedgerError::SourceMismatch { rn: self.rn })
        }
    }
}

/// 1-based column number of a 0-based cell index.
#[must_use]
pub fn column_number(at: usize) -> u32 {
    u32::try_from(at.saturating_add(1)).unwrap_or(u32::MAX)
}

/// What the core consumes from a source ledger: dense, 1-based rows of
/// typed column values. The SQL ingestion tool and the text-log front end
/// both stand behind this contract.
pub trait SourceLedger {
    /// Number of source rows.
    ///
    /// # Errors
    /// Source-defined retrieval failures.
    fn size(&self) -> Result<u64, LedgerError>;

    /// The column values of row `rn`, `1 <= rn <= size()`.
    ///
    /// # Errors
    /// [`LedgerError::MissingRow`] if out of range; source-defined
    /// retrieval failures otherwise.
    fn row(&self, rn: u64) -> Result<Vec<ColumnValue>, LedgerError>;
}

/// Check a revealed cell against a previously declared cell hash (e.g. the
/// substituted hash carried by another copy of the same row).
///
/// # Errors
/// [`LedgerError::InvalidColumn`] if the recomputation disagrees.
pub fn check_cell_hash(
    cell: &SourceCell,
    declared: LedgerHash,
    rn: u64,
    column: u32,
) -> Result<(), LedgerError> {
    if cell.cell_hash() == declared {
        Ok(())
    } else {
        Err(LedgerError::InvalidColumn { rn, column })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        reason = "fixture rows have fixed column counts"
    )]

    use super::*;
    use crate::hash::sha256;

    fn seed() -> SaltSeed {
        SaltSeed::new([0x01; 32])
    }

    fn scenario_row() -> SourceRow {
        SourceRow::from_values(
            5,
            vec![
                ColumnValue::String("alice".into()),
                ColumnValue::Long(42),
                ColumnValue::String("secret".into()),
            ],
            &seed(),
        )
        .expect("row 5")
    }

    #[test]
    fn canonical_encodings_are_bit_exact() {
        assert!(ColumnValue::Null.canonical_bytes().is_empty());
        assert_eq!(ColumnValue::String("ab".into()).canonical_bytes(), b"ab");
        assert_eq!(
            ColumnValue::Long(-2).canonical_bytes(),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE]
        );
        assert_eq!(
            ColumnValue::Date(1_000_000).canonical_bytes(),
            1_000_000_i64.to_be_bytes()
        );
        assert_eq!(
            ColumnValue::Double(1.5).canonical_bytes(),
            1.5_f64.to_be_bytes()
        );
        assert_eq!(
            ColumnValue::Bytes(vec![7, 8]).canonical_bytes(),
            vec![7, 8]
        );
    }

    #[test]
    fn salts_derive_from_seed_row_and_column() {
        let seed = seed();
        let mut outer = Vec::new();
        outer.extend_from_slice(&[0x01; 32]);
        outer.extend_from_slice(&5_u64.to_be_bytes());
        let row_salt = sha256(&outer);
        assert_eq!(seed.row_salt(5), row_salt);

        let mut inner = Vec::new();
        inner.extend_from_slice(row_salt.as_ref());
        inner.extend_from_slice(&3_u32.to_be_bytes());
        assert_eq!(seed.cell_salt(5, 3), sha256(&inner));

        assert_ne!(seed.cell_salt(5, 1), seed.cell_salt(5, 2));
        assert_ne!(seed.cell_salt(5, 1), seed.cell_salt(6, 1));
    }

    #[test]
    fn cell_hash_covers_salt_tag_and_bytes() {
        let seed = seed();
        let salt = seed.cell_salt(5, 2);
        let cell = SourceCell::Value {
            value: ColumnValue::Long(42),
            salt,
        };
        let mut preimage = Vec::new();
        preimage.extend_from_slice(salt.as_ref());
        preimage.push(TAG_LONG);
        preimage.extend_from_slice(&42_i64.to_be_bytes());
        assert_eq!(cell.cell_hash(), sha256(&preimage));

        // Same canonical bytes, different tag: distinct hashes.
        let dated = SourceCell::Value {
            value: ColumnValue::Date(42),
            salt,
        };
        assert_ne!(cell.cell_hash(), dated.cell_hash());
    }

    #[test]
    fn redaction_preserves_the_input_hash() {
        let row = scenario_row();
        let before = row.input_hash();
        let redacted = row.redacted(&BTreeSet::from([3]));
        assert_eq!(redacted.input_hash(), before);
        assert!(redacted.cells()[2].is_redacted());
        assert!(!redacted.cells()[0].is_redacted());
        assert_eq!(
            redacted.cells()[2].cell_hash(),
            row.cells()[2].cell_hash()
        );
        // Out-of-range columns are ignored.
        assert_eq!(row.redacted(&BTreeSet::from([9])), row);
    }

    #[test]
    fn redacting_every_column_still_matches() {
        let row = scenario_row();
        let all = row.redacted(&BTreeSet::from([1, 2, 3]));
        assert_eq!(all.input_hash(), row.input_hash());
        assert!(all.cells().iter().all(SourceCell::is_redacted));
    }

    #[test]
    fn verify_against_detects_drift() {
        let row = scenario_row();
        row.verify_against(row.input_hash()).expect("matches");
        assert_eq!(
            row.verify_against(sha256(b"other")),
            Err(LedgerError::SourceMismatch { rn: 5 })
        );
    }

    #[test]
    fn mixed_redaction_is_rejected() {
        let err = SourceRow::new(
            5,
            vec![SourceCell::Value {
                value: ColumnValue::Hash(sha256(b"x")),
                salt: seed().cell_salt(5, 1),
            }],
        )
        .expect_err("hash value with a salt");
        assert_eq!(err, LedgerError::MixedRedaction { rn: 5, column: 1 });

        // Via from_values, a hash value becomes a redacted cell instead.
        let row = SourceRow::from_values(
            5,
            vec![ColumnValue::Hash(sha256(b"x")), ColumnValue::Null],
            &seed(),
        )
        .expect("hash kind folds to a redacted cell");
        assert!(row.cells()[0].is_redacted());
    }

    #[test]
    fn declared_cell_hash_check() {
        let row = scenario_row();
        let cell = &row.cells()[1];
        check_cell_hash(cell, cell.cell_hash(), 5, 2).expect("matches");
        assert_eq!(
            check_cell_hash(cell, sha256(b"forged"), 5, 2),
            Err(LedgerError::InvalidColumn { rn: 5, column: 2 })
        );
    }

    #[test]
    fn empty_rows_are_rejected() {
        assert!(matches!(
            SourceRow::new(5, Vec::new()),
            Err(LedgerError::InvalidFormat { .. })
        ));
        assert!(matches!(
            SourceRow::new(0, vec![SourceCell::Hashed(sha256(b"c"))]),
            Err(LedgerError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn double_equality_is_bitwise() {
        assert_eq!(ColumnValue::Double(f64::NAN), ColumnValue::Double(f64::NAN));
        assert_ne!(ColumnValue::Double(0.0), ColumnValue::Double(-0.0));
        assert_ne!(ColumnValue::Long(1), ColumnValue::Date(1));
    }
}
