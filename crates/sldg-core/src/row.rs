//! A skip-ledger row and its hash cells.

use crate::error::LedgerError;
use crate::hash::{LedgerHash, sha256_cells};
use crate::numbering::{pointer_rns, skip_count};

/// A row of the skip ledger: an input-hash followed by one hash pointer per
/// level, `1 + skip_count(rn)` cells in all.
///
/// `cells[0]` is the input-hash; `cells[1 + i]` is the row-hash of
/// `pointer_rns(rn)[i]`. The row-hash is the SHA-256 of the concatenation of
/// all cells, so two rows are interchangeable exactly when their cells agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    rn: u64,
    cells: Vec<LedgerHash>,
}

impl Row {
    /// Assemble a row from its input-hash and pointer cells.
    ///
    /// `ptr_hashes` must hold the row-hashes of `pointer_rns(rn)` in order.
    ///
    /// # Errors
    /// [`LedgerError::InvalidFormat`] if the pointer count differs from
    /// `skip_count(rn)` or `rn` is zero.
    pub fn new(
        rn: u64,
        input_hash: LedgerHash,
        ptr_hashes: Vec<LedgerHash>,
    ) -> Result<Self, LedgerError> {
        if rn == 0 {
            return Err(LedgerError::InvalidFormat {
                section: "row",
                detail: "the sentinel row cannot be materialized".into(),
            });
        }
        let expected = usize::try_from(skip_count(rn)).map_err(|_| LedgerError::InvalidFormat {
            section: "row",
            detail: format!("skip count of row {rn} does not fit in memory"),
        })?;
        if ptr_hashes.len() != expected {
            return Err(LedgerError::InvalidFormat {
                section: "row",
                detail: format!(
                    "row {rn} needs {expected} pointer cells, got {}",
                    ptr_hashes.len()
                ),
            });
        }
        let mut cells = Vec::with_capacity(expected.saturating_add(1));
        cells.push(input_hash);
        cells.extend(ptr_hashes);
        Ok(Self { rn, cells })
    }

    /// The row number.
    #[must_use]
    pub const fn rn(&self) -> u64 {
        self.rn
    }

    /// The input-hash, `cells[0]`.
    #[must_use]
    pub fn input_hash(&self) -> LedgerHash {
        self.cells.first().copied().unwrap_or(LedgerHash::SENTINEL)
    }

    /// All cells: the input-hash followed by the pointer cells.
    #[must_use]
    pub fn cells(&self) -> &[LedgerHash] {
        &self.cells
    }

    /// The pointer cells, aligned with [`pointer_rns`]`(self.rn())`.
    #[must_use]
    pub fn ptr_cells(&self) -> &[LedgerHash] {
        self.cells.get(1..).unwrap_or_default()
    }

    /// The pointer cell referencing row `ptr_rn`, if this row has one.
    #[must_use]
    pub fn ptr_cell_for(&self, ptr_rn: u64) -> Option<LedgerHash> {
        let at = pointer_rns(self.rn).iter().position(|&p| p == ptr_rn)?;
        self.ptr_cells().get(at).copied()
    }

    /// The row-hash: SHA-256 over the concatenation of all cells.
    #[must_use]
    pub fn hash(&self) -> LedgerHash {
        sha256_cells(&self.cells)
    }
}
