//! The storage contract a ledger persists through.

use std::collections::BTreeMap;

use sldg_core::crumtrail::Crumtrail;
use sldg_core::hash::LedgerHash;

use crate::error::StoreError;

/// What a conforming backend persists for a ledger: one `(input-hash,
/// row-hash)` pair per row, plus a witness index keyed by row number.
///
/// `commit` is append-atomic: it either durably records row `size() + 1` or
/// leaves the store unchanged. Reads are safe under concurrent shared access
/// while no writer is active; Rust's borrow rules enforce the
/// shared-exclusive discipline, since every mutating operation takes
/// `&mut self`.
pub trait StorageBackend {
    /// Number of committed rows.
    ///
    /// # Errors
    /// [`StoreError::Io`] or [`StoreError::InvalidFormat`] if the backing
    /// state cannot be read.
    fn size(&self) -> Result<u64, StoreError>;

    /// Durably append row `rn`, which must be `size() + 1`.
    ///
    /// # Errors
    /// [`StoreError::OffsetConflict`] if `rn` is not the next row;
    /// [`StoreError::Io`] if the write cannot be made durable.
    fn commit(
        &mut self,
        rn: u64,
        input_hash: LedgerHash,
        row_hash: LedgerHash,
    ) -> Result<(), StoreError>;

    /// The input-hash of row `rn`, `1 <= rn <= size()`.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if `rn` is out of range.
    fn read_input_hash(&self, rn: u64) -> Result<LedgerHash, StoreError>;

    /// The row-hash of row `rn`, `0 <= rn <= size()`; the sentinel for
    /// `rn == 0`.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if `rn` is out of range.
    fn read_row_hash(&self, rn: u64) -> Result<LedgerHash, StoreError>;

    /// Destroy rows `new_size + 1 ..= size()` and every trail indexed past
    /// `new_size`. Visible atomically: readers never observe a partial cut.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the cut cannot be made durable.
    fn truncate_to(&mut self, new_size: u64) -> Result<(), StoreError>;

    /// Store a witness record for row `rn`, replacing any previous one.
    ///
    /// # Errors
    /// [`StoreError::Io`] on persistence failure.
    fn put_trail(&mut self, rn: u64, trail: &Crumtrail) -> Result<(), StoreError>;

    /// The witness record indexed at row `rn`, if any.
    ///
    /// # Errors
    /// [`StoreError::Io`] or [`StoreError::InvalidFormat`] if the stored
    /// record cannot be read back.
    fn get_trail(&self, rn: u64) -> Result<Option<Crumtrail>, StoreError>;

    /// Row numbers with a witness record, ascending.
    ///
    /// # Errors
    /// [`StoreError::Io`] if the index cannot be read.
    fn list_trail_rns(&self) -> Result<Vec<u64>, StoreError>;
}

/// A volatile backend; the reference implementation of the contract and the
/// workhorse of the test suites.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rows: Vec<(LedgerHash, LedgerHash)>,
    trails: BTreeMap<u64, Crumtrail>,
}

impl MemoryBackend {
    /// An empty in-memory store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: Vec::new(),
            trails: BTreeMap::new(),
        }
    }

    fn row(&self, rn: u64) -> Result<&(LedgerHash, LedgerHash), StoreError> {
        usize::try_from(rn)
            .ok()
            .and_then(|at| at.checked_sub(1))
            .and_then(|at| self.rows.get(at))
            .ok_or(StoreError::missing_row(rn))
    }
}

impl StorageBackend for MemoryBackend {
    fn size(&self) -> Result<u64, StoreError> {
        Ok(u64::try_from(self.rows.len()).unwrap_or(u64::MAX))
    }

    fn commit(
        &mut self,
        rn: u64,
        input_hash: LedgerHash,
        row_hash: LedgerHash,
    ) -> Result<(), StoreError> {
        let next = self.size()?.saturating_add(1);
        if rn != next {
            return Err(StoreError::OffsetConflict {
                rn,
                expected: next,
                actual: rn,
            });
        }
        self.rows.push((input_hash, row_hash));
        Ok(())
    }

    fn read_input_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        Ok(self.row(rn)?.0)
    }

    fn read_row_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        if rn == 0 {
            return Ok(LedgerHash::SENTINEL);
        }
        Ok(self.row(rn)?.1)
    }

    fn truncate_to(&mut self, new_size: u64) -> Result<(), StoreError> {
        let keep = usize::try_from(new_size).unwrap_or(usize::MAX);
        self.rows.truncate(keep);
        self.trails.retain(|&rn, _| rn <= new_size);
        Ok(())
    }

    fn put_trail(&mut self, rn: u64, trail: &Crumtrail) -> Result<(), StoreError> {
        self.trails.insert(rn, trail.clone());
        Ok(())
    }

    fn get_trail(&self, rn: u64) -> Result<Option<Crumtrail>, StoreError> {
        Ok(self.trails.get(&rn).cloned())
    }

    fn list_trail_rns(&self) -> Result<Vec<u64>, StoreError> {
        Ok(self.trails.keys().copied().collect())
    }
}
