//! The memo-ized ledger: a backend plus its cached frontier.
//!
//! The writer owns the frontier; every mutating operation takes `&mut self`,
//! so the shared-exclusive regime of the contract is enforced by the borrow
//! checker. Readers only touch the backend.

use sldg_core::crumtrail::Crumtrail;
use sldg_core::error::LedgerError;
use sldg_core::frontier::HashFrontier;
use sldg_core::hash::{LedgerHash, sha256_cells};
use sldg_core::numbering::{bit_length, level_rn, pointer_rns};
use sldg_core::path::{Path, state_path_rns, target_path_rns};
use sldg_core::row::Row;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StoreError;

/// A skip ledger over a persistent backend.
#[derive(Debug)]
pub struct Ledger<B> {
    backend: B,
    frontier: HashFrontier,
}

impl<B: StorageBackend> Ledger<B> {
    /// Open a ledger, rebuilding the frontier from the stored row-hashes.
    ///
    /// # Errors
    /// Backend read failures.
    pub fn open(backend: B) -> Result<Self, StoreError> {
        let size = backend.size()?;
        let mut levels = Vec::with_capacity(usize::try_from(bit_length(size)).unwrap_or(0));
        for level in 0..bit_length(size) {
            levels.push(backend.read_row_hash(level_rn(size, level))?);
        }
        let frontier = HashFrontier::from_levels(size, levels)?;
        Ok(Self { backend, frontier })
    }

    /// Number of rows.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.frontier.rn()
    }

    /// The ledger commitment `H(size())`; the sentinel when empty.
    #[must_use]
    pub fn ledger_hash(&self) -> LedgerHash {
        self.frontier.frontier_hash()
    }

    /// The cached frontier.
    #[must_use]
    pub const fn frontier(&self) -> &HashFrontier {
        &self.frontier
    }

    /// The backend, read-only.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Append one row; returns the new size once the row is durable.
    ///
    /// # Errors
    /// Backend write failures; the frontier is not advanced on failure.
    pub fn append(&mut self, input_hash: LedgerHash) -> Result<u64, StoreError> {
        let row = self.frontier.next_row(input_hash);
        self.backend.commit(row.rn(), input_hash, row.hash())?;
        let advanced = self.frontier.advance(input_hash);
        debug_assert_eq!(advanced, row.hash());
        debug!(rn = row.rn(), "appended row");
        Ok(row.rn())
    }

    /// The row-hash of row `rn`, `0 <= rn <= size()`.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if `rn` is out of range.
    pub fn row_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        self.backend.read_row_hash(rn)
    }

    /// The input-hash of row `rn`, `1 <= rn <= size()`.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if `rn` is out of range.
    pub fn input_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        self.backend.read_input_hash(rn)
    }

    /// Reconstruct the full row `rn`, fetching its pointer hashes.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if `rn` is out of range.
    pub fn row(&self, rn: u64) -> Result<Row, StoreError> {
        let input_hash = self.backend.read_input_hash(rn)?;
        let mut ptrs = Vec::new();
        for ptr_rn in pointer_rns(rn) {
            ptrs.push(self.backend.read_row_hash(ptr_rn)?);
        }
        Ok(Row::new(rn, input_hash, ptrs)?)
    }

    /// Truncate to `new_size` rows, destroying later rows and any trails
    /// indexed past the cut. Requires an explicit caller decision; see
    /// [`Self::check_integrity`] for locating the first bad row.
    ///
    /// # Errors
    /// Backend failures; the frontier is rebuilt from the surviving rows.
    pub fn truncate(&mut self, new_size: u64) -> Result<(), StoreError> {
        self.backend.truncate_to(new_size)?;
        let size = self.backend.size()?;
        let mut levels = Vec::with_capacity(usize::try_from(bit_length(size)).unwrap_or(0));
        for level in 0..bit_length(size) {
            levels.push(self.backend.read_row_hash(level_rn(size, level))?);
        }
        self.frontier = HashFrontier::from_levels(size, levels)?;
        debug!(new_size = size, "rolled back ledger");
        Ok(())
    }

    /// Validate and store a witness record for row `rn`.
    ///
    /// # Errors
    /// - the trail's own verification errors;
    /// - [`LedgerError::HashConflict`] if its hashed value is not `H(rn)`;
    /// - backend failures.
    pub fn put_crumtrail(&mut self, rn: u64, trail: &Crumtrail) -> Result<(), StoreError> {
        trail.verify()?;
        let row_hash = self.backend.read_row_hash(rn)?;
        if trail.hashed_value() != row_hash {
            return Err(LedgerError::HashConflict(rn).into());
        }
        self.backend.put_trail(rn, trail)
    }

    /// The witness record indexed at row `rn`, if any.
    ///
    /// # Errors
    /// Backend read failures.
    pub fn crumtrail(&self, rn: u64) -> Result<Option<Crumtrail>, StoreError> {
        self.backend.get_trail(rn)
    }

    /// Row numbers carrying a witness record, ascending.
    ///
    /// # Errors
    /// Backend read failures.
    pub fn trailed_rns(&self) -> Result<Vec<u64>, StoreError> {
        self.backend.list_trail_rns()
    }

    /// Re-derive the row-hashes of rows `from_rn ..= to_rn` from the stored
    /// input-hashes and pointer hashes, reporting the first conflict. The
    /// cancellation signal is polled at every row boundary.
    ///
    /// # Errors
    /// - [`LedgerError::HashConflict`] naming the first conflicting row;
    /// - [`LedgerError::Cancelled`] if the signal fires;
    /// - backend read failures.
    pub fn check_integrity(
        &self,
        from_rn: u64,
        to_rn: u64,
        cancelled: impl Fn() -> bool,
    ) -> Result<(), StoreError> {
        let to_rn = to_rn.min(self.size());
        for rn in from_rn.max(1)..=to_rn {
            if cancelled() {
                return Err(LedgerError::Cancelled.into());
            }
            let mut cells = vec![self.backend.read_input_hash(rn)?];
            for ptr_rn in pointer_rns(rn) {
                cells.push(self.backend.read_row_hash(ptr_rn)?);
            }
            if sha256_cells(&cells) != self.backend.read_row_hash(rn)? {
                return Err(LedgerError::HashConflict(rn).into());
            }
        }
        Ok(())
    }

    /// The path proving the current size from the commitment: the rows on
    /// the skip path from row 1 to `size()`.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] on an empty ledger; backend failures.
    pub fn state_path(&self) -> Result<Path, StoreError> {
        if self.size() == 0 {
            return Err(StoreError::missing_row(1));
        }
        self.assemble(&state_path_rns(self.size()))
    }

    /// The path covering each target row under the current commitment.
    ///
    /// # Errors
    /// [`StoreError::missing_row`] if a target exceeds the size or the
    /// ledger is empty; backend failures.
    pub fn path_to(&self, targets: &[u64]) -> Result<Path, StoreError> {
        if self.size() == 0 {
            return Err(StoreError::missing_row(1));
        }
        if let Some(&beyond) = targets.iter().find(|&&rn| rn > self.size() || rn == 0) {
            return Err(StoreError::missing_row(beyond));
        }
        self.assemble(&target_path_rns(targets, self.size()))
    }

    fn assemble(&self, rns: &[u64]) -> Result<Path, StoreError> {
        let mut rows = Vec::with_capacity(rns.len());
        for &rn in rns {
            rows.push(self.row(rn)?);
        }
        Ok(Path::new(rows)?)
    }
}
