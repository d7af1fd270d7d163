//! Hash-linked row sequences.
//!
//! A [`Path`] is a non-empty, strictly ascending run of rows in which each
//! row is a pointer target of its successor. A verified path pins every row's
//! hash to the hash of its last row, so the tail is the only value a relying
//! party needs to trust.

use crate::error::LedgerError;
use crate::hash::LedgerHash;
use crate::numbering::{pointer_rns, skip_path_rns, stitch};
use crate::row::Row;

/// An ordered sequence of rows with contiguous hash linkage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    rows: Vec<Row>,
}

impl Path {
    /// Build and verify a path.
    ///
    /// # Errors
    /// - [`LedgerError::MissingRow`] if `rows` is empty;
    /// - [`LedgerError::OutOfOrder`] if row numbers are not strictly
    ///   increasing;
    /// - [`LedgerError::LinkBroken`] if an adjacent pair is not joined by a
    ///   pointer cell carrying the predecessor's row-hash.
    pub fn new(rows: Vec<Row>) -> Result<Self, LedgerError> {
        let path = Self { rows };
        path.verify()?;
        Ok(path)
    }

    /// Re-run the structural checks performed at construction.
    ///
    /// # Errors
    /// As for [`Self::new`].
    pub fn verify(&self) -> Result<(), LedgerError> {
        let first = self.rows.first().ok_or(LedgerError::MissingRow(1))?;
        let mut prev = first;
        for row in self.rows.iter().skip(1) {
            if row.rn() <= prev.rn() {
                return Err(LedgerError::OutOfOrder {
                    rn: row.rn(),
                    prev: prev.rn(),
                });
            }
            let cell = row
                .ptr_cell_for(prev.rn())
                .ok_or(LedgerError::LinkBroken {
                    from: prev.rn(),
                    to: row.rn(),
                })?;
            if cell != prev.hash() {
                return Err(LedgerError::LinkBroken {
                    from: prev.rn(),
                    to: row.rn(),
                });
            }
            prev = row;
        }
        Ok(())
    }

    /// The rows, ascending.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The first row.
    ///
    /// # Panics
    /// Never: paths are non-empty by construction.
    #[must_use]
    pub fn head(&self) -> &Row {
        self.rows
            .first()
            .unwrap_or_else(|| unreachable!("paths are non-empty"))
    }

    /// The last row.
    ///
    /// # Panics
    /// Never: paths are non-empty by construction.
    #[must_use]
    pub fn tail(&self) -> &Row {
        self.rows
            .last()
            .unwrap_or_else(|| unreachable!("paths are non-empty"))
    }

    /// Row-hash of the first row: one endpoint of the proof.
    #[must_use]
    pub fn head_hash(&self) -> LedgerHash {
        self.head().hash()
    }

    /// Row-hash of the last row: the commitment this path proves under.
    #[must_use]
    pub fn tail_hash(&self) -> LedgerHash {
        self.tail().hash()
    }

    /// The row numbers on this path, ascending.
    pub fn rns(&self) -> impl Iterator<Item = u64> {
        self.rows.iter().map(Row::rn)
    }

    /// The row numbered `rn`, if on this path.
    #[must_use]
    pub fn row(&self, rn: u64) -> Option<&Row> {
        let at = self.rows.binary_search_by_key(&rn, Row::rn).ok()?;
        self.rows.get(at)
    }

    /// Concatenate two paths meeting at a shared row.
    ///
    /// # Errors
    /// - [`LedgerError::OutOfOrder`] if `self`'s tail row number differs from
    ///   `other`'s head row number;
    /// - [`LedgerError::HashConflict`] if the shared row's hashes disagree.
    pub fn compose(self, other: Self) -> Result<Self, LedgerError> {
        let joint = self.tail().rn();
        if other.head().rn() != joint {
            return Err(LedgerError::OutOfOrder {
                rn: other.head().rn(),
                prev: joint,
            });
        }
        if self.tail_hash() != other.head_hash() {
            return Err(LedgerError::HashConflict(joint));
        }
        let mut rows = self.rows;
        rows.extend(other.rows.into_iter().skip(1));
        // The joint was verified above; the rest was verified per input.
        Ok(Self { rows })
    }

    /// The smallest row number present on both paths, if any.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<u64> {
        self.rns().find(|&rn| other.row(rn).is_some())
    }

    /// The contiguous sub-path running from `from_rn` to `to_rn` inclusive.
    ///
    /// # Errors
    /// - [`LedgerError::MissingRow`] if either endpoint is not on this path;
    /// - [`LedgerError::OutOfOrder`] if `from_rn > to_rn`.
    pub fn subpath(&self, from_rn: u64, to_rn: u64) -> Result<Self, LedgerError> {
        if from_rn > to_rn {
            return Err(LedgerError::OutOfOrder {
                rn: to_rn,
                prev: from_rn,
            });
        }
        let lo = self
            .rows
            .binary_search_by_key(&from_rn, Row::rn)
            .map_err(|_| LedgerError::MissingRow(from_rn))?;
        let hi = self
            .rows
            .binary_search_by_key(&to_rn, Row::rn)
            .map_err(|_| LedgerError::MissingRow(to_rn))?;
        let rows = self
            .rows
            .get(lo..=hi)
            .ok_or(LedgerError::MissingRow(to_rn))?
            .to_vec();
        // A contiguous slice of a verified path is itself verified.
        Ok(Self { rows })
    }
}

/// The row numbers whose presence proves a ledger of size `hi_rn` from its
/// commitment hash: the skip path from row 1 to `hi_rn`.
///
/// # Panics
/// Panics if `hi_rn` is zero.
#[must_use]
pub fn state_path_rns(hi_rn: u64) -> Vec<u64> {
    skip_path_rns(1, hi_rn)
}

/// The row numbers needed to prove each target row under the commitment at
/// `hi_rn`: the stitch of the targets together with rows 1 and `hi_rn`.
///
/// # Panics
/// Panics if any target is zero.
#[must_use]
pub fn target_path_rns(targets: &[u64], hi_rn: u64) -> Vec<u64> {
    let mut all = Vec::with_capacity(targets.len().saturating_add(2));
    all.extend_from_slice(targets);
    all.push(1);
    all.push(hi_rn);
    stitch(&all)
}

/// Whether `prev_rn` is a pointer target of `next_rn`.
#[must_use]
pub fn linked(prev_rn: u64, next_rn: u64) -> bool {
    next_rn >= 1 && pointer_rns(next_rn).contains(&prev_rn)
}
