//! The hash frontier: minimal per-append state.
//!
//! A ledger of size `rn` is summarized by `bit_length(rn)` level hashes,
//! `levels[i] = H(level_rn(rn, i))`. Advancing by one input-hash needs no
//! other state: the pointer cells of row `rn + 1` are exactly the lowest
//! `skip_count(rn + 1)` level hashes (with the sentinel standing in when the
//! new row points at row zero), and the roll-up replaces the lowest
//! `trailing_zeros(rn + 1) + 1` levels with the new row-hash.

use crate::error::LedgerError;
use crate::hash::{HASH_WIDTH, LedgerHash, sha256_cells};
use crate::numbering::{bit_length, skip_count};
use crate::row::Row;

/// Per-level hash summary of a ledger; advances one row per input-hash in
/// `O(log n)` worst-case, `O(1)` amortized work.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HashFrontier {
    rn: u64,
    levels: Vec<LedgerHash>,
}

impl HashFrontier {
    /// The frontier of an empty ledger.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rn: 0,
            levels: Vec::new(),
        }
    }

    /// Reconstruct a frontier from its level hashes.
    ///
    /// # Errors
    /// [`LedgerError::InvalidFormat`] if the level count is not
    /// `bit_length(rn)`.
    pub fn from_levels(rn: u64, levels: Vec<LedgerHash>) -> Result<Self, LedgerError> {
        let expected = usize::try_from(bit_length(rn)).unwrap_or(usize::MAX);
        if levels.len() != expected {
            return Err(LedgerError::InvalidFormat {
                section: "frontier",
                detail: format!(
                    "ledger of size {rn} has {expected} levels, got {}",
                    levels.len()
                ),
            });
        }
        Ok(Self { rn, levels })
    }

    /// The ledger size this frontier summarizes.
    #[must_use]
    pub const fn rn(&self) -> u64 {
        self.rn
    }

    /// The commitment hash `H(rn)`; the sentinel for an empty ledger.
    #[must_use]
    pub fn frontier_hash(&self) -> LedgerHash {
        self.levels.first().copied().unwrap_or(LedgerHash::SENTINEL)
    }

    /// The level hashes, lowest level first: `levels[i] = H(level_rn(rn, i))`.
    #[must_use]
    pub fn levels(&self) -> &[LedgerHash] {
        &self.levels
    }

    /// The row the next append will create, given its input-hash.
    ///
    /// Does not advance the frontier; [`Self::advance`] both derives the row
    /// and rolls the levels forward.
    #[must_use]
    pub fn next_row(&self, input_hash: LedgerHash) -> Row {
        let next = self.rn.saturating_add(1);
        let ptr_count = usize::try_from(skip_count(next)).unwrap_or(usize::MAX);
        let mut ptrs: Vec<LedgerHash> = self.levels.iter().copied().take(ptr_count).collect();
        if ptrs.len() < ptr_count {
            // The new row is a power of two and its deepest pointer targets
            // the sentinel row.
            ptrs.push(LedgerHash::SENTINEL);
        }
        Row::new(next, input_hash, ptrs)
            .unwrap_or_else(|_| unreachable!("frontier levels always satisfy the pointer count"))
    }

    /// Append one row: derive `H(rn + 1)` from `input_hash` and the level
    /// hashes, roll the levels, and return the new row-hash.
    pub fn advance(&mut self, input_hash: LedgerHash) -> LedgerHash {
        let row = self.next_row(input_hash);
        let row_hash = sha256_cells(row.cells());
        let next = row.rn();
        let new_len = usize::try_from(bit_length(next)).unwrap_or(usize::MAX);
        let refreshed = usize::try_from(next.trailing_zeros().saturating_add(1))
            .unwrap_or(usize::MAX)
            .min(new_len);
        let mut levels = Vec::with_capacity(new_len);
        levels.resize(refreshed, row_hash);
        levels.extend(self.levels.iter().copied().skip(refreshed).take(
            new_len.saturating_sub(refreshed),
        ));
        debug_assert_eq!(levels.len(), new_len);
        self.rn = next;
        self.levels = levels;
        row_hash
    }

    /// Serialize as `rn (8B BE) || levels (bit_length(rn) × 32B)`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8_usize.saturating_add(
            self.levels.len().saturating_mul(HASH_WIDTH),
        ));
        out.extend_from_slice(&self.rn.to_be_bytes());
        for level in &self.levels {
            out.extend_from_slice(level.as_ref());
        }
        out
    }

    /// Parse the [`Self::to_bytes`] layout.
    ///
    /// # Errors
    /// [`LedgerError::InvalidFormat`] on truncation or trailing bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LedgerError> {
        let bad = |detail: String| LedgerError::InvalidFormat {
            section: "frontier",
            detail,
        };
        let (rn_bytes, rest) = data
            .split_first_chunk::<8>()
            .ok_or_else(|| bad("truncated size field".into()))?;
        let rn = u64::from_be_bytes(*rn_bytes);
        let level_count = usize::try_from(bit_length(rn)).unwrap_or(usize::MAX);
        if rest.len() != level_count.saturating_mul(HASH_WIDTH) {
            return Err(bad(format!(
                "ledger of size {rn} needs {level_count} level hashes, got {} bytes",
                rest.len()
            )));
        }
        let levels = rest
            .chunks_exact(HASH_WIDTH)
            .map(|chunk| {
                let arr: [u8; HASH_WIDTH] = chunk
                    .try_into()
                    .unwrap_or_else(|_| unreachable!("chunks_exact yields exact widths"));
                LedgerHash::new(arr)
            })
            .collect();
        Self::from_levels(rn, levels)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        clippy::arithmetic_side_effects,
        reason = "test fixtures are small and in bounds"
    )]

    use test_utils::seq_input_hashes;

    use super::*;
    use crate::hash::{sha256, sha256_pair};
    use crate::numbering::{level_rn, pointer_rns};

    /// Reference row hashes computed directly from the recurrence, with no
    /// frontier shortcuts: `hashes[n]` is `H(n)`.
    fn reference_hashes(inputs: &[[u8; 32]]) -> Vec<LedgerHash> {
        let mut hashes = vec![LedgerHash::SENTINEL];
        for (at, input) in inputs.iter().enumerate() {
            let rn = u64::try_from(at).expect("fits") + 1;
            let mut cells = vec![LedgerHash::new(*input)];
            for ptr in pointer_rns(rn) {
                cells.push(hashes[usize::try_from(ptr).expect("fits")]);
            }
            hashes.push(sha256_cells(&cells));
        }
        hashes
    }

    #[test]
    fn empty_frontier_is_sentinel() {
        let frontier = HashFrontier::new();
        assert_eq!(frontier.rn(), 0);
        assert_eq!(frontier.frontier_hash(), LedgerHash::SENTINEL);
        assert!(frontier.levels().is_empty());
    }

    #[test]
    fn single_append_matches_the_recurrence() {
        let h_in = sha256(b"a");
        let mut frontier = HashFrontier::new();
        let h1 = frontier.advance(h_in);
        assert_eq!(h1, sha256_pair(h_in, LedgerHash::SENTINEL));
        assert_eq!(frontier.rn(), 1);
        assert_eq!(frontier.frontier_hash(), h1);
        assert_eq!(frontier.levels(), &[h1]);
    }

    #[test]
    fn advance_agrees_with_reference_recurrence() {
        let inputs = seq_input_hashes(200);
        let reference = reference_hashes(&inputs);
        let mut frontier = HashFrontier::new();
        for (at, input) in inputs.iter().enumerate() {
            let row_hash = frontier.advance(LedgerHash::new(*input));
            assert_eq!(row_hash, reference[at + 1], "row {}", at + 1);
            assert_eq!(frontier.frontier_hash(), row_hash);
        }
        assert_eq!(frontier.rn(), 200);
        // Spot-check the level invariant at the final size.
        for (level, hash) in frontier.levels().iter().enumerate() {
            let at = level_rn(200, u32::try_from(level).expect("fits"));
            assert_eq!(*hash, reference[usize::try_from(at).expect("fits")]);
        }
    }

    #[test]
    fn level_count_tracks_bit_length() {
        let mut frontier = HashFrontier::new();
        for (at, input) in seq_input_hashes(40).iter().enumerate() {
            frontier.advance(LedgerHash::new(*input));
            let rn = u64::try_from(at).expect("fits") + 1;
            assert_eq!(
                frontier.levels().len(),
                usize::try_from(bit_length(rn)).expect("fits")
            );
        }
    }

    #[test]
    fn next_row_previews_without_advancing() {
        let mut frontier = HashFrontier::new();
        for input in seq_input_hashes(7) {
            frontier.advance(LedgerHash::new(input));
        }
        let h_in = sha256(b"preview");
        let preview = frontier.next_row(h_in);
        assert_eq!(frontier.rn(), 7);
        let mut advanced = frontier.clone();
        let row_hash = advanced.advance(h_in);
        assert_eq!(preview.rn(), 8);
        assert_eq!(preview.hash(), row_hash);
    }

    #[test]
    fn bytes_round_trip() {
        let mut frontier = HashFrontier::new();
        for input in seq_input_hashes(13) {
            frontier.advance(LedgerHash::new(input));
        }
        let bytes = frontier.to_bytes();
        assert_eq!(bytes.len(), 8 + 4 * 32);
        let back = HashFrontier::from_bytes(&bytes).expect("round trip");
        assert_eq!(back, frontier);

        assert!(matches!(
            HashFrontier::from_bytes(&bytes[..bytes.len() - 1]),
            Err(LedgerError::InvalidFormat { section: "frontier", .. })
        ));
        assert!(matches!(
            HashFrontier::from_bytes(&[0_u8; 4]),
            Err(LedgerError::InvalidFormat { section: "frontier", .. })
        ));
    }
}
