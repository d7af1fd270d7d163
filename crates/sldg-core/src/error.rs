//! Error taxonomy surfaced by the core hash algebra.

/// Errors that can occur while building or verifying ledger structures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Recomputed row-hash differs from the stored or expected value.
    #[error("row [{0}] hash conflicts with its recomputation")]
    HashConflict(u64),

    /// A pointer cell does not match the referenced row-hash.
    #[error("hash pointer from row [{from}] to row [{to}] is broken")]
    LinkBroken {
        /// Row number of the referencing row.
        from: u64,
        /// Row number the broken pointer targets.
        to: u64,
    },

    /// Row numbers are not strictly increasing.
    #[error("row [{rn}] out of order after row [{prev}]")]
    OutOfOrder {
        /// The offending row number.
        rn: u64,
        /// The row number it was expected to follow.
        prev: u64,
    },

    /// A needed row is not present.
    #[error("row [{0}] is missing")]
    MissingRow(u64),

    /// A source row's recomputed input-hash disagrees with the ledgered one.
    #[error("source row [{rn}] does not hash to the ledgered input-hash")]
    SourceMismatch {
        /// Row number of the mismatched source row.
        rn: u64,
    },

    /// A column's declared cell-hash disagrees with its recomputation.
    #[error("row [{rn}] column {column} does not hash to its declared value")]
    InvalidColumn {
        /// Row number of the offending source row.
        rn: u64,
        /// 1-based column index.
        column: u32,
    },

    /// A cell carries both a substituted hash and revealed material.
    #[error("row [{rn}] column {column} mixes a redacted hash with revealed data")]
    MixedRedaction {
        /// Row number of the offending source row.
        rn: u64,
        /// 1-based column index.
        column: u32,
    },

    /// Malformed serialized structure.
    #[error("invalid {section}: {detail}")]
    InvalidFormat {
        /// Name of the structure or section that failed to parse.
        section: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// Generic hash-verification failure not covered by a narrower kind.
    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    /// The caller requested an abort via its cancellation signal.
    #[error("operation cancelled")]
    Cancelled,
}
