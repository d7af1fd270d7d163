//! Errors surfaced by persistent ledger stores.

use sldg_core::error::LedgerError;

/// Errors that can occur reading or writing a persistent ledger.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Backend indexing disagrees with the expected append position.
    #[error("row [{rn}] expected at offset {expected}, found {actual}")]
    OffsetConflict {
        /// The row number being written or located.
        rn: u64,
        /// The byte offset the row numbering implies.
        expected: u64,
        /// The byte offset actually observed.
        actual: u64,
    },

    /// Malformed persisted structure.
    #[error("invalid {section}: {detail}")]
    InvalidFormat {
        /// Name of the file or section that failed to parse.
        section: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// A core verification failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StoreError {
    /// The missing-row error for `rn`, routed through the core taxonomy.
    #[must_use]
    pub const fn missing_row(rn: u64) -> Self {
        Self::Ledger(LedgerError::MissingRow(rn))
    }
}
