//! Errors surfaced by log ingestion.

use sldg_core::error::LedgerError;
use sldg_store::error::StoreError;

/// Errors that can occur parsing, hashing, or tracking a text log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Underlying I/O failure.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// A recorded end-of-row offset disagrees with the log being replayed.
    ///
    /// Surfaced unless the caller explicitly opted into repair, in which
    /// case the tracking tables are rewritten from the rescan.
    #[error("row [{rn}] ends at offset {actual}, tracking recorded {expected}")]
    OffsetConflict {
        /// The checkpointed row number.
        rn: u64,
        /// The end offset the tracking files recorded.
        expected: u64,
        /// The end offset observed in the log.
        actual: u64,
    },

    /// Malformed tracking file.
    #[error("invalid {section}: {detail}")]
    InvalidFormat {
        /// Name of the file or header that failed to parse.
        section: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// A failure from the backing ledger store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A core verification failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
