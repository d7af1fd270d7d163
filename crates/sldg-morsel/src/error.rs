//! Errors surfaced by morsel packing and operations.

use sldg_core::error::LedgerError;

/// Errors that can occur building, parsing, verifying, or combining
/// morsels.
#[derive(Debug, thiserror::Error)]
pub enum MorselError {
    /// Underlying I/O failure.
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Bad magic, truncated section, unknown version, or a non-canonical
    /// encoding.
    #[error("invalid {section} section: {detail}")]
    Format {
        /// The section (or header) that failed to parse.
        section: &'static str,
        /// Human-readable detail.
        detail: String,
    },

    /// The inputs to a merge do not share a verifiable lineage.
    #[error("not mergeable: {0}")]
    NotMergeable(String),

    /// A core verification failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
