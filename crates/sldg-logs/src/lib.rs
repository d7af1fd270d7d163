//! Text-log ingestion for skip ledgers.
//!
//! A text log becomes a ledger one line at a time: each ledgerable line
//! tokenizes into string columns, hashes under per-cell salts, and appends
//! its input-hash. The [`replay::Replay`] driver audits what the ledger
//! already holds, appends what it does not, and keeps the private tracking
//! files ([`track::TrackDir`]) current so later replays can resume from a
//! checkpoint. Interested parties watch through [`observer::LogObserver`]
//! hooks invoked in a fixed, documented order.

/// Errors surfaced by log ingestion.
pub mod error;
/// The line grammar.
pub mod grammar;
/// Replay observers and their composition.
pub mod observer;
/// The replay driver.
pub mod replay;
/// The persisted tracking files.
pub mod track;
