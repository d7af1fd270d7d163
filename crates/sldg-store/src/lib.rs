//! Persistent skip-ledger stores.
//!
//! The [`backend::StorageBackend`] trait is the seam between the hash
//! algebra and durable storage: one `(input-hash, row-hash)` record per row
//! plus a witness index. [`file::FileBackend`] persists that contract as a
//! flat 64-byte-per-row table; [`backend::MemoryBackend`] is the volatile
//! reference implementation. [`ledger::Ledger`] layers the cached frontier,
//! row reassembly, path building, the integrity scan, and rollback on top.

/// The storage contract and the in-memory reference backend.
pub mod backend;
/// Store error taxonomy.
pub mod error;
/// The flat-file backend.
pub mod file;
/// The memo-ized ledger façade.
pub mod ledger;
/// The notary seam for witness records.
pub mod notary;
/// Pulling source ledgers into hash ledgers.
pub mod sync;
