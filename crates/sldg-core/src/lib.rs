//! Core hash algebra of the skip ledger.
//!
//! A skip ledger commits an append-only list: every row binds its own
//! input-hash to the hashes of earlier rows at power-of-two offsets, so a
//! single 32-byte commitment covers the whole history and compact paths of
//! rows prove membership and ancestry under it. This crate holds the pure
//! parts: hashing, row-number arithmetic, rows, frontiers, paths, the salted
//! source-row codec, and witness-record verification. Persistence lives in
//! `sldg-store`; packaging in `sldg-morsel`.

/// Witness records binding row-hashes to notarized roots.
pub mod crumtrail;
/// The error taxonomy the core surfaces.
pub mod error;
/// The incremental per-append hash state.
pub mod frontier;
/// Fixed-width hash primitives and Merkle roots.
pub mod hash;
/// Pure row-number arithmetic.
pub mod numbering;
/// Hash-linked row sequences and their verification.
pub mod path;
/// A row's hash cells and row-hash derivation.
pub mod row;
/// Salted source-row hashing and redaction.
pub mod source;
