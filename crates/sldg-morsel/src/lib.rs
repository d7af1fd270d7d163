//! Morsels: self-contained, tamper-evident bundles of ledger evidence.
//!
//! A morsel packages a declared ledger commitment together with the rows,
//! source content, and witness records that prove themselves under it, in a
//! canonical binary layout (`.mrsl`) that any conforming writer reproduces
//! byte for byte. [`pack::Morsel`] values verify at construction and at
//! parse; [`build::MorselBuilder`] assembles them from verified paths;
//! [`ops::merge`] and [`ops::submerge`] combine and redact them without
//! weakening what they prove.

/// Assembling morsels from verified paths.
pub mod build;
/// Byte plumbing for the canonical encoding.
pub mod codec;
/// Morsel error taxonomy.
pub mod error;
/// Merge and sub-morsel extraction.
pub mod ops;
/// The morsel itself: data model, verification, codec.
pub mod pack;
