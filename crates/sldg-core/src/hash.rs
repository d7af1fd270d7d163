//! Fixed-width hash primitives.
//!
//! Every committed quantity in the ledger is a 32-byte SHA-256 value. Merkle
//! roots are computed without the conventional `{0x00, 0x01}` leaf/node
//! domain-separation prefixes: leaf counts are always fixed by the enclosing
//! structure, and third-party verifiers must mirror the prefix-free rule to
//! arrive at the same bytes.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256};

/// Width in bytes of every hash in the ledger.
pub const HASH_WIDTH: usize = 32;

/// A 32-byte SHA-256 value: an input-hash, a row-hash, a salt, or a root.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LedgerHash([u8; HASH_WIDTH]);

impl LedgerHash {
    /// The sentinel zero hash, which is also the row-hash of the abstract
    /// row numbered `0`.
    pub const SENTINEL: Self = Self([0_u8; HASH_WIDTH]);

    /// Create a hash from its raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; HASH_WIDTH]) -> Self {
        Self(bytes)
    }

    /// The underlying bytes.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; HASH_WIDTH] {
        self.0
    }

    /// Whether this is the sentinel zero hash.
    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self == Self::SENTINEL
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for LedgerHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_WIDTH]> for LedgerHash {
    fn from(bytes: [u8; HASH_WIDTH]) -> Self {
        Self(bytes)
    }
}

impl From<LedgerHash> for [u8; HASH_WIDTH] {
    fn from(hash: LedgerHash) -> Self {
        hash.0
    }
}

impl fmt::Debug for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LedgerHash({})", self.to_hex())
    }
}

impl fmt::Display for LedgerHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Failure to parse a hash from hex text.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HashParseError {
    /// The text is not valid hex.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The decoded value is not 32 bytes wide.
    #[error("expected {HASH_WIDTH} bytes, got {0}")]
    Width(usize),
}

impl FromStr for LedgerHash {
    type Err = HashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; HASH_WIDTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| HashParseError::Width(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for LedgerHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> serde::Deserialize<'de> for LedgerHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of arbitrary bytes.
#[must_use]
pub fn sha256(data: &[u8]) -> LedgerHash {
    LedgerHash(Sha256::digest(data).into())
}

/// SHA-256 of the concatenation `left || right`.
#[must_use]
pub fn sha256_pair(left: LedgerHash, right: LedgerHash) -> LedgerHash {
    let mut hasher = Sha256::new();
    hasher.update(left.0);
    hasher.update(right.0);
    LedgerHash(hasher.finalize().into())
}

/// SHA-256 of the concatenation of a sequence of hashes.
#[must_use]
pub fn sha256_cells<'a, I>(cells: I) -> LedgerHash
where
    I: IntoIterator<Item = &'a LedgerHash>,
{
    let mut hasher = Sha256::new();
    for cell in cells {
        hasher.update(cell.0);
    }
    LedgerHash(hasher.finalize().into())
}

/// Merkle root over an ordered, non-empty hash list.
///
/// Pairs are combined as `SHA256(left || right)`; an odd trailing element is
/// carried up as `SHA256(element)`. The root over a single hash is that hash
/// itself. No domain-separation bytes are prepended.
///
/// Returns `None` for an empty list.
#[must_use]
pub fn merkle_root(leaves: &[LedgerHash]) -> Option<LedgerHash> {
    if leaves.is_empty() {
        return None;
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut pairs = level.chunks_exact(2);
        for pair in pairs.by_ref() {
            if let [left, right] = pair {
                next.push(sha256_pair(*left, *right));
            }
        }
        if let [odd] = pairs.remainder() {
            next.push(sha256(odd.as_ref()));
        }
        level = next;
    }
    level.first().copied()
}
