//! Witness records: time-anchored Merkle proofs over a row-hash.
//!
//! A crumtrail binds a row-hash to a root published by an external notary at
//! a UTC instant. The proof folds with plain `SHA256(left || right)` steps,
//! prefix-free like every other Merkle computation in the ledger. A trail
//! whose hashed value is `H(rn)` witnesses every row `<= rn` at its
//! timestamp, since those rows are bound into `H(rn)`.

use crate::error::LedgerError;
use crate::hash::{HASH_WIDTH, LedgerHash, sha256_pair};

/// Which side of the running hash a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofSide {
    /// The sibling is the left operand.
    Left,
    /// The sibling is the right operand.
    Right,
}

impl ProofSide {
    /// Wire byte: `0x00` left, `0x01` right.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Left => 0x00,
            Self::Right => 0x01,
        }
    }

    /// Parse the wire byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Left),
            0x01 => Some(Self::Right),
            _ => None,
        }
    }
}

/// One step of a crumtrail's Merkle proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProofNode {
    /// The side the sibling hash occupies.
    pub side: ProofSide,
    /// The sibling hash.
    pub sibling: LedgerHash,
}

/// A Merkle proof binding a row-hash to a notarized root at a UTC instant.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Crumtrail {
    hashed_value: LedgerHash,
    proof: Vec<ProofNode>,
    root: LedgerHash,
    utc_ms: i64,
    ref_url: String,
}

impl Crumtrail {
    /// Assemble and verify a crumtrail.
    ///
    /// # Errors
    /// - [`LedgerError::InvalidFormat`] if `utc_ms` is negative;
    /// - [`LedgerError::IntegrityFailure`] if the proof does not fold from
    ///   `hashed_value` to `root`.
    pub fn new(
        hashed_value: LedgerHash,
        proof: Vec<ProofNode>,
        root: LedgerHash,
        utc_ms: i64,
        ref_url: String,
    ) -> Result<Self, LedgerError> {
        let trail = Self {
            hashed_value,
            proof,
            root,
            utc_ms,
            ref_url,
        };
        trail.verify()?;
        Ok(trail)
    }

    /// Re-run the fold and timestamp checks performed at construction.
    ///
    /// # Errors
    /// As for [`Self::new`].
    pub fn verify(&self) -> Result<(), LedgerError> {
        if self.utc_ms < 0 {
            return Err(LedgerError::InvalidFormat {
                section: "crumtrail",
                detail: format!("negative witness time {}", self.utc_ms),
            });
        }
        if self.ref_url.len() > usize::from(u16::MAX) {
            return Err(LedgerError::InvalidFormat {
                section: "crumtrail",
                detail: format!("reference URL of {} bytes overflows the envelope", self.ref_url.len()),
            });
        }
        let mut cur = self.hashed_value;
        for node in &self.proof {
            cur = match node.side {
                ProofSide::Left => sha256_pair(node.sibling, cur),
                ProofSide::Right => sha256_pair(cur, node.sibling),
            };
        }
        if cur == self.root {
            Ok(())
        } else {
            Err(LedgerError::IntegrityFailure(
                "crumtrail proof does not fold to its root".into(),
            ))
        }
    }

    /// The row-hash this trail witnesses.
    #[must_use]
    pub const fn hashed_value(&self) -> LedgerHash {
        self.hashed_value
    }

    /// The notarized root the proof folds to.
    #[must_use]
    pub const fn root(&self) -> LedgerHash {
        self.root
    }

    /// Witness time in UTC milliseconds; never negative.
    #[must_use]
    pub const fn utc_ms(&self) -> i64 {
        self.utc_ms
    }

    /// Opaque reference to the notary record.
    #[must_use]
    pub fn ref_url(&self) -> &str {
        &self.ref_url
    }

    /// The proof steps, leaf to root.
    #[must_use]
    pub fn proof(&self) -> &[ProofNode] {
        &self.proof
    }

    /// Serialize as `hashed_value || root || utc_ms(8B BE) ||
    /// count(4B BE) || (side(1B) || sibling(32B))* || url_len(2B BE) || url`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(self.hashed_value.as_ref());
        out.extend_from_slice(self.root.as_ref());
        out.extend_from_slice(&self.utc_ms.to_be_bytes());
        let count = u32::try_from(self.proof.len()).unwrap_or(u32::MAX);
        out.extend_from_slice(&count.to_be_bytes());
        for node in &self.proof {
            out.push(node.side.to_byte());
            out.extend_from_slice(node.sibling.as_ref());
        }
        let url_len = u16::try_from(self.ref_url.len()).unwrap_or(u16::MAX);
        out.extend_from_slice(&url_len.to_be_bytes());
        out.extend_from_slice(self.ref_url.as_bytes());
        out
    }

    /// Parse the [`Self::to_bytes`] layout and verify the result.
    ///
    /// # Errors
    /// [`LedgerError::InvalidFormat`] on truncation, trailing bytes, a bad
    /// side byte, or malformed UTF-8; the verification errors of
    /// [`Self::new`] otherwise.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LedgerError> {
        let mut cursor = Cursor::new(data);
        let hashed_value = cursor.take_hash()?;
        let root = cursor.take_hash()?;
        let utc_ms = i64::from_be_bytes(cursor.take_array::<8>()?);
        let count = u32::from_be_bytes(cursor.take_array::<4>()?);
        let mut proof = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            let [side_byte] = cursor.take_array::<1>()?;
            let side = ProofSide::from_byte(side_byte).ok_or_else(|| {
                LedgerError::InvalidFormat {
                    section: "crumtrail",
                    detail: format!("unknown proof side byte {side_byte:#04x}"),
                }
            })?;
            let sibling = cursor.take_hash()?;
            proof.push(ProofNode { side, sibling });
        }
        let url_len = u16::from_be_bytes(cursor.take_array::<2>()?);
        let url_bytes = cursor.take_slice(usize::from(url_len))?;
        let ref_url =
            String::from_utf8(url_bytes.to_vec()).map_err(|_| LedgerError::InvalidFormat {
                section: "crumtrail",
                detail: "reference URL is not UTF-8".into(),
            })?;
        cursor.finish()?;
        Self::new(hashed_value, proof, root, utc_ms, ref_url)
    }
}

/// Byte-cursor with truncation-checked reads.
struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn take_slice(&mut self, len: usize) -> Result<&'a [u8], LedgerError> {
        let (head, rest) = self
            .data
            .split_at_checked(len)
            .ok_or_else(|| LedgerError::InvalidFormat {
                section: "crumtrail",
                detail: format!("truncated: needed {len} more bytes"),
            })?;
        self.data = rest;
        Ok(head)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], LedgerError> {
        let slice = self.take_slice(N)?;
        slice
            .try_into()
            .map_err(|_| unreachable!("take_slice returns exactly N bytes"))
    }

    fn take_hash(&mut self) -> Result<LedgerHash, LedgerError> {
        Ok(LedgerHash::new(self.take_array::<HASH_WIDTH>()?))
    }

    fn finish(&self) -> Result<(), LedgerError> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::InvalidFormat {
                section: "crumtrail",
                detail: format!("{} trailing bytes", self.data.len()),
            })
        }
    }
}
