//! Shared test utilities for the workspace.

use sha2::{Digest as _, Sha256};

/// Helper macro to create a 32-byte hash array with a specific last byte.
///
/// Returns `[u8; 32]` which can be converted to `LedgerHash` via `.into()`.
#[macro_export]
macro_rules! h32 {
    ($v:expr) => {{
        let mut arr = [0_u8; 32];
        arr[31] = $v;
        arr.into()
    }};
}

/// Helper macro to create a vector of 32-byte hash arrays.
///
/// Returns items that can be converted to `LedgerHash` via `.into()`.
#[macro_export]
macro_rules! h32s {
    ($($v:expr),* $(,)?) => {{
        vec![$( $crate::h32!($v) ),*]
    }};
}

/// Input hashes for rows `1..=count` in the shape the end-to-end scenarios
/// use: the SHA-256 of the decimal string of the row number.
#[must_use]
pub fn seq_input_hashes(count: u64) -> Vec<[u8; 32]> {
    (1..=count)
        .map(|rn| Sha256::digest(rn.to_string().as_bytes()).into())
        .collect()
}
