//! Pure row-number arithmetic.
//!
//! Row numbers are positive, dense, and monotonically increasing. Every row
//! `n` carries `1 + trailing_zeros(n)` hash pointers to earlier rows at
//! power-of-two offsets; the functions here compute those targets and the
//! shortest verifiable routes between any two row numbers. No I/O, no state.

#![allow(
    clippy::arithmetic_side_effects,
    reason = "All offsets are powers of two bounded by the operands' trailing-zero counts"
)]

use itertools::Itertools as _;

/// Number of hash pointers in row `rn`: `1 + trailing_zeros(rn)`.
///
/// Equivalently, one more than the largest `e` with `2^e | rn`. Odd rows
/// have a single pointer.
///
/// # Panics
/// Panics if `rn` is zero; the sentinel row has no pointers.
#[must_use]
pub const fn skip_count(rn: u64) -> u32 {
    assert!(rn >= 1, "row numbers start at 1");
    1 + rn.trailing_zeros()
}

/// The row numbers row `rn` points to, in cell order:
/// `[rn - 1, rn - 2, rn - 4, .., rn - 2^(skip_count(rn) - 1)]`.
///
/// `pointer_rns(1)` is `[0]`, the sentinel row.
///
/// # Panics
/// Panics if `rn` is zero.
#[must_use]
pub fn pointer_rns(rn: u64) -> Vec<u64> {
    (0..skip_count(rn)).map(|e| rn - (1_u64 << e)).collect()
}

/// Number of bits needed to represent `rn`; the frontier level count.
#[must_use]
pub const fn bit_length(rn: u64) -> u32 {
    u64::BITS - rn.leading_zeros()
}

/// The row number at frontier level `level` for a ledger of size `rn`:
/// `rn` floored to the nearest multiple of `2^level`.
#[must_use]
pub const fn level_rn(rn: u64, level: u32) -> u64 {
    if level >= u64::BITS {
        0
    } else {
        (rn >> level) << level
    }
}

/// The shortest sequence of row numbers proving `hi` from `lo`, inclusive of
/// both endpoints and ascending.
///
/// Starting at `lo`, each step jumps by the largest power of two `2^e` that
/// both divides the current row number and lands at or before `hi`. Every
/// adjacent pair `(u, v)` in the result satisfies `u ∈ pointer_rns(v)`, so
/// the route is verifiable one hop at a time. The length is logarithmic in
/// `hi - lo`.
///
/// # Panics
/// Panics if `lo` is zero or `lo > hi`.
#[must_use]
pub fn skip_path_rns(lo: u64, hi: u64) -> Vec<u64> {
    assert!(lo >= 1, "row numbers start at 1");
    assert!(lo <= hi, "skip path endpoints must be ordered");
    let mut path = Vec::with_capacity(usize::try_from(bit_length(hi)).unwrap_or(64) * 2);
    path.push(lo);
    let mut cur = lo;
    while cur < hi {
        let mut e = cur.trailing_zeros().min(u64::BITS - 1);
        while (1_u64 << e) > hi - cur {
            e -= 1;
        }
        cur += 1_u64 << e;
        path.push(cur);
    }
    path
}

/// The minimal superset of `targets` in which every consecutive pair is
/// linked by a single hash pointer hop.
///
/// Targets are deduplicated and sorted first; the result is the ascending
/// union of the pairwise skip paths between neighbours. An empty input
/// yields an empty stitch.
///
/// # Panics
/// Panics if any target is zero.
#[must_use]
pub fn stitch(targets: &[u64]) -> Vec<u64> {
    let sorted: Vec<u64> = targets.iter().copied().sorted().dedup().collect();
    let Some(&first) = sorted.first() else {
        return Vec::new();
    };
    assert!(first >= 1, "row numbers start at 1");
    let mut out = vec![first];
    for (lo, hi) in sorted.iter().copied().tuple_windows() {
        // Skip the leading element of each segment; it is already present.
        out.extend(skip_path_rns(lo, hi).into_iter().skip(1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_count_counts_trailing_zeros() {
        assert_eq!(skip_count(1), 1);
        assert_eq!(skip_count(2), 2);
        assert_eq!(skip_count(3), 1);
        assert_eq!(skip_count(4), 3);
        assert_eq!(skip_count(6), 2);
        assert_eq!(skip_count(1024), 11);
        for rn in 1..=2048 {
            assert_eq!(skip_count(rn), 1 + rn.trailing_zeros());
        }
    }

    #[test]
    #[should_panic(expected = "row numbers start at 1")]
    fn skip_count_rejects_sentinel() {
        let _ = skip_count(0);
    }

    #[test]
    fn pointer_rns_shape() {
        assert_eq!(pointer_rns(1), vec![0]);
        assert_eq!(pointer_rns(2), vec![1, 0]);
        assert_eq!(pointer_rns(3), vec![2]);
        assert_eq!(pointer_rns(4), vec![3, 2, 0]);
        assert_eq!(pointer_rns(8), vec![7, 6, 4, 0]);
        for rn in 1..=2048_u64 {
            let ptrs = pointer_rns(rn);
            assert_eq!(ptrs.len(), usize::try_from(skip_count(rn)).expect("fits"));
            for (e, ptr) in ptrs.iter().enumerate() {
                assert_eq!(rn - ptr, 1 << e);
            }
        }
    }

    #[test]
    fn level_rn_floors_to_power_of_two_multiples() {
        assert_eq!(level_rn(5, 0), 5);
        assert_eq!(level_rn(5, 1), 4);
        assert_eq!(level_rn(5, 2), 4);
        assert_eq!(level_rn(6, 1), 6);
        assert_eq!(level_rn(7, 3), 0);
        assert_eq!(level_rn(u64::MAX, 64), 0);
    }

    #[test]
    fn bit_length_matches_levels() {
        assert_eq!(bit_length(0), 0);
        assert_eq!(bit_length(1), 1);
        assert_eq!(bit_length(2), 2);
        assert_eq!(bit_length(3), 2);
        assert_eq!(bit_length(4), 3);
        assert_eq!(bit_length(u64::MAX), 64);
    }

    mod skip_path {
        use super::*;

        #[test]
        fn literal_cases() {
            assert_eq!(skip_path_rns(1, 1), vec![1]);
            assert_eq!(skip_path_rns(1, 4), vec![1, 2, 4]);
            assert_eq!(skip_path_rns(1, 7), vec![1, 2, 4, 6, 7]);
            assert_eq!(skip_path_rns(2, 16), vec![2, 4, 8, 16]);
            assert_eq!(
                skip_path_rns(1, 100),
                vec![1, 2, 4, 8, 16, 32, 64, 96, 100]
            );
        }

        #[test]
        fn endpoints_and_linkage() {
            for lo in 1..=64_u64 {
                for hi in lo..=320 {
                    let path = skip_path_rns(lo, hi);
                    assert_eq!(path.first(), Some(&lo));
                    assert_eq!(path.last(), Some(&hi));
                    for pair in path.windows(2) {
                        let [u, v] = pair else { unreachable!() };
                        assert!(u < v);
                        assert!(
                            pointer_rns(*v).contains(u),
                            "{u} must be a pointer target of {v}"
                        );
                    }
                }
            }
        }

        #[test]
        fn length_is_logarithmic() {
            for (lo, hi) in [(1, u32::MAX.into()), (3, 1 << 40), (12_345, 1 << 50)] {
                let path = skip_path_rns(lo, hi);
                let bound = usize::try_from(2 * (bit_length(hi - lo + 1) + 2)).expect("fits");
                assert!(path.len() <= bound, "{} > {bound}", path.len());
            }
        }
    }

    mod stitching {
        use super::*;

        #[test]
        fn empty_and_singleton() {
            assert_eq!(stitch(&[]), Vec::<u64>::new());
            assert_eq!(stitch(&[9]), vec![9]);
        }

        #[test]
        fn unsorted_duplicated_targets() {
            let out = stitch(&[7, 2, 7, 5]);
            assert_eq!(out, vec![2, 4, 5, 6, 7]);
        }

        #[test]
        fn consecutive_output_pairs_are_linked() {
            let out = stitch(&[1, 33, 70, 3]);
            for target in [1, 3, 33, 70] {
                assert!(out.contains(&target));
            }
            for pair in out.windows(2) {
                let [u, v] = pair else { unreachable!() };
                assert!(pointer_rns(*v).contains(u));
            }
        }
    }
}
