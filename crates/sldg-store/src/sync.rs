//! Pulling a source ledger into a hash ledger.

use sldg_core::error::LedgerError;
use sldg_core::source::{SaltSeed, SourceLedger, SourceRow};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StoreError;
use crate::ledger::Ledger;

/// Hash every source row the hash ledger does not yet cover and append it,
/// salting each row with `seed`. Already-covered rows are re-hashed and
/// audited against the stored input-hashes. Returns the number of rows
/// appended. The cancellation signal is polled at every row boundary.
///
/// # Errors
/// - [`LedgerError::SourceMismatch`] if an audited row no longer hashes to
///   its ledgered input-hash;
/// - [`LedgerError::Cancelled`] if the signal fires;
/// - source and backend failures.
pub fn sync_from_source<B, S>(
    ledger: &mut Ledger<B>,
    source: &S,
    seed: &SaltSeed,
    audit_from: u64,
    cancelled: impl Fn() -> bool,
) -> Result<u64, StoreError>
where
    B: StorageBackend,
    S: SourceLedger + ?Sized,
{
    let source_size = source.size()?;
    let mut added = 0_u64;
    for rn in audit_from.max(1)..=source_size {
        if cancelled() {
            return Err(LedgerError::Cancelled.into());
        }
        let row = SourceRow::from_values(rn, source.row(rn)?, seed)?;
        let input_hash = row.input_hash();
        if rn <= ledger.size() {
            if ledger.input_hash(rn)? != input_hash {
                return Err(LedgerError::SourceMismatch { rn }.into());
            }
        } else {
            ledger.append(input_hash)?;
            added = added.saturating_add(1);
        }
    }
    debug!(added, size = ledger.size(), "synced from source ledger");
    Ok(added)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "fixture rows are in bounds")]

    use sldg_core::source::ColumnValue;

    use super::*;
    use crate::backend::MemoryBackend;

    struct VecSource(Vec<Vec<ColumnValue>>);

    impl SourceLedger for VecSource {
        fn size(&self) -> Result<u64, LedgerError> {
            Ok(u64::try_from(self.0.len()).unwrap_or(u64::MAX))
        }

        fn row(&self, rn: u64) -> Result<Vec<ColumnValue>, LedgerError> {
            usize::try_from(rn)
                .ok()
                .and_then(|at| at.checked_sub(1))
                .and_then(|at| self.0.get(at))
                .cloned()
                .ok_or(LedgerError::MissingRow(rn))
        }
    }

    fn sample_source(count: i64) -> VecSource {
        VecSource(
            (1..=count)
                .map(|n| {
                    vec![
                        ColumnValue::String(format!("item-{n}")),
                        ColumnValue::Long(n),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn sync_appends_then_audits() {
        let seed = SaltSeed::new([0x07; 32]);
        let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
        let source = sample_source(6);
        let added =
            sync_from_source(&mut ledger, &source, &seed, 1, || false).expect("sync");
        assert_eq!(added, 6);
        assert_eq!(ledger.size(), 6);
        let hash = ledger.ledger_hash();

        // A second sync over a grown source audits the prefix.
        let grown = sample_source(8);
        let added =
            sync_from_source(&mut ledger, &grown, &seed, 1, || false).expect("resync");
        assert_eq!(added, 2);
        assert_ne!(ledger.ledger_hash(), hash);
    }

    #[test]
    fn drifted_sources_are_detected() {
        let seed = SaltSeed::new([0x07; 32]);
        let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
        sync_from_source(&mut ledger, &sample_source(4), &seed, 1, || false).expect("sync");

        let mut drifted = sample_source(4);
        drifted.0[2] = vec![ColumnValue::String("rewritten".into())];
        let err = sync_from_source(&mut ledger, &drifted, &seed, 1, || false)
            .expect_err("row 3 drifted");
        assert!(matches!(
            err,
            StoreError::Ledger(LedgerError::SourceMismatch { rn: 3 })
        ));
    }

    #[test]
    fn cancellation_stops_at_a_row_boundary() {
        let seed = SaltSeed::new([0x07; 32]);
        let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
        let err = sync_from_source(&mut ledger, &sample_source(4), &seed, 1, || true)
            .expect_err("cancelled");
        assert!(matches!(err, StoreError::Ledger(LedgerError::Cancelled)));
        assert_eq!(ledger.size(), 0);
    }
}
