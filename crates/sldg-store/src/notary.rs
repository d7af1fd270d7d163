//! The notary seam: how witness records are obtained.
//!
//! The core never talks to a network; it calls through this interface and
//! the caller supplies the transport, retries, and backoff. A submitted
//! hash is typically not witnessable immediately, so `fetch` may report
//! `Pending` any number of times before producing a crumtrail.

use sldg_core::crumtrail::Crumtrail;
use sldg_core::hash::LedgerHash;
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StoreError;
use crate::ledger::Ledger;

/// The outcome of asking the notary for a witness record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WitnessFetch {
    /// The notary has anchored the hash; here is the proof.
    Trail(Crumtrail),
    /// Not anchored yet; ask again later.
    Pending,
}

/// An external notarization service, seen from the core.
pub trait NotaryService {
    /// Submit a hash for anchoring; returns the service's receipt id.
    ///
    /// # Errors
    /// Service-defined submission failures.
    fn submit(&mut self, hash: LedgerHash) -> Result<String, StoreError>;

    /// Ask for the witness record of a previously submitted hash.
    ///
    /// # Errors
    /// Service-defined retrieval failures.
    fn fetch(&mut self, hash: LedgerHash) -> Result<WitnessFetch, StoreError>;
}

/// Submit the ledger's current commitment and store the witness record if
/// the notary already has one. Returns the witnessed row number, or `None`
/// while the anchor is pending.
///
/// # Errors
/// Notary failures; the validation errors of
/// [`Ledger::put_crumtrail`] if the returned trail does not match.
pub fn witness_ledger<B, N>(
    ledger: &mut Ledger<B>,
    notary: &mut N,
) -> Result<Option<u64>, StoreError>
where
    B: StorageBackend,
    N: NotaryService,
{
    let rn = ledger.size();
    if rn == 0 {
        return Ok(None);
    }
    let hash = ledger.ledger_hash();
    let receipt = notary.submit(hash)?;
    debug!(rn, receipt, "submitted commitment for witnessing");
    match notary.fetch(hash)? {
        WitnessFetch::Pending => Ok(None),
        WitnessFetch::Trail(trail) => {
            ledger.put_crumtrail(rn, &trail)?;
            Ok(Some(rn))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use test_utils::seq_input_hashes;

    use super::*;
    use crate::backend::MemoryBackend;

    /// A notary double that anchors everything on the second ask.
    #[derive(Default)]
    struct SlowNotary {
        submitted: BTreeSet<LedgerHash>,
        asked: BTreeSet<LedgerHash>,
    }

    impl NotaryService for SlowNotary {
        fn submit(&mut self, hash: LedgerHash) -> Result<String, StoreError> {
            self.submitted.insert(hash);
            Ok(format!("receipt-{}", self.submitted.len()))
        }

        fn fetch(&mut self, hash: LedgerHash) -> Result<WitnessFetch, StoreError> {
            if !self.asked.insert(hash) {
                // Second ask: anchor directly (degenerate proof).
                let trail = Crumtrail::new(hash, Vec::new(), hash, 5_000, "crums://t".into())
                    .map_err(StoreError::from)?;
                return Ok(WitnessFetch::Trail(trail));
            }
            Ok(WitnessFetch::Pending)
        }
    }

    #[test]
    fn pending_then_witnessed() {
        let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
        for input in seq_input_hashes(5) {
            ledger
                .append(sldg_core::hash::LedgerHash::new(input))
                .expect("append");
        }
        let mut notary = SlowNotary::default();
        assert_eq!(
            witness_ledger(&mut ledger, &mut notary).expect("first ask"),
            None
        );
        assert_eq!(
            witness_ledger(&mut ledger, &mut notary).expect("second ask"),
            Some(5)
        );
        assert_eq!(ledger.trailed_rns().expect("rns"), vec![5]);
    }

    #[test]
    fn empty_ledgers_are_not_submitted() {
        let mut ledger = Ledger::open(MemoryBackend::new()).expect("open");
        let mut notary = SlowNotary::default();
        assert_eq!(
            witness_ledger(&mut ledger, &mut notary).expect("no-op"),
            None
        );
        assert!(notary.submitted.is_empty());
    }
}
