//! Replay observers.
//!
//! The replay drives a flat list of observers in a fixed order; there is no
//! observer hierarchy. Per line, the order is:
//!
//! 1. [`LogObserver::stop_play`] — polled before the line is read; `true`
//!    aborts the replay with `Cancelled`.
//! 2. [`LogObserver::on_ledgered_line`] — after the line's input-hash is in
//!    the ledger.
//! 3. [`LogObserver::on_row`] — immediately after, with the assembled
//!    skip-ledger row.
//!
//! [`LogObserver::next_state_ahead`] is asked once, before replay starts,
//! when a saved checkpoint would let the replay skip already-ledgered lines;
//! any `false` vetoes the skip and the log is re-read from the top.
//! [`LogObserver::on_end_state`] fires once at end of input.

use sldg_core::frontier::HashFrontier;
use sldg_core::row::Row;
use sldg_core::source::SourceRow;

use crate::error::LogError;

/// A line the replay has ledgered, with its provenance in the log.
#[derive(Debug, Clone)]
pub struct LedgeredLine {
    /// The skip-ledger row number the line became.
    pub rn: u64,
    /// 1-based line number in the log, counting every line.
    pub line_no: u64,
    /// Byte offset of the line's first byte.
    pub offset: u64,
    /// Byte offset one past the line's terminator; the end-of-row offset.
    pub end_offset: u64,
    /// The tokenized, salted source row the line hashed into.
    pub source: SourceRow,
}

/// A replay observer. All hooks default to no-ops so implementations
/// override only what they watch.
pub trait LogObserver {
    /// Polled before each line; return `true` to abort the replay.
    fn stop_play(&self) -> bool {
        false
    }

    /// A saved checkpoint at `rn` would let the replay skip ahead; return
    /// `false` to veto the skip and force a full re-read.
    fn next_state_ahead(&mut self, rn: u64) -> bool {
        let _ = rn;
        true
    }

    /// A line was ledgered.
    ///
    /// # Errors
    /// Implementations may abort the replay by returning any [`LogError`].
    fn on_ledgered_line(&mut self, line: &LedgeredLine) -> Result<(), LogError> {
        let _ = line;
        Ok(())
    }

    /// The skip-ledger row created (or re-derived) for a ledgered line.
    ///
    /// # Errors
    /// Implementations may abort the replay by returning any [`LogError`].
    fn on_row(&mut self, row: &Row, line: &LedgeredLine) -> Result<(), LogError> {
        let _ = (row, line);
        Ok(())
    }

    /// End of input; `frontier` summarizes the ledger as replayed.
    ///
    /// # Errors
    /// Implementations may abort the replay by returning any [`LogError`].
    fn on_end_state(&mut self, frontier: &HashFrontier) -> Result<(), LogError> {
        let _ = frontier;
        Ok(())
    }
}

/// Forwards every hook to a list of observers in registration order.
///
/// `stop_play` is `true` if any member says so; `next_state_ahead` is `true`
/// only if every member agrees; the remaining hooks stop at the first error.
#[derive(Default)]
pub struct CompositeObserver<'a> {
    members: Vec<&'a mut dyn LogObserver>,
}

impl<'a> CompositeObserver<'a> {
    /// An empty composite.
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
        }
    }

    /// Append an observer; it is invoked after those already registered.
    pub fn register(&mut self, observer: &'a mut dyn LogObserver) -> &mut Self {
        self.members.push(observer);
        self
    }
}

impl LogObserver for CompositeObserver<'_> {
    fn stop_play(&self) -> bool {
        self.members.iter().any(|member| member.stop_play())
    }

    fn next_state_ahead(&mut self, rn: u64) -> bool {
        // Every member is asked, even after a veto, so each sees the offer.
        let mut agreed = true;
        for member in &mut self.members {
            agreed &= member.next_state_ahead(rn);
        }
        agreed
    }

    fn on_ledgered_line(&mut self, line: &LedgeredLine) -> Result<(), LogError> {
        for member in &mut self.members {
            member.on_ledgered_line(line)?;
        }
        Ok(())
    }

    fn on_row(&mut self, row: &Row, line: &LedgeredLine) -> Result<(), LogError> {
        for member in &mut self.members {
            member.on_row(row, line)?;
        }
        Ok(())
    }

    fn on_end_state(&mut self, frontier: &HashFrontier) -> Result<(), LogError> {
        for member in &mut self.members {
            member.on_end_state(frontier)?;
        }
        Ok(())
    }
}

/// Collects the source rows of selected row numbers as a replay ledgers
/// them.
///
/// Vetoes checkpoint skips that would jump past a wanted row, so the rows it
/// is after are always actually read.
#[derive(Debug, Default)]
pub struct SourceCollector {
    wanted: std::collections::BTreeSet<u64>,
    rows: std::collections::BTreeMap<u64, SourceRow>,
}

impl SourceCollector {
    /// Collect the source rows numbered in `wanted`.
    pub fn new(wanted: impl IntoIterator<Item = u64>) -> Self {
        Self {
            wanted: wanted.into_iter().collect(),
            rows: std::collections::BTreeMap::new(),
        }
    }

    /// The collected source rows, ascending.
    #[must_use]
    pub fn into_rows(self) -> Vec<SourceRow> {
        self.rows.into_values().collect()
    }
}

impl LogObserver for SourceCollector {
    fn next_state_ahead(&mut self, rn: u64) -> bool {
        self.wanted.iter().all(|&wanted| wanted > rn)
    }

    fn on_ledgered_line(&mut self, line: &LedgeredLine) -> Result<(), LogError> {
        if self.wanted.contains(&line.rn) {
            self.rows.insert(line.rn, line.source.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        lines: Vec<u64>,
        ended: bool,
        veto_skip: bool,
        offers: Vec<u64>,
    }

    impl LogObserver for Recorder {
        fn next_state_ahead(&mut self, rn: u64) -> bool {
            self.offers.push(rn);
            !self.veto_skip
        }

        fn on_ledgered_line(&mut self, line: &LedgeredLine) -> Result<(), LogError> {
            self.lines.push(line.rn);
            Ok(())
        }

        fn on_end_state(&mut self, _frontier: &HashFrontier) -> Result<(), LogError> {
            self.ended = true;
            Ok(())
        }
    }

    #[test]
    fn composite_forwards_in_registration_order_and_ands_skips() {
        let mut first = Recorder::default();
        let mut second = Recorder {
            veto_skip: true,
            ..Recorder::default()
        };
        {
            let mut composite = CompositeObserver::new();
            composite.register(&mut first).register(&mut second);
            assert!(!composite.next_state_ahead(8));
            composite
                .on_end_state(&HashFrontier::new())
                .expect("end state");
        }
        // Both members saw the offer despite the veto.
        assert_eq!(first.offers, vec![8]);
        assert_eq!(second.offers, vec![8]);
        assert!(first.ended);
        assert!(second.ended);
    }

    #[test]
    fn composite_stop_play_is_any() {
        struct Stopper;
        impl LogObserver for Stopper {
            fn stop_play(&self) -> bool {
                true
            }
        }
        let mut quiet = Recorder::default();
        let mut stopper = Stopper;
        let mut composite = CompositeObserver::new();
        assert!(!composite.stop_play());
        composite.register(&mut quiet).register(&mut stopper);
        assert!(composite.stop_play());
    }
}
