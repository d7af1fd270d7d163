//! Replaying a text log into a skip ledger.
//!
//! A replay walks the log line by line, hashes each ledgerable line into a
//! salted source row, and appends its input-hash to the ledger. Lines the
//! ledger already holds are re-hashed and compared instead of appended, so a
//! replay over a grown log is also an audit of the prefix it has seen
//! before. Checkpoints recorded in the track directory let later replays
//! skip the audited prefix when every observer agrees.

use std::io::{BufRead, Seek, SeekFrom};

use sldg_core::error::LedgerError;
use sldg_core::hash::LedgerHash;
use sldg_core::source::{ColumnValue, SourceRow};
use sldg_store::backend::StorageBackend;
use sldg_store::ledger::Ledger;
use tracing::{debug, warn};

use crate::error::LogError;
use crate::observer::{LedgeredLine, LogObserver};
use crate::track::TrackDir;

/// What a replay did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySummary {
    /// First row number appended by this replay, if any.
    pub first_new_rn: Option<u64>,
    /// Rows appended by this replay.
    pub rows_added: u64,
    /// Ledger size after the replay.
    pub size: u64,
    /// Lines read from the log, counting from where reading began.
    pub lines_read: u64,
    /// Byte offset one past the last line read.
    pub end_offset: u64,
    /// The ledger commitment after the replay.
    pub ledger_hash: LedgerHash,
}

/// A log replay over a ledger and its track directory.
#[derive(Debug)]
pub struct Replay<'a, B> {
    ledger: &'a mut Ledger<B>,
    track: &'a mut TrackDir,
    repair: bool,
}

impl<'a, B: StorageBackend> Replay<'a, B> {
    /// A replay that surfaces offset conflicts without touching them.
    pub fn new(ledger: &'a mut Ledger<B>, track: &'a mut TrackDir) -> Self {
        Self {
            ledger,
            track,
            repair: false,
        }
    }

    /// Opt into rewriting conflicting checkpoint entries from the rescan
    /// instead of aborting on the first [`LogError::OffsetConflict`].
    #[must_use]
    pub const fn repair(mut self, repair: bool) -> Self {
        self.repair = repair;
        self
    }

    /// Play the log: audit the known prefix, append the rest, and bring the
    /// tracking files up to date.
    ///
    /// # Errors
    /// - [`LedgerError::Cancelled`] when an observer's `stop_play` fires;
    /// - [`LedgerError::SourceMismatch`] when a re-hashed line disagrees
    ///   with the ledgered input-hash;
    /// - [`LogError::OffsetConflict`] when a checkpointed end-of-row offset
    ///   disagrees with the log (unless repairing);
    /// - [`LedgerError::IntegrityFailure`] when the log ends before
    ///   reproducing every ledgered row;
    /// - store and I/O failures.
    pub fn play<R>(
        &mut self,
        mut log: R,
        observers: &mut dyn LogObserver,
    ) -> Result<PlaySummary, LogError>
    where
        R: BufRead + Seek,
    {
        let seed = self.track.seed().clone();
        let format = self.track.format().clone();
        let spacing = self.track.spacing();
        let initial_size = self.ledger.size();

        let mut rn = 0_u64;
        let mut offset = 0_u64;
        if let Some(checkpoint) = self.resume_checkpoint()? {
            let (cp_rn, cp_offset) = checkpoint;
            if observers.next_state_ahead(cp_rn) {
                log.seek(SeekFrom::Start(cp_offset))?;
                rn = cp_rn;
                offset = cp_offset;
                debug!(rn, offset, "resumed replay from checkpoint");
            } else {
                debug!(rn = cp_rn, "checkpoint skip vetoed; reading from the top");
            }
        }

        let mut line_no = 0_u64;
        let mut line = String::new();
        loop {
            if observers.stop_play() {
                return Err(LedgerError::Cancelled.into());
            }
            line.clear();
            let read = log.read_line(&mut line)?;
            if read == 0 {
                break;
            }
            line_no = line_no.saturating_add(1);
            let start = offset;
            offset = offset.saturating_add(u64::try_from(read).unwrap_or(0));
            if !format.is_ledgerable(&line) {
                continue;
            }
            let columns: Vec<ColumnValue> = format
                .tokens(&line)
                .into_iter()
                .map(|token| ColumnValue::String(token.to_owned()))
                .collect();
            if columns.is_empty() {
                continue;
            }
            rn = rn.saturating_add(1);
            let source = SourceRow::from_values(rn, columns, &seed)?;
            let input_hash = source.input_hash();
            if rn <= self.ledger.size() {
                if self.ledger.input_hash(rn)? != input_hash {
                    return Err(LedgerError::SourceMismatch { rn }.into());
                }
            } else {
                self.ledger.append(input_hash)?;
            }
            let row = self.ledger.row(rn)?;
            let ledgered = LedgeredLine {
                rn,
                line_no,
                offset: start,
                end_offset: offset,
                source,
            };
            observers.on_ledgered_line(&ledgered)?;
            observers.on_row(&row, &ledgered)?;
            if rn % spacing == 0 {
                self.checkpoint(rn, row.hash(), offset)?;
            }
        }

        if rn < self.ledger.size() {
            return Err(LedgerError::IntegrityFailure(format!(
                "log ends at row {rn} but the ledger holds {}",
                self.ledger.size()
            ))
            .into());
        }
        observers.on_end_state(self.ledger.frontier())?;
        self.track.save_state(self.ledger.frontier())?;
        let rows_added = self.ledger.size().saturating_sub(initial_size);
        Ok(PlaySummary {
            first_new_rn: (rows_added > 0).then(|| initial_size.saturating_add(1)),
            rows_added,
            size: self.ledger.size(),
            lines_read: line_no,
            end_offset: offset,
            ledger_hash: self.ledger.ledger_hash(),
        })
    }

    /// The highest checkpoint usable for resumption, as `(rn, end_offset)`.
    fn resume_checkpoint(&self) -> Result<Option<(u64, u64)>, LogError> {
        let spacing = self.track.spacing();
        let by_size = self.ledger.size() / spacing;
        let by_table = self.track.checkpoint_count()?;
        let rn = by_size.min(by_table).saturating_mul(spacing);
        if rn == 0 {
            return Ok(None);
        }
        let Some(end_offset) = self.track.eor_at(rn)? else {
            return Ok(None);
        };
        // The checkpointed hash must still agree with the ledger.
        let recorded = self.track.frontier_hash_at(rn)?;
        if recorded != Some(self.ledger.row_hash(rn)?) {
            return Err(LedgerError::HashConflict(rn).into());
        }
        Ok(Some((rn, end_offset)))
    }

    fn checkpoint(
        &mut self,
        rn: u64,
        row_hash: LedgerHash,
        end_offset: u64,
    ) -> Result<(), LogError> {
        match self.track.eor_at(rn)? {
            Some(expected) if expected != end_offset => {
                if self.repair {
                    warn!(rn, expected, actual = end_offset, "repairing end-of-row offset");
                    self.track.record_checkpoint(rn, row_hash, end_offset)
                } else {
                    Err(LogError::OffsetConflict {
                        rn,
                        expected,
                        actual: end_offset,
                    })
                }
            }
            Some(_) => {
                // Offset agrees; re-assert the hash entry as well.
                if self.track.frontier_hash_at(rn)? == Some(row_hash) {
                    Ok(())
                } else if self.repair {
                    warn!(rn, "repairing checkpointed row-hash");
                    self.track.record_checkpoint(rn, row_hash, end_offset)
                } else {
                    Err(LedgerError::HashConflict(rn).into())
                }
            }
            None => self.track.record_checkpoint(rn, row_hash, end_offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use sldg_store::backend::MemoryBackend;

    use super::*;
    use crate::grammar::LogFormat;
    use crate::observer::CompositeObserver;

    const LOG: &str = "\
# header comment
alpha 1 one
beta 2 two

gamma 3 three
; another comment
delta 4 four
epsilon 5 five
zeta 6 six
";

    fn fixture(dir: &std::path::Path) -> (Ledger<MemoryBackend>, TrackDir) {
        let ledger = Ledger::open(MemoryBackend::new()).expect("ledger");
        let track = TrackDir::create(
            dir,
            1,
            [0x11; 32],
            LogFormat::new("#;", "").expect("format"),
        )
        .expect("track");
        (ledger, track)
    }

    #[test]
    fn play_ledgers_only_payload_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        let summary = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("play");
        assert_eq!(summary.size, 6);
        assert_eq!(summary.rows_added, 6);
        assert_eq!(summary.first_new_rn, Some(1));
        assert_eq!(summary.lines_read, 9);
        assert_eq!(summary.ledger_hash, ledger.ledger_hash());
        // Checkpoints landed every 2 rows.
        assert_eq!(track.checkpoint_count().expect("count"), 3);
    }

    #[test]
    fn replay_is_an_audit_and_resumes_from_checkpoints() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("first play");
        let hash = ledger.ledger_hash();

        // Re-play over the unchanged log: nothing appended, prefix skipped.
        let summary = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("second play");
        assert_eq!(summary.rows_added, 0);
        assert_eq!(summary.first_new_rn, None);
        assert_eq!(summary.ledger_hash, hash);
        // Resumed at row 6's checkpoint: no lines before it were re-read.
        assert_eq!(summary.lines_read, 0);

        // A grown log appends only the new rows.
        let grown = format!("{LOG}eta 7 seven\n");
        let summary = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(grown.as_str()), &mut CompositeObserver::new())
            .expect("third play");
        assert_eq!(summary.rows_added, 1);
        assert_eq!(summary.first_new_rn, Some(7));
        assert_eq!(ledger.size(), 7);
    }

    #[test]
    fn skip_veto_forces_a_full_audit() {
        struct Veto {
            offers: u64,
        }
        impl LogObserver for Veto {
            fn next_state_ahead(&mut self, _rn: u64) -> bool {
                self.offers = self.offers.saturating_add(1);
                false
            }
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("first play");

        let mut veto = Veto { offers: 0 };
        let summary = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut veto)
            .expect("vetoed play");
        assert_eq!(veto.offers, 1);
        // Every line was re-read and re-audited.
        assert_eq!(summary.lines_read, 9);
        assert_eq!(summary.rows_added, 0);
    }

    #[test]
    fn tampered_lines_surface_source_mismatch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("first play");

        let tampered = LOG.replace("gamma 3 three", "gamma 3 forged");
        let mut veto_all = VetoAll;
        let err = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(tampered.as_str()), &mut veto_all)
            .expect_err("tampered line");
        assert!(matches!(
            err,
            LogError::Ledger(LedgerError::SourceMismatch { rn: 3 })
        ));
    }

    struct VetoAll;
    impl LogObserver for VetoAll {
        fn next_state_ahead(&mut self, _rn: u64) -> bool {
            false
        }
    }

    #[test]
    fn comment_edits_shift_offsets_and_conflict_unless_repaired() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("first play");

        // Lengthening a comment moves every later end-of-row offset without
        // touching any hashed content.
        let shifted = LOG.replace("# header comment", "# header comment, now longer");
        let mut veto = VetoAll;
        let err = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(shifted.as_str()), &mut veto)
            .expect_err("offsets moved");
        assert!(matches!(err, LogError::OffsetConflict { rn: 2, .. }));

        let mut veto = VetoAll;
        let summary = Replay::new(&mut ledger, &mut track)
            .repair(true)
            .play(Cursor::new(shifted.as_str()), &mut veto)
            .expect("repair rewrites the tables");
        assert_eq!(summary.rows_added, 0);

        // After repair the shifted log replays cleanly without the veto.
        let summary = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(shifted.as_str()), &mut CompositeObserver::new())
            .expect("clean after repair");
        assert_eq!(summary.lines_read, 0);
    }

    #[test]
    fn stop_play_cancels() {
        struct Stop;
        impl LogObserver for Stop {
            fn stop_play(&self) -> bool {
                true
            }
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        let mut stop = Stop;
        let err = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut stop)
            .expect_err("cancelled");
        assert!(matches!(err, LogError::Ledger(LedgerError::Cancelled)));
        assert_eq!(ledger.size(), 0);
    }

    #[test]
    fn truncated_logs_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut CompositeObserver::new())
            .expect("first play");

        let short = "alpha 1 one\nbeta 2 two\n";
        let mut veto = VetoAll;
        let err = Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(short), &mut veto)
            .expect_err("log lost rows");
        assert!(matches!(
            err,
            LogError::Ledger(LedgerError::IntegrityFailure(_))
        ));
    }

    #[test]
    fn observers_see_lines_and_rows_in_order() {
        #[derive(Default)]
        struct Watcher {
            rows: Vec<u64>,
            columns: Vec<usize>,
            end_rn: u64,
        }
        impl LogObserver for Watcher {
            fn on_ledgered_line(&mut self, line: &LedgeredLine) -> Result<(), LogError> {
                self.columns.push(line.source.cells().len());
                Ok(())
            }
            fn on_row(
                &mut self,
                row: &sldg_core::row::Row,
                line: &LedgeredLine,
            ) -> Result<(), LogError> {
                assert_eq!(row.rn(), line.rn);
                self.rows.push(row.rn());
                Ok(())
            }
            fn on_end_state(
                &mut self,
                frontier: &sldg_core::frontier::HashFrontier,
            ) -> Result<(), LogError> {
                self.end_rn = frontier.rn();
                Ok(())
            }
        }
        let dir = tempfile::tempdir().expect("tempdir");
        let (mut ledger, mut track) = fixture(dir.path());
        let mut watcher = Watcher::default();
        Replay::new(&mut ledger, &mut track)
            .play(Cursor::new(LOG), &mut watcher)
            .expect("play");
        assert_eq!(watcher.rows, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(watcher.columns, vec![3; 6]);
        assert_eq!(watcher.end_rn, 6);
    }
}
