//! The private tracking files a hashed log keeps beside itself.
//!
//! A track directory holds three things, all producer-local:
//!
//! - `frontiers` — a fixed header (magic, checkpoint exponent, the salt
//!   seed, the line grammar) followed by a 32-byte-aligned table of
//!   checkpointed row-hashes, entry `t` holding `H((t + 1) * 2^dex)`;
//! - `eor` — a 6-byte header followed by ascending 64-bit end-of-row byte
//!   offsets into the log, aligned with the `frontiers` table;
//! - `_{rn}.fstate` — full frontier snapshots for fast replay resumption.
//!
//! The seed never leaves this directory; exported artifacts carry only
//! derived per-cell salts.

#![allow(
    clippy::indexing_slicing,
    reason = "header layouts are fixed-width"
)]

use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};

use sldg_core::frontier::HashFrontier;
use sldg_core::hash::{HASH_WIDTH, LedgerHash};
use sldg_core::source::SaltSeed;
use tracing::debug;
use zeroize::Zeroize as _;

use crate::error::LogError;
use crate::grammar::LogFormat;

/// Magic prefix of the `frontiers` file.
const FRONTIERS_MAGIC: &[u8; 5] = b"fhash";
/// Magic prefix of the `eor` file.
const EOR_MAGIC: &[u8; 3] = b"eor";
/// Magic prefix of `.fstate` checkpoint files.
const FSTATE_MAGIC: &[u8; 6] = b"fstate";
/// Fixed byte count of the `eor` header.
const EOR_HEADER_LEN: u64 = 6;
/// The frontiers table alignment; also its entry width.
const TABLE_ALIGN: u64 = 32;

/// Name of the frontiers file inside a track directory.
const FRONTIERS_FILE: &str = "frontiers";
/// Name of the end-of-row offsets file inside a track directory.
const EOR_FILE: &str = "eor";

/// A hashed log's tracking directory.
pub struct TrackDir {
    dir: PathBuf,
    frontiers: File,
    eor: File,
    dex: u8,
    seed: SaltSeed,
    format: LogFormat,
    table_offset: u64,
}

impl TrackDir {
    /// Create a fresh track directory with checkpoint spacing `2^dex`.
    ///
    /// # Errors
    /// [`LogError::Io`] on filesystem failure, including pre-existing
    /// tracking files.
    pub fn create(
        dir: &Path,
        dex: u8,
        seed: [u8; HASH_WIDTH],
        format: LogFormat,
    ) -> Result<Self, LogError> {
        fs::create_dir_all(dir)?;
        let cp = format.comment_prefixes().as_bytes();
        let del = format.delimiters().as_bytes();
        let mut header = Vec::new();
        header.extend_from_slice(FRONTIERS_MAGIC);
        header.extend_from_slice(&[0, 0]);
        header.push(dex);
        header.extend_from_slice(&seed);
        header.push(u8::try_from(cp.len()).unwrap_or(u8::MAX));
        header.push(u8::try_from(del.len()).unwrap_or(u8::MAX));
        header.extend_from_slice(cp);
        header.extend_from_slice(del);
        let table_offset = u64::try_from(header.len())
            .unwrap_or(u64::MAX)
            .next_multiple_of(TABLE_ALIGN);
        header.resize(usize::try_from(table_offset).unwrap_or(header.len()), 0);

        let mut frontiers = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(dir.join(FRONTIERS_FILE))?;
        frontiers.write_all(&header)?;
        frontiers.sync_data()?;
        header.zeroize();

        let mut eor = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(dir.join(EOR_FILE))?;
        let mut eor_header = Vec::with_capacity(usize::try_from(EOR_HEADER_LEN).unwrap_or(6));
        eor_header.extend_from_slice(EOR_MAGIC);
        eor_header.extend_from_slice(&[0, 0]);
        eor_header.push(dex);
        eor.write_all(&eor_header)?;
        eor.sync_data()?;

        debug!(dir = %dir.display(), dex, "created track directory");
        Ok(Self {
            dir: dir.to_owned(),
            frontiers,
            eor,
            dex,
            seed: SaltSeed::new(seed),
            format,
            table_offset,
        })
    }

    /// Open an existing track directory.
    ///
    /// # Errors
    /// [`LogError::Io`] on filesystem failure; [`LogError::InvalidFormat`]
    /// on bad magic, disagreeing checkpoint exponents, or misaligned tables.
    pub fn open(dir: &Path) -> Result<Self, LogError> {
        let mut frontiers = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join(FRONTIERS_FILE))?;
        let mut fixed = [0_u8; 42];
        frontiers.read_exact(&mut fixed)?;
        if &fixed[..5] != FRONTIERS_MAGIC {
            return Err(LogError::InvalidFormat {
                section: "frontiers header",
                detail: "bad magic".into(),
            });
        }
        let dex = fixed[7];
        let mut seed = [0_u8; HASH_WIDTH];
        seed.copy_from_slice(&fixed[8..40]);
        let cp_len = usize::from(fixed[40]);
        let del_len = usize::from(fixed[41]);
        fixed.zeroize();
        let mut charsets = vec![0_u8; cp_len.saturating_add(del_len)];
        frontiers.read_exact(&mut charsets)?;
        let cp = std::str::from_utf8(&charsets[..cp_len]).map_err(|_| {
            LogError::InvalidFormat {
                section: "frontiers header",
                detail: "comment-prefix chars are not UTF-8".into(),
            }
        })?;
        let del = std::str::from_utf8(&charsets[cp_len..]).map_err(|_| {
            LogError::InvalidFormat {
                section: "frontiers header",
                detail: "delimiter chars are not UTF-8".into(),
            }
        })?;
        let format = LogFormat::new(cp, del)?;
        let table_offset = (42_u64)
            .saturating_add(u64::try_from(charsets.len()).unwrap_or(0))
            .next_multiple_of(TABLE_ALIGN);

        let mut eor = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join(EOR_FILE))?;
        let mut eor_header = [0_u8; 6];
        eor.read_exact(&mut eor_header)?;
        if &eor_header[..3] != EOR_MAGIC {
            return Err(LogError::InvalidFormat {
                section: "eor header",
                detail: "bad magic".into(),
            });
        }
        if eor_header[5] != dex {
            return Err(LogError::InvalidFormat {
                section: "eor header",
                detail: format!(
                    "checkpoint exponent {} disagrees with frontiers exponent {dex}",
                    eor_header[5]
                ),
            });
        }

        let track = Self {
            dir: dir.to_owned(),
            frontiers,
            eor,
            dex,
            seed: SaltSeed::new(seed),
            format,
            table_offset,
        };
        // Validates both table alignments.
        let count = track.checkpoint_count()?;
        debug!(dir = %dir.display(), dex, count, "opened track directory");
        Ok(track)
    }

    /// The checkpoint spacing in rows, `2^dex`.
    #[must_use]
    pub fn spacing(&self) -> u64 {
        1_u64 << u32::from(self.dex.min(63))
    }

    /// The checkpoint exponent.
    #[must_use]
    pub const fn dex(&self) -> u8 {
        self.dex
    }

    /// The salt seed recovered from the header.
    #[must_use]
    pub const fn seed(&self) -> &SaltSeed {
        &self.seed
    }

    /// The line grammar recovered from the header.
    #[must_use]
    pub const fn format(&self) -> &LogFormat {
        &self.format
    }

    /// Number of checkpoints recorded.
    ///
    /// # Errors
    /// [`LogError::InvalidFormat`] if either table is misaligned or the two
    /// disagree.
    pub fn checkpoint_count(&self) -> Result<u64, LogError> {
        let fr_body = self
            .frontiers
            .metadata()?
            .len()
            .checked_sub(self.table_offset)
            .ok_or(LogError::InvalidFormat {
                section: "frontiers",
                detail: "table shorter than its header".into(),
            })?;
        let eor_body = self
            .eor
            .metadata()?
            .len()
            .checked_sub(EOR_HEADER_LEN)
            .ok_or(LogError::InvalidFormat {
                section: "eor",
                detail: "table shorter than its header".into(),
            })?;
        if fr_body % TABLE_ALIGN != 0 || eor_body % 8 != 0 {
            return Err(LogError::InvalidFormat {
                section: "tracking tables",
                detail: "table body is not entry-aligned".into(),
            });
        }
        let fr_count = fr_body / TABLE_ALIGN;
        let eor_count = eor_body / 8;
        if fr_count != eor_count {
            return Err(LogError::InvalidFormat {
                section: "tracking tables",
                detail: format!(
                    "frontiers holds {fr_count} checkpoints, eor holds {eor_count}"
                ),
            });
        }
        Ok(fr_count)
    }

    /// The 0-based table index of checkpointed row `rn`, or `None` when `rn`
    /// is not on a checkpoint boundary.
    fn index_of(&self, rn: u64) -> Option<u64> {
        if rn == 0 || rn % self.spacing() != 0 {
            return None;
        }
        (rn / self.spacing()).checked_sub(1)
    }

    /// Record (or overwrite) the checkpoint at row `rn`.
    ///
    /// # Errors
    /// [`LogError::InvalidFormat`] if `rn` is off-boundary or would leave a
    /// gap in the tables; [`LogError::Io`] on write failure.
    pub fn record_checkpoint(
        &mut self,
        rn: u64,
        row_hash: LedgerHash,
        end_offset: u64,
    ) -> Result<(), LogError> {
        let at = self.index_of(rn).ok_or_else(|| LogError::InvalidFormat {
            section: "tracking tables",
            detail: format!("row {rn} is not on a {}-row boundary", self.spacing()),
        })?;
        let count = self.checkpoint_count()?;
        if at > count {
            return Err(LogError::InvalidFormat {
                section: "tracking tables",
                detail: format!("checkpoint {at} would leave a gap after {count}"),
            });
        }
        self.frontiers.write_all_at(
            row_hash.as_ref(),
            self.table_offset.saturating_add(at.saturating_mul(TABLE_ALIGN)),
        )?;
        self.frontiers.sync_data()?;
        self.eor.write_all_at(
            &end_offset.to_be_bytes(),
            EOR_HEADER_LEN.saturating_add(at.saturating_mul(8)),
        )?;
        self.eor.sync_data()?;
        Ok(())
    }

    /// The recorded end-of-row offset of checkpointed row `rn`, if present.
    ///
    /// # Errors
    /// [`LogError::Io`] on read failure.
    pub fn eor_at(&self, rn: u64) -> Result<Option<u64>, LogError> {
        let Some(at) = self.index_of(rn) else {
            return Ok(None);
        };
        if at >= self.checkpoint_count()? {
            return Ok(None);
        }
        let mut buf = [0_u8; 8];
        self.eor
            .read_exact_at(&mut buf, EOR_HEADER_LEN.saturating_add(at.saturating_mul(8)))?;
        Ok(Some(u64::from_be_bytes(buf)))
    }

    /// The recorded row-hash of checkpointed row `rn`, if present.
    ///
    /// # Errors
    /// [`LogError::Io`] on read failure.
    pub fn frontier_hash_at(&self, rn: u64) -> Result<Option<LedgerHash>, LogError> {
        let Some(at) = self.index_of(rn) else {
            return Ok(None);
        };
        if at >= self.checkpoint_count()? {
            return Ok(None);
        }
        let mut buf = [0_u8; HASH_WIDTH];
        self.frontiers.read_exact_at(
            &mut buf,
            self.table_offset.saturating_add(at.saturating_mul(TABLE_ALIGN)),
        )?;
        Ok(Some(LedgerHash::new(buf)))
    }

    /// Write the `_{rn}.fstate` snapshot for `frontier`.
    ///
    /// # Errors
    /// [`LogError::Io`] on write failure.
    pub fn save_state(&self, frontier: &HashFrontier) -> Result<(), LogError> {
        let target = self.dir.join(format!("_{}.fstate", frontier.rn()));
        let staged = target.with_extension("tmp");
        let mut file = File::create(&staged)?;
        file.write_all(FSTATE_MAGIC)?;
        file.write_all(&[0, 0])?;
        file.write_all(&frontier.to_bytes())?;
        file.sync_data()?;
        fs::rename(&staged, &target)?;
        Ok(())
    }

    /// The snapshot with the highest row number at or below `max_rn`.
    ///
    /// # Errors
    /// [`LogError::Io`] on directory or file read failure;
    /// [`LogError::InvalidFormat`] if the snapshot payload is malformed.
    pub fn latest_state(&self, max_rn: u64) -> Result<Option<HashFrontier>, LogError> {
        let mut best: Option<(u64, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(rn) = fstate_rn(&path) else {
                continue;
            };
            if rn <= max_rn && best.as_ref().is_none_or(|(top, _)| rn > *top) {
                best = Some((rn, path));
            }
        }
        let Some((_, path)) = best else {
            return Ok(None);
        };
        let bytes = fs::read(&path)?;
        let payload = bytes
            .strip_prefix(FSTATE_MAGIC.as_slice())
            .and_then(|rest| rest.strip_prefix(&[0, 0]))
            .ok_or(LogError::InvalidFormat {
                section: "fstate",
                detail: "bad magic".into(),
            })?;
        Ok(Some(HashFrontier::from_bytes(payload)?))
    }

    /// Drop checkpoints and snapshots past `rn` (rollback support).
    ///
    /// # Errors
    /// [`LogError::Io`] on filesystem failure.
    pub fn truncate_to(&mut self, rn: u64) -> Result<(), LogError> {
        let keep = rn / self.spacing();
        self.frontiers.set_len(
            self.table_offset.saturating_add(keep.saturating_mul(TABLE_ALIGN)),
        )?;
        self.frontiers.sync_data()?;
        self.eor
            .set_len(EOR_HEADER_LEN.saturating_add(keep.saturating_mul(8)))?;
        self.eor.sync_data()?;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if fstate_rn(&path).is_some_and(|state_rn| state_rn > rn) {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TrackDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackDir")
            .field("dir", &self.dir)
            .field("dex", &self.dex)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// The row number encoded in an `_{rn}.fstate` filename, if it is one.
fn fstate_rn(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix('_')?
        .strip_suffix(".fstate")?
        .parse::<u64>()
        .ok()
}
