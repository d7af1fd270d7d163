//! The flat-file backend: a 64-byte-per-row skip table plus trail files.
//!
//! The `table` file starts with an 8-byte header (`"sldg"`, a big-endian
//! version, two reserved bytes) followed by one 64-byte record per row: the
//! input-hash then the row-hash, at offset `8 + 64 * (rn - 1)`. Witness
//! records live beside it, one file per row, under `trails/`.

#![allow(
    clippy::indexing_slicing,
    reason = "record and header layouts are fixed-width"
)]

use std::fs::{self, File, OpenOptions};
use std::io::{Read as _, Write as _};
use std::os::unix::fs::FileExt as _;
use std::path::{Path, PathBuf};

use sldg_core::crumtrail::Crumtrail;
use sldg_core::hash::{HASH_WIDTH, LedgerHash};
use tracing::debug;

use crate::backend::StorageBackend;
use crate::error::StoreError;

/// Magic prefix of the skip table file.
const TABLE_MAGIC: [u8; 4] = *b"sldg";
/// Current table layout version.
const TABLE_VERSION: u16 = 1;
/// Header width; also the zero offset of row 1.
const HEADER_LEN: u64 = 8;
/// Bytes per row: input-hash then row-hash.
const ROW_LEN: u64 = 64;
/// Name of the skip table file inside a ledger directory.
const TABLE_FILE: &str = "table";
/// Name of the trail directory inside a ledger directory.
const TRAIL_DIR: &str = "trails";
/// Extension of persisted witness records.
const TRAIL_EXT: &str = "crum";

/// A skip ledger persisted as a flat table file in a directory.
#[derive(Debug)]
pub struct FileBackend {
    table: File,
    trail_dir: PathBuf,
}

impl FileBackend {
    /// Create a fresh ledger directory; fails if a table already exists.
    ///
    /// # Errors
    /// [`StoreError::Io`] on filesystem failure, including a pre-existing
    /// table file.
    pub fn create(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let trail_dir = dir.join(TRAIL_DIR);
        fs::create_dir_all(&trail_dir)?;
        let mut table = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(dir.join(TABLE_FILE))?;
        let mut header = [0_u8; 8];
        header[..4].copy_from_slice(&TABLE_MAGIC);
        header[4..6].copy_from_slice(&TABLE_VERSION.to_be_bytes());
        table.write_all(&header)?;
        table.sync_data()?;
        debug!(dir = %dir.display(), "created ledger table");
        Ok(Self { table, trail_dir })
    }

    /// Open an existing ledger directory.
    ///
    /// # Errors
    /// [`StoreError::Io`] on filesystem failure;
    /// [`StoreError::InvalidFormat`] on a bad magic, an unknown version, or
    /// a table length that is not header plus a whole number of rows.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let mut table = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.join(TABLE_FILE))?;
        let mut header = [0_u8; 8];
        table.read_exact(&mut header)?;
        if header[..4] != TABLE_MAGIC {
            return Err(StoreError::InvalidFormat {
                section: "table header",
                detail: "bad magic".into(),
            });
        }
        let version = u16::from_be_bytes([header[4], header[5]]);
        if version != TABLE_VERSION {
            return Err(StoreError::InvalidFormat {
                section: "table header",
                detail: format!("unknown version {version}"),
            });
        }
        let backend = Self {
            table,
            trail_dir: dir.join(TRAIL_DIR),
        };
        // Validates alignment as a side effect.
        let size = backend.size()?;
        debug!(dir = %dir.display(), size, "opened ledger table");
        Ok(backend)
    }

    fn row_offset(rn: u64) -> Result<u64, StoreError> {
        rn.checked_sub(1)
            .and_then(|at| at.checked_mul(ROW_LEN))
            .and_then(|off| off.checked_add(HEADER_LEN))
            .ok_or(StoreError::InvalidFormat {
                section: "table",
                detail: format!("row {rn} overflows the table offset space"),
            })
    }

    fn read_record(&self, rn: u64) -> Result<[u8; 64], StoreError> {
        if rn == 0 || rn > self.size()? {
            return Err(StoreError::missing_row(rn));
        }
        let mut record = [0_u8; 64];
        self.table.read_exact_at(&mut record, Self::row_offset(rn)?)?;
        Ok(record)
    }

    fn trail_path(&self, rn: u64) -> PathBuf {
        self.trail_dir.join(format!("{rn:020}.{TRAIL_EXT}"))
    }
}

impl StorageBackend for FileBackend {
    fn size(&self) -> Result<u64, StoreError> {
        let len = self.table.metadata()?.len();
        let body = len
            .checked_sub(HEADER_LEN)
            .ok_or(StoreError::InvalidFormat {
                section: "table",
                detail: format!("table of {len} bytes is shorter than its header"),
            })?;
        if body % ROW_LEN != 0 {
            return Err(StoreError::InvalidFormat {
                section: "table",
                detail: format!("table body of {body} bytes is not row-aligned"),
            });
        }
        Ok(body / ROW_LEN)
    }

    fn commit(
        &mut self,
        rn: u64,
        input_hash: LedgerHash,
        row_hash: LedgerHash,
    ) -> Result<(), StoreError> {
        let expected = Self::row_offset(rn)?;
        let actual = self.table.metadata()?.len();
        if actual != expected {
            return Err(StoreError::OffsetConflict {
                rn,
                expected,
                actual,
            });
        }
        let mut record = [0_u8; 64];
        record[..HASH_WIDTH].copy_from_slice(input_hash.as_ref());
        record[HASH_WIDTH..].copy_from_slice(row_hash.as_ref());
        self.table.write_all_at(&record, expected)?;
        self.table.sync_data()?;
        Ok(())
    }

    fn read_input_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        let record = self.read_record(rn)?;
        let bytes: [u8; HASH_WIDTH] = record[..HASH_WIDTH]
            .try_into()
            .unwrap_or_else(|_| unreachable!("records are 64 bytes"));
        Ok(LedgerHash::new(bytes))
    }

    fn read_row_hash(&self, rn: u64) -> Result<LedgerHash, StoreError> {
        if rn == 0 {
            return Ok(LedgerHash::SENTINEL);
        }
        let record = self.read_record(rn)?;
        let bytes: [u8; HASH_WIDTH] = record[HASH_WIDTH..]
            .try_into()
            .unwrap_or_else(|_| unreachable!("records are 64 bytes"));
        Ok(LedgerHash::new(bytes))
    }

    fn truncate_to(&mut self, new_size: u64) -> Result<(), StoreError> {
        let size = self.size()?;
        if new_size >= size {
            return Ok(());
        }
        let len = Self::row_offset(new_size.saturating_add(1))?;
        self.table.set_len(len)?;
        self.table.sync_data()?;
        for rn in self.list_trail_rns()? {
            if rn > new_size {
                fs::remove_file(self.trail_path(rn))?;
            }
        }
        debug!(new_size, "truncated ledger table");
        Ok(())
    }

    fn put_trail(&mut self, rn: u64, trail: &Crumtrail) -> Result<(), StoreError> {
        let target = self.trail_path(rn);
        let staged = target.with_extension("tmp");
        let mut file = File::create(&staged)?;
        file.write_all(&trail.to_bytes())?;
        file.sync_data()?;
        fs::rename(&staged, &target)?;
        Ok(())
    }

    fn get_trail(&self, rn: u64) -> Result<Option<Crumtrail>, StoreError> {
        let path = self.trail_path(rn);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(Crumtrail::from_bytes(&bytes)?))
    }

    fn list_trail_rns(&self) -> Result<Vec<u64>, StoreError> {
        let mut rns = Vec::new();
        for entry in fs::read_dir(&self.trail_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TRAIL_EXT) {
                continue;
            }
            if let Some(rn) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            {
                rns.push(rn);
            }
        }
        rns.sort_unstable();
        Ok(rns)
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::indexing_slicing,
        reason = "test records have fixed layouts"
    )]

    use test_utils::h32;

    use super::*;

    #[test]
    fn create_open_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = FileBackend::create(dir.path()).expect("create");
        backend.commit(1, h32!(1), h32!(11)).expect("row 1");
        backend.commit(2, h32!(2), h32!(22)).expect("row 2");
        drop(backend);

        let backend = FileBackend::open(dir.path()).expect("reopen");
        assert_eq!(backend.size().expect("size"), 2);
        assert_eq!(backend.read_input_hash(2).expect("h_in"), h32!(2));
        assert_eq!(backend.read_row_hash(1).expect("H"), h32!(11));
        assert_eq!(
            backend.read_row_hash(0).expect("sentinel"),
            LedgerHash::SENTINEL
        );
        assert!(backend.read_row_hash(3).is_err());
    }

    #[test]
    fn create_refuses_to_clobber() {
        let dir = tempfile::tempdir().expect("tempdir");
        FileBackend::create(dir.path()).expect("create");
        assert!(matches!(
            FileBackend::create(dir.path()),
            Err(StoreError::Io(_))
        ));
    }

    #[test]
    fn open_rejects_foreign_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join(TRAIL_DIR)).expect("trail dir");
        fs::write(dir.path().join(TABLE_FILE), b"not a table").expect("write");
        assert!(matches!(
            FileBackend::open(dir.path()),
            Err(StoreError::InvalidFormat { section: "table header", .. })
        ));
    }

    #[test]
    fn misaligned_table_is_detected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = FileBackend::create(dir.path()).expect("create");
        backend.commit(1, h32!(1), h32!(11)).expect("row 1");
        drop(backend);
        let path = dir.path().join(TABLE_FILE);
        let mut bytes = fs::read(&path).expect("read");
        bytes.push(0);
        fs::write(&path, &bytes).expect("write");
        assert!(matches!(
            FileBackend::open(dir.path()),
            Err(StoreError::InvalidFormat { section: "table", .. })
        ));
    }

    #[test]
    fn commit_offset_conflicts_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = FileBackend::create(dir.path()).expect("create");
        backend.commit(1, h32!(1), h32!(11)).expect("row 1");
        let err = backend.commit(3, h32!(3), h32!(33)).expect_err("gap");
        assert!(matches!(
            err,
            StoreError::OffsetConflict { rn: 3, expected: 136, actual: 72 }
        ));
    }

    #[test]
    fn trails_persist_and_truncate() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut backend = FileBackend::create(dir.path()).expect("create");
        for rn in 1..=4_u64 {
            backend
                .commit(rn, h32!(u8::try_from(rn).expect("small")), h32!(0xB0))
                .expect("commit");
        }
        let trail = Crumtrail::new(h32!(0xB0), Vec::new(), h32!(0xB0), 9, "crums://x".into())
            .expect("trail");
        backend.put_trail(2, &trail).expect("trail 2");
        backend.put_trail(4, &trail).expect("trail 4");
        assert_eq!(backend.list_trail_rns().expect("rns"), vec![2, 4]);
        assert_eq!(backend.get_trail(2).expect("read").as_ref(), Some(&trail));
        assert_eq!(backend.get_trail(3).expect("read"), None);

        backend.truncate_to(2).expect("truncate");
        assert_eq!(backend.size().expect("size"), 2);
        assert_eq!(backend.list_trail_rns().expect("rns"), vec![2]);
        // Truncating at or past the size is a no-op.
        backend.truncate_to(7).expect("no-op");
        assert_eq!(backend.size().expect("size"), 2);
    }
}
