use crate::error::{PersistenceError, Result};
use crate::heap::{self, HeapWriter};
use crate::manifest::{BatchMeta, ManifestWriter};
use crate::row::{RowRecord, ROW_SIZE};
use crc64fast::Digest;
use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

pub const ROWS_FILE: &str = "rows.bin";
pub const HEAP_FILE: &str = "strings.bin";
pub const MANIFEST_FILE: &str = "manifest.bin";
pub const TIME_INDEX_FILE: &str = "time.idx";
pub const SIGNAL_INDEX_FILE: &str = "signal.idx";
pub const DEVICE_INDEX_FILE: &str = "device.idx";

/// Single writer for a session directory. Rows become visible to readers
/// only after [`SegmentWriter::commit`].
pub struct SegmentWriter {
    rows: BufWriter<File>,
    heap: HeapWriter,
    manifest: ManifestWriter,
    committed_rows: u32,
    pending_rows: u32,
    pending_min: i64,
    pending_max: i64,
    digest: Digest,
    next_batch: u32,
}

impl SegmentWriter {
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let rows = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(dir.join(ROWS_FILE))?;
        Ok(Self {
            rows: BufWriter::with_capacity(1 << 20, rows),
            heap: HeapWriter::create(dir.join(HEAP_FILE))?,
            manifest: ManifestWriter::create(dir.join(MANIFEST_FILE))?,
            committed_rows: 0,
            pending_rows: 0,
            pending_min: i64::MAX,
            pending_max: i64::MIN,
            digest: Digest::new(),
            next_batch: 0,
        })
    }

    pub fn committed_rows(&self) -> u32 {
        self.committed_rows
    }

    /// Stores a string value and returns the heap offset to put in a row.
    pub fn push_string(&mut self, value: &str) -> Result<u64> {
        self.heap.append(value)
    }

    pub fn push(&mut self, row: &RowRecord) -> Result<()> {
        let total = self.committed_rows as u64 + self.pending_rows as u64;
        if total >= u32::MAX as u64 {
            return Err(PersistenceError::InvalidFormat("segment row capacity exhausted".to_string()));
        }
        let bytes = row.to_bytes();
        self.rows.write_all(&bytes)?;
        self.digest.write(&bytes);
        self.pending_rows += 1;
        self.pending_min = self.pending_min.min(row.timestamp);
        self.pending_max = self.pending_max.max(row.timestamp);
        Ok(())
    }

    /// Flushes pending rows and strings and records the batch in the
    /// manifest. Returns `None` when nothing was pending.
    pub fn commit(&mut self) -> Result<Option<BatchMeta>> {
        if self.pending_rows == 0 {
            return Ok(None);
        }
        self.rows.flush()?;
        self.heap.flush()?;

        let digest = std::mem::replace(&mut self.digest, Digest::new());
        let meta = BatchMeta {
            batch_id: self.next_batch,
            first_row: self.committed_rows,
            row_count: self.pending_rows,
            min_ts: self.pending_min,
            max_ts: self.pending_max,
            heap_len: self.heap.len(),
            rows_checksum: digest.sum64(),
        };
        self.manifest.append(&meta)?;

        self.next_batch += 1;
        self.committed_rows += self.pending_rows;
        self.pending_rows = 0;
        self.pending_min = i64::MAX;
        self.pending_max = i64::MIN;
        Ok(Some(meta))
    }
}

fn map_file(path: &Path, min_len: u64) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < min_len {
        return Err(PersistenceError::InvalidFormat(format!(
            "{} holds {} bytes, expected at least {}",
            path.display(),
            len,
            min_len
        )));
    }
    if len == 0 {
        return Ok(None);
    }
    Ok(Some(unsafe { Mmap::map(&file)? }))
}

/// Read-only view of the committed prefix of a segment.
pub struct SegmentMaps {
    rows: Option<Mmap>,
    heap: Option<Mmap>,
    row_count: u32,
}

impl SegmentMaps {
    pub fn empty() -> Self {
        Self {
            rows: None,
            heap: None,
            row_count: 0,
        }
    }

    /// Maps `rows.bin` and `strings.bin` of `dir`, exposing the first
    /// `row_count` rows.
    pub fn open(dir: impl AsRef<Path>, row_count: u32, heap_len: u64) -> Result<Self> {
        let dir = dir.as_ref();
        if row_count == 0 {
            return Ok(Self::empty());
        }
        Ok(Self {
            rows: map_file(&dir.join(ROWS_FILE), row_count as u64 * ROW_SIZE as u64)?,
            heap: map_file(&dir.join(HEAP_FILE), heap_len)?,
            row_count,
        })
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    fn row_bytes(&self, row: u32) -> &[u8] {
        let rows = self.rows.as_deref().unwrap_or(&[]);
        let at = row as usize * ROW_SIZE;
        &rows[at..at + ROW_SIZE]
    }

    pub fn row(&self, row: u32) -> Result<RowRecord> {
        if row >= self.row_count {
            return Err(PersistenceError::InvalidFormat(format!(
                "row {} beyond committed count {}",
                row, self.row_count
            )));
        }
        RowRecord::from_bytes(self.row_bytes(row))
    }

    /// Timestamp of a committed row. Panics if `row >= row_count()`.
    #[inline]
    pub fn timestamp(&self, row: u32) -> i64 {
        assert!(row < self.row_count);
        RowRecord::timestamp_of(self.row_bytes(row))
    }

    /// Signal id of a committed row. Panics if `row >= row_count()`.
    #[inline]
    pub fn signal(&self, row: u32) -> u32 {
        assert!(row < self.row_count);
        RowRecord::signal_of(self.row_bytes(row))
    }

    pub fn string(&self, offset: u64) -> Result<&str> {
        heap::read_str(self.heap.as_deref().unwrap_or(&[]), offset)
    }

    /// Recomputes every batch checksum against the mapped rows.
    pub fn verify(&self, batches: &[BatchMeta]) -> Result<()> {
        let rows = self.rows.as_deref().unwrap_or(&[]);
        for batch in batches {
            if batch.end_row() > self.row_count {
                return Err(PersistenceError::InvalidFormat(format!(
                    "batch {} ends past committed rows",
                    batch.batch_id
                )));
            }
            let start = batch.first_row as usize * ROW_SIZE;
            let end = batch.end_row() as usize * ROW_SIZE;
            let mut digest = Digest::new();
            digest.write(&rows[start..end]);
            let found = digest.sum64();
            if found != batch.rows_checksum {
                return Err(PersistenceError::ChecksumMismatch {
                    expected: batch.rows_checksum,
                    found,
                });
            }
        }
        Ok(())
    }
}
