use crate::error::{PersistenceError, Result};
use byteorder::{ByteOrder, LittleEndian};
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Distinct values remembered for reuse before the table is reset.
const DEDUP_CAPACITY: usize = 65_536;

/// Longer values are written every time they occur.
const DEDUP_MAX_LEN: usize = 64;

/// Append-only `[len u32][utf8 bytes]` string heap.
///
/// Short repeated values (`AUTO`, `IDLE`, carrier locations) share one
/// entry; the table is bounded and simply cleared when full.
pub struct HeapWriter {
    file: BufWriter<File>,
    len: u64,
    recent: FxHashMap<String, u64>,
}

impl HeapWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: BufWriter::new(file),
            len: 0,
            recent: FxHashMap::default(),
        })
    }

    /// Bytes written so far, including unflushed ones.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends `value` (or reuses an identical recent one) and returns its
    /// offset.
    pub fn append(&mut self, value: &str) -> Result<u64> {
        if value.len() <= DEDUP_MAX_LEN {
            if let Some(&offset) = self.recent.get(value) {
                return Ok(offset);
            }
        }

        let bytes = value.as_bytes();
        let len = u32::try_from(bytes.len())
            .map_err(|_| PersistenceError::InvalidFormat("string value exceeds 4GiB".to_string()))?;
        let offset = self.len;
        self.file.write_all(&len.to_le_bytes())?;
        self.file.write_all(bytes)?;
        self.len += 4 + bytes.len() as u64;

        if value.len() <= DEDUP_MAX_LEN {
            if self.recent.len() >= DEDUP_CAPACITY {
                self.recent.clear();
            }
            self.recent.insert(value.to_string(), offset);
        }
        Ok(offset)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}

/// Reads the string stored at `offset` of a mapped heap.
pub fn read_str(heap: &[u8], offset: u64) -> Result<&str> {
    let start = usize::try_from(offset)
        .map_err(|_| PersistenceError::InvalidFormat(format!("heap offset {} out of range", offset)))?;
    let header_end = start
        .checked_add(4)
        .filter(|end| *end <= heap.len())
        .ok_or_else(|| PersistenceError::InvalidFormat(format!("heap offset {} out of range", offset)))?;
    let len = LittleEndian::read_u32(&heap[start..header_end]) as usize;
    let end = header_end
        .checked_add(len)
        .filter(|end| *end <= heap.len())
        .ok_or_else(|| PersistenceError::InvalidFormat(format!("heap entry at {} is truncated", offset)))?;
    std::str::from_utf8(&heap[header_end..end])
        .map_err(|e| PersistenceError::InvalidFormat(format!("invalid UTF-8 in heap entry: {}", e)))
}
