use crate::error::{PersistenceError, Result};
use byteorder::{ByteOrder, LittleEndian};
use memmap2::{Mmap, MmapMut};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes `values` as a flat little-endian u32 file, streaming.
pub fn write_u32_column<I>(path: impl AsRef<Path>, values: I) -> Result<()>
where
    I: IntoIterator<Item = u32>,
{
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Read-only memory-mapped u32 column.
pub struct U32Column {
    map: Option<Mmap>,
    len: usize,
}

impl U32Column {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let bytes = file.metadata()?.len() as usize;
        if bytes % 4 != 0 {
            return Err(PersistenceError::InvalidFormat(format!(
                "u32 column length {} is not a multiple of 4",
                bytes
            )));
        }
        if bytes == 0 {
            return Ok(Self { map: None, len: 0 });
        }
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            map: Some(map),
            len: bytes / 4,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Panics if `index >= len()`.
    #[inline]
    pub fn get(&self, index: usize) -> u32 {
        let map = self.map.as_deref().unwrap_or(&[]);
        LittleEndian::read_u32(&map[index * 4..index * 4 + 4])
    }
}

/// Row-id lists grouped by key id, stored back to back in one file.
///
/// Lists keep the order in which rows were fed to [`PostingIndex::build`];
/// the store feeds rows in time order so each list is time-ordered.
pub struct PostingIndex {
    column: U32Column,
    offsets: Vec<usize>,
}

impl PostingIndex {
    /// Builds the index file in place through a writable map. `counts[k]` must
    /// equal the number of rows `rows` yields for key `k`.
    pub fn build<I>(path: impl AsRef<Path>, counts: &[u32], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        let path = path.as_ref();
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut total = 0usize;
        offsets.push(0);
        for c in counts {
            total += *c as usize;
            offsets.push(total);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((total * 4) as u64)?;

        if total > 0 {
            let mut map = unsafe { MmapMut::map_mut(&file)? };
            let mut cursor: Vec<usize> = offsets[..counts.len()].to_vec();
            for (row, key) in rows {
                let k = key as usize;
                if k >= counts.len() || cursor[k] >= offsets[k + 1] {
                    return Err(PersistenceError::InvalidFormat(format!(
                        "posting key {} exceeds its declared count",
                        key
                    )));
                }
                let at = cursor[k] * 4;
                LittleEndian::write_u32(&mut map[at..at + 4], row);
                cursor[k] += 1;
            }
            if cursor.iter().zip(&offsets[1..]).any(|(c, end)| c != end) {
                return Err(PersistenceError::InvalidFormat(
                    "posting rows fewer than declared counts".to_string(),
                ));
            }
            map.flush()?;
        }

        Ok(Self {
            column: U32Column::open(path)?,
            offsets,
        })
    }

    pub fn key_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// The row list for `key`; empty for unknown keys.
    pub fn list(&self, key: u32) -> PostingList<'_> {
        let k = key as usize;
        if k >= self.key_count() {
            return PostingList {
                column: &self.column,
                start: 0,
                len: 0,
            };
        }
        PostingList {
            column: &self.column,
            start: self.offsets[k],
            len: self.offsets[k + 1] - self.offsets[k],
        }
    }
}

#[derive(Clone, Copy)]
pub struct PostingList<'a> {
    column: &'a U32Column,
    start: usize,
    len: usize,
}

impl<'a> PostingList<'a> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Panics if `i >= len()`.
    #[inline]
    pub fn get(&self, i: usize) -> u32 {
        assert!(i < self.len);
        self.column.get(self.start + i)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        let column = self.column;
        let start = self.start;
        (0..self.len).map(move |i| column.get(start + i))
    }
}
