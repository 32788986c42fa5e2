use crate::error::{PersistenceError, Result};
use crc64fast::Digest;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// One committed batch of rows.
///
/// `min_ts`/`max_ts` act as a zone map so scans can skip whole batches.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub batch_id: u32,
    pub first_row: u32,
    pub row_count: u32,
    pub min_ts: i64,
    pub max_ts: i64,
    /// Length of the string heap after this batch was flushed.
    pub heap_len: u64,
    /// CRC64 over the batch's encoded rows.
    pub rows_checksum: u64,
}

impl BatchMeta {
    pub fn end_row(&self) -> u32 {
        self.first_row + self.row_count
    }

    pub fn overlaps(&self, start: i64, end: i64) -> bool {
        self.row_count > 0 && self.min_ts < end && self.max_ts >= start
    }
}

/// Record header: `[payload_len u32][checksum u64]`, followed by the
/// bincode payload.
const HEADER_SIZE: usize = 4 + 8;

fn checksum(payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

pub struct ManifestWriter {
    file: File,
}

impl ManifestWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, meta: &BatchMeta) -> Result<()> {
        let payload = bincode::serde::encode_to_vec(meta, bincode::config::standard())
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;

        let mut record = Vec::with_capacity(HEADER_SIZE + payload.len());
        record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        record.extend_from_slice(&checksum(&payload).to_le_bytes());
        record.extend_from_slice(&payload);

        self.file.write_all(&record)?;
        self.file.flush()?;
        Ok(())
    }
}

/// Reads every batch record, verifying each checksum. A torn trailing record
/// ends the manifest.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<BatchMeta>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut batches = Vec::new();

    loop {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let mut expected = [0u8; 8];
        expected.copy_from_slice(&header[4..12]);
        let expected = u64::from_le_bytes(expected);

        let mut payload = vec![0u8; len];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        let found = checksum(&payload);
        if found != expected {
            return Err(PersistenceError::ChecksumMismatch { expected, found });
        }

        let (meta, _): (BatchMeta, usize) =
            bincode::serde::decode_from_slice(&payload, bincode::config::standard())
                .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        batches.push(meta);
    }

    Ok(batches)
}
