//! On-disk layout of one session's event store.
//!
//! A session directory holds fixed-width row records (`rows.bin`), a string
//! value heap (`strings.bin`), a checksummed batch manifest (`manifest.bin`)
//! and, once ingestion finishes, u32 index columns (`time.idx`, `signal.idx`,
//! `device.idx`). Everything is written append-only by a single writer and
//! read through memory maps.

pub mod error;
pub mod row;
pub mod heap;
pub mod manifest;
pub mod column;
pub mod segment;

pub use error::{PersistenceError, Result};
pub use manifest::BatchMeta;
pub use row::{RowRecord, ValueTag, NO_ID, NO_SOURCE, ROW_SIZE};
pub use segment::{SegmentMaps, SegmentWriter};
