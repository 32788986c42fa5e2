// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Disk-backed event store for one session.
//!
//! Entries are appended in batches by a single writer into a columnar row
//! file under the session directory; each committed batch publishes a new
//! immutable [`StoreView`] that queries read without locking the writer.
//! [`EventStore::finalize`] builds the time-order permutation (when rows
//! arrived out of order) and the per-signal and per-device posting indexes.
//! Until then queries fall back to scans.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use plcscope_kernel::{LogEntry, SignalValue};
use plcscope_persistence::column::{write_u32_column, PostingIndex, U32Column};
use plcscope_persistence::segment::{DEVICE_INDEX_FILE, SIGNAL_INDEX_FILE, TIME_INDEX_FILE};
use plcscope_persistence::{
    BatchMeta, PersistenceError, RowRecord, SegmentMaps, SegmentWriter, ValueTag, NO_ID, NO_SOURCE,
};
use thiserror::Error;

pub mod dictionary;
pub mod view;
pub mod filter;
pub mod cache;
pub mod query;

use cache::{CacheKey, QueryCache};
use dictionary::Dictionaries;
use filter::{EntryFilter, SortColumn, SortDirection, SortSpec};
use query::asc_window;
pub use query::{ChunkBoundaries, EntryPage, TimeBucket};
use view::TimeCursor;
pub use view::StoreView;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("store is closed")]
    Closed,
    #[error("store is sealed; no further appends")]
    Sealed,
    #[error("corrupt store: {0}")]
    Corrupt(String),
    #[error("{0}")]
    InvalidFilter(String),
    #[error("capacity exceeded: {0}")]
    Capacity(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug)]
pub struct StoreConfig {
    pub cache_ids: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { cache_ids: 4_000_000 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entry_count: u64,
    pub signal_count: u64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub finalized: bool,
}

struct WriterState {
    segment: SegmentWriter,
    dicts: Dictionaries,
    shared_dicts: Arc<Dictionaries>,
    dicts_dirty: bool,
    batches: Vec<BatchMeta>,
    signal_counts: Vec<u32>,
    in_order: bool,
    last_ts: i64,
    min_ts: Option<i64>,
    max_ts: Option<i64>,
    generation: u64,
    scratch: String,
}

impl WriterState {
    fn push_entry(&mut self, entry: &LogEntry) -> StoreResult<()> {
        let (signal, changed) =
            self.dicts
                .signal_id(&entry.device_id, &entry.signal_name, entry.value.signal_type(), &mut self.scratch);
        self.dicts_dirty |= changed;

        let category = match entry.category.as_deref() {
            Some(name) if !name.is_empty() => {
                let (id, added) = self.dicts.categories.intern(name);
                self.dicts_dirty |= added;
                id
            }
            _ => NO_ID,
        };

        let source = match entry.source_id.as_deref() {
            Some(name) => {
                let (id, added) = self.dicts.sources.intern(name);
                self.dicts_dirty |= added;
                u16::try_from(id)
                    .ok()
                    .filter(|id| *id != NO_SOURCE)
                    .ok_or_else(|| StoreError::Capacity("too many merge sources".to_string()))?
            }
            None => NO_SOURCE,
        };

        let (tag, value) = match &entry.value {
            SignalValue::Boolean(b) => (ValueTag::Boolean, *b as i64),
            SignalValue::Integer(i) => (ValueTag::Integer, *i),
            SignalValue::String(s) => (ValueTag::String, self.segment.push_string(s)? as i64),
        };

        self.segment.push(&RowRecord {
            timestamp: entry.timestamp,
            signal,
            category,
            source,
            tag,
            value,
        })?;

        let idx = signal as usize;
        if idx >= self.signal_counts.len() {
            self.signal_counts.resize(idx + 1, 0);
        }
        self.signal_counts[idx] += 1;

        if self.min_ts.is_some() && entry.timestamp < self.last_ts {
            self.in_order = false;
        }
        self.last_ts = self.last_ts.max(entry.timestamp);
        self.min_ts = Some(self.min_ts.map_or(entry.timestamp, |m| m.min(entry.timestamp)));
        self.max_ts = Some(self.max_ts.map_or(entry.timestamp, |m| m.max(entry.timestamp)));
        Ok(())
    }

    fn heap_len(&self) -> u64 {
        self.batches.last().map(|b| b.heap_len).unwrap_or(0)
    }

    fn publish(&mut self, dir: &Path) -> StoreResult<StoreView> {
        if self.dicts_dirty {
            self.shared_dicts = Arc::new(self.dicts.clone());
            self.dicts_dirty = false;
        }
        self.generation += 1;
        let mut view = StoreView::empty();
        view.maps = SegmentMaps::open(dir, self.segment.committed_rows(), self.heap_len())?;
        view.dicts = self.shared_dicts.clone();
        view.batches = Arc::new(self.batches.clone());
        view.in_order = self.in_order;
        view.min_ts = self.min_ts;
        view.max_ts = self.max_ts;
        view.generation = self.generation;
        Ok(view)
    }
}

pub struct EventStore {
    dir: PathBuf,
    writer: Mutex<Option<WriterState>>,
    view: ArcSwap<StoreView>,
    cache: QueryCache,
    closed: AtomicBool,
}

impl EventStore {
    /// Creates an empty store in `dir` (created if missing).
    pub fn create(dir: impl Into<PathBuf>, config: StoreConfig) -> StoreResult<Self> {
        let dir = dir.into();
        let segment = SegmentWriter::create(&dir)?;
        let dicts = Dictionaries::default();
        Ok(Self {
            writer: Mutex::new(Some(WriterState {
                segment,
                shared_dicts: Arc::new(dicts.clone()),
                dicts,
                dicts_dirty: false,
                batches: Vec::new(),
                signal_counts: Vec::new(),
                in_order: true,
                last_ts: i64::MIN,
                min_ts: None,
                max_ts: None,
                generation: 0,
                scratch: String::new(),
            })),
            dir,
            view: ArcSwap::from_pointee(StoreView::empty()),
            cache: QueryCache::new(config.cache_ids),
            closed: AtomicBool::new(false),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Current read snapshot.
    pub fn snapshot(&self) -> StoreResult<Arc<StoreView>> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(self.view.load_full())
    }

    /// Appends one batch and makes it visible to readers. Rows of a batch are
    /// stored in timestamp order, ties in input order. A batch that fails
    /// part-way is discarded and seals the store at the last commit.
    pub fn append(&self, entries: &[LogEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(StoreError::Sealed)?;

        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| entries[i].timestamp);
        let committed = order
            .into_iter()
            .try_for_each(|i| writer.push_entry(&entries[i]))
            .and_then(|()| Ok(writer.segment.commit()?));
        match committed {
            Ok(meta) => {
                writer.batches.extend(meta);
                let view = writer.publish(&self.dir)?;
                self.view.store(Arc::new(view));
                Ok(())
            }
            Err(e) => {
                // Uncommitted rows must never reach a later batch.
                guard.take();
                Err(e)
            }
        }
    }

    /// Builds indexes over every committed row and seals the store.
    /// Calling it again is a no-op.
    pub fn finalize(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        let mut guard = self.writer.lock();
        let Some(mut writer) = guard.take() else {
            return Ok(());
        };

        let mut view = writer.publish(&self.dir)?;

        if !view.in_order {
            let path = self.dir.join(TIME_INDEX_FILE);
            write_u32_column(&path, view.rows_in_time_order())?;
            view.time_index = Some(U32Column::open(&path)?);
        }

        let dicts = view.dicts.clone();
        let mut signal_counts = std::mem::take(&mut writer.signal_counts);
        signal_counts.resize(dicts.signal_count(), 0);
        let mut device_counts = vec![0u32; dicts.devices.len()];
        for (info, count) in dicts.signals().iter().zip(&signal_counts) {
            device_counts[info.device as usize] += *count;
        }

        let signal_index = PostingIndex::build(
            self.dir.join(SIGNAL_INDEX_FILE),
            &signal_counts,
            view.rows_in_time_order().map(|row| (row, view.signal_of(row))),
        )?;
        let device_of = |row: u32| dicts.signal(view.signal_of(row)).map(|s| s.device).unwrap_or(u32::MAX);
        let device_index = PostingIndex::build(
            self.dir.join(DEVICE_INDEX_FILE),
            &device_counts,
            view.rows_in_time_order().map(|row| (row, device_of(row))),
        )?;

        view.signal_index = Some(signal_index);
        view.device_index = Some(device_index);
        view.finalized = true;

        tracing::debug!(
            dir = %self.dir.display(),
            rows = view.len(),
            signals = dicts.signal_count(),
            in_order = view.in_order,
            "event store finalized"
        );
        self.view.store(Arc::new(view));
        Ok(())
    }

    /// Closes the store and removes its directory. Readers still holding a
    /// snapshot keep their mappings until they drop it. Idempotent.
    pub fn destroy(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.writer.lock().take();
        self.view.store(Arc::new(StoreView::empty()));
        self.cache.clear();
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn stats(&self) -> StoreStats {
        let view = self.view.load();
        StoreStats {
            entry_count: view.len() as u64,
            signal_count: view.signal_count() as u64,
            start_time: view.min_ts,
            end_time: view.max_ts,
            finalized: view.finalized,
        }
    }

    /// Re-checks batch checksums of every committed row.
    pub fn verify(&self) -> StoreResult<()> {
        let view = self.snapshot()?;
        view.maps.verify(view.batches())?;
        Ok(())
    }

    /// All committed entries in time order.
    pub fn scan(&self) -> StoreResult<StoreScan> {
        let view = self.snapshot()?;
        let cursor = view.cursor_from(i64::MIN);
        let remaining = view.len() as usize;
        Ok(StoreScan { view, cursor, remaining })
    }

    pub fn range(&self, start: i64, end: i64, signals: Option<&[String]>) -> StoreResult<Vec<LogEntry>> {
        self.snapshot()?.range(start, end, signals)
    }

    pub fn boundaries(&self, start: i64, end: i64, signals: &[String]) -> StoreResult<ChunkBoundaries> {
        self.snapshot()?.boundaries(start, end, signals)
    }

    pub fn values_at(&self, ts: i64, signals: Option<&[String]>) -> StoreResult<Vec<LogEntry>> {
        self.snapshot()?.values_at(ts, signals)
    }

    pub fn signal_keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.snapshot()?.signal_keys())
    }

    pub fn signal_types(&self) -> StoreResult<std::collections::BTreeMap<String, plcscope_kernel::SignalType>> {
        Ok(self.snapshot()?.signal_types())
    }

    pub fn categories(&self) -> StoreResult<Vec<String>> {
        Ok(self.snapshot()?.categories())
    }

    /// One page of the filtered, sorted table. `total` counts filtered rows.
    pub fn page(&self, filter: EntryFilter, sort: SortSpec, offset: u64, limit: u64) -> StoreResult<EntryPage> {
        let view = self.snapshot()?;
        let filter = filter.normalized();

        if filter.is_empty() && sort.column == SortColumn::Timestamp {
            let total = view.len() as u64;
            let (from, to) = asc_window(sort.direction, total, offset, limit);
            let mut cursor = view.cursor_at(from as usize);
            let mut rows = Vec::with_capacity((to - from) as usize);
            while (rows.len() as u64) < to - from {
                match cursor.next(&view) {
                    Some(row) => rows.push(row),
                    None => break,
                }
            }
            if sort.direction == SortDirection::Desc {
                rows.reverse();
            }
            return Ok(EntryPage {
                entries: view.decode_all(rows)?,
                total,
            });
        }

        let key = CacheKey { filter, sort };
        if let Some(ids) = self.cache.get(view.generation, &key) {
            let total = ids.len() as u64;
            let from = offset.min(total) as usize;
            let to = offset.saturating_add(limit).min(total) as usize;
            return Ok(EntryPage {
                entries: view.decode_all(ids[from..to].iter().copied())?,
                total,
            });
        }

        let window = view.sorted_window(&key.filter, sort, offset, limit, self.cache.capacity_ids())?;
        if let Some(ids) = window.complete {
            self.cache.insert(view.generation, key, Arc::new(ids));
        }
        Ok(EntryPage {
            entries: view.decode_all(window.rows)?,
            total: window.total,
        })
    }

    /// Populated minute buckets, optionally restricted by `filter`.
    pub fn time_tree(&self, filter: EntryFilter) -> StoreResult<Vec<TimeBucket>> {
        let view = self.snapshot()?;
        let filter = filter.normalized();
        if filter.is_empty() {
            return Ok(view.time_tree_unfiltered());
        }
        let key = CacheKey {
            filter,
            sort: SortSpec::default(),
        };
        match self.cache.get(view.generation, &key) {
            Some(ids) => Ok(view.time_tree_of(&ids)),
            None => view.time_tree_filtered(&key.filter),
        }
    }

    /// Position of the first row at (ascending) or before (descending) `ts`
    /// within the filtered, sorted table.
    pub fn index_by_time(&self, filter: EntryFilter, sort: SortSpec, ts: i64) -> StoreResult<Option<u64>> {
        let view = self.snapshot()?;
        let filter = filter.normalized();

        if filter.is_empty() && sort.column == SortColumn::Timestamp {
            let len = view.len() as usize;
            return Ok(match sort.direction {
                SortDirection::Asc => {
                    let pos = view.count_before(ts);
                    (pos < len).then_some(pos as u64)
                }
                SortDirection::Desc => {
                    let hi = view.count_before(ts.saturating_add(1));
                    (hi > 0).then(|| (len - hi) as u64)
                }
            });
        }

        let key = CacheKey { filter, sort };
        let Some(ids) = self.cache.get(view.generation, &key) else {
            return view.position_of_time(&key.filter, sort, ts);
        };
        let pos = match (sort.column, sort.direction) {
            (SortColumn::Timestamp, SortDirection::Asc) => ids.partition_point(|&r| view.ts(r) < ts),
            (SortColumn::Timestamp, SortDirection::Desc) => ids.partition_point(|&r| view.ts(r) > ts),
            _ => ids.iter().position(|&r| view.ts(r) >= ts).unwrap_or(ids.len()),
        };
        Ok((pos < ids.len()).then_some(pos as u64))
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove event store directory");
        }
    }
}

/// Time-ordered iterator over a store snapshot.
pub struct StoreScan {
    view: Arc<StoreView>,
    cursor: TimeCursor,
    remaining: usize,
}

impl Iterator for StoreScan {
    type Item = StoreResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.cursor.next(&self.view)?;
        self.remaining = self.remaining.saturating_sub(1);
        Some(self.view.decode(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests;
