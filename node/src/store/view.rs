// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Immutable read snapshot of an event store.
//!
//! The writer publishes a fresh view after every committed batch and once
//! more after indexing. Readers hold an `Arc<StoreView>` for the duration of
//! a query and never block the writer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use plcscope_kernel::{LogEntry, SignalType, SignalValue};
use plcscope_persistence::column::{PostingIndex, PostingList, U32Column};
use plcscope_persistence::{BatchMeta, RowRecord, SegmentMaps, ValueTag, NO_ID, NO_SOURCE};

use super::dictionary::Dictionaries;
use super::{StoreError, StoreResult};

pub struct StoreView {
    pub(crate) maps: SegmentMaps,
    pub(crate) dicts: Arc<Dictionaries>,
    pub(crate) batches: Arc<Vec<BatchMeta>>,
    /// Rows were appended in non-decreasing timestamp order.
    pub(crate) in_order: bool,
    pub(crate) time_index: Option<U32Column>,
    pub(crate) signal_index: Option<PostingIndex>,
    pub(crate) device_index: Option<PostingIndex>,
    pub(crate) min_ts: Option<i64>,
    pub(crate) max_ts: Option<i64>,
    pub(crate) finalized: bool,
    /// Bumped on every publish; cached query results carry it.
    pub(crate) generation: u64,
}

/// Row ids in `(timestamp, row)` order.
#[derive(Clone, Copy)]
pub(crate) enum TimeOrder<'a> {
    /// Rows were appended in time order.
    Identity(u32),
    /// Permutation written at finalize.
    Column(&'a U32Column),
    /// Unfinalized out-of-order rows. Each batch is sorted on its own and
    /// batches are merged on the fly.
    Runs(&'a [BatchMeta], u32),
}

/// First position in `[lo, hi)` whose row timestamp is `>= ts`.
pub(crate) fn lower_bound_by(mut lo: usize, mut hi: usize, ts: i64, ts_at: impl Fn(usize) -> i64) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if ts_at(mid) < ts {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Resumable walk over a view in time order. Holds no borrow so it can
/// live next to the `Arc<StoreView>` it reads from.
pub(crate) enum TimeCursor {
    Positions { pos: usize, len: usize, permuted: bool },
    /// `(ts, row, end of the row's batch)`, smallest first.
    Runs(BinaryHeap<Reverse<(i64, u32, u32)>>),
}

impl TimeCursor {
    pub(crate) fn next(&mut self, view: &StoreView) -> Option<u32> {
        match self {
            TimeCursor::Positions { pos, len, permuted } => {
                if *pos >= *len {
                    return None;
                }
                let row = if *permuted {
                    view.time_index.as_ref()?.get(*pos)
                } else {
                    *pos as u32
                };
                *pos += 1;
                Some(row)
            }
            TimeCursor::Runs(heap) => {
                let Reverse((_, row, end)) = heap.pop()?;
                let next = row + 1;
                if next < end {
                    heap.push(Reverse((view.ts(next), next, end)));
                }
                Some(row)
            }
        }
    }

    /// Drops the next `n` rows.
    pub(crate) fn skip(&mut self, view: &StoreView, n: usize) {
        match self {
            TimeCursor::Positions { pos, len, .. } => *pos = pos.saturating_add(n).min(*len),
            TimeCursor::Runs(_) => {
                for _ in 0..n {
                    if self.next(view).is_none() {
                        break;
                    }
                }
            }
        }
    }
}

/// Rows in time order with `ts < until`.
pub(crate) struct TimeIter<'v> {
    view: &'v StoreView,
    cursor: TimeCursor,
    until: Option<i64>,
}

impl Iterator for TimeIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let row = self.cursor.next(self.view)?;
        match self.until {
            Some(until) if self.view.ts(row) >= until => {
                self.cursor = TimeCursor::Positions { pos: 0, len: 0, permuted: false };
                None
            }
            _ => Some(row),
        }
    }
}

impl StoreView {
    pub(crate) fn empty() -> Self {
        Self {
            maps: SegmentMaps::empty(),
            dicts: Arc::new(Dictionaries::default()),
            batches: Arc::new(Vec::new()),
            in_order: true,
            time_index: None,
            signal_index: None,
            device_index: None,
            min_ts: None,
            max_ts: None,
            finalized: false,
            generation: 0,
        }
    }

    pub fn len(&self) -> u32 {
        self.maps.row_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn bounds(&self) -> Option<(i64, i64)> {
        Some((self.min_ts?, self.max_ts?))
    }

    pub fn signal_count(&self) -> usize {
        self.dicts.signal_count()
    }

    pub fn dictionaries(&self) -> &Dictionaries {
        &self.dicts
    }

    pub(crate) fn batches(&self) -> &[BatchMeta] {
        &self.batches
    }

    #[inline]
    pub(crate) fn ts(&self, row: u32) -> i64 {
        self.maps.timestamp(row)
    }

    #[inline]
    pub(crate) fn signal_of(&self, row: u32) -> u32 {
        self.maps.signal(row)
    }

    pub(crate) fn record(&self, row: u32) -> StoreResult<RowRecord> {
        Ok(self.maps.row(row)?)
    }

    pub(crate) fn time_order(&self) -> TimeOrder<'_> {
        if self.in_order {
            return TimeOrder::Identity(self.len());
        }
        match &self.time_index {
            Some(col) => TimeOrder::Column(col),
            None => TimeOrder::Runs(self.batches(), self.len()),
        }
    }

    /// Number of rows with timestamp `< ts`.
    pub(crate) fn count_before(&self, ts: i64) -> usize {
        match self.time_order() {
            TimeOrder::Identity(n) => lower_bound_by(0, n as usize, ts, |p| self.ts(p as u32)),
            TimeOrder::Column(col) => lower_bound_by(0, col.len(), ts, |p| self.ts(col.get(p))),
            TimeOrder::Runs(batches, n) => batches
                .iter()
                .map(|b| {
                    let (first, end) = (b.first_row as usize, (b.end_row().min(n)) as usize);
                    if b.max_ts < ts {
                        end.saturating_sub(first)
                    } else if b.min_ts >= ts {
                        0
                    } else {
                        lower_bound_by(first, end, ts, |r| self.ts(r as u32)) - first
                    }
                })
                .sum(),
        }
    }

    /// Cursor at the first row with timestamp `>= ts`.
    pub(crate) fn cursor_from(&self, ts: i64) -> TimeCursor {
        match self.time_order() {
            TimeOrder::Identity(n) => TimeCursor::Positions {
                pos: self.count_before(ts),
                len: n as usize,
                permuted: false,
            },
            TimeOrder::Column(col) => TimeCursor::Positions {
                pos: self.count_before(ts),
                len: col.len(),
                permuted: true,
            },
            TimeOrder::Runs(batches, n) => {
                let mut heap = BinaryHeap::with_capacity(batches.len());
                for b in batches {
                    let (first, end) = (b.first_row as usize, b.end_row().min(n) as usize);
                    if first >= end || b.max_ts < ts {
                        continue;
                    }
                    let start = lower_bound_by(first, end, ts, |r| self.ts(r as u32)) as u32;
                    if (start as usize) < end {
                        heap.push(Reverse((self.ts(start), start, end as u32)));
                    }
                }
                TimeCursor::Runs(heap)
            }
        }
    }

    /// Cursor at time-order position `pos`.
    pub(crate) fn cursor_at(&self, pos: usize) -> TimeCursor {
        let mut cursor = self.cursor_from(i64::MIN);
        cursor.skip(self, pos);
        cursor
    }

    /// Rows with `start <= ts < end`, in time order.
    pub(crate) fn rows_between(&self, start: i64, end: i64) -> TimeIter<'_> {
        TimeIter {
            view: self,
            cursor: self.cursor_from(start),
            until: Some(end),
        }
    }

    /// Every row in time order.
    pub(crate) fn rows_in_time_order(&self) -> TimeIter<'_> {
        TimeIter {
            view: self,
            cursor: self.cursor_from(i64::MIN),
            until: None,
        }
    }

    /// First position in a time-ordered posting list with timestamp `>= ts`.
    pub(crate) fn posting_lower_bound(&self, list: &PostingList<'_>, ts: i64) -> usize {
        lower_bound_by(0, list.len(), ts, |i| self.ts(list.get(i)))
    }

    pub(crate) fn value_of(&self, record: &RowRecord) -> StoreResult<SignalValue> {
        Ok(match record.tag {
            ValueTag::Boolean => SignalValue::Boolean(record.value != 0),
            ValueTag::Integer => SignalValue::Integer(record.value),
            ValueTag::String => SignalValue::String(self.maps.string(record.value as u64)?.to_string()),
        })
    }

    pub(crate) fn decode_record(&self, record: &RowRecord) -> StoreResult<LogEntry> {
        let signal = self
            .dicts
            .signal(record.signal)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown signal id {}", record.signal)))?;
        let device = self
            .dicts
            .devices
            .name(signal.device)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown device id {}", signal.device)))?;
        let value = self.value_of(record)?;

        let category = match record.category {
            NO_ID => None,
            id => self.dicts.categories.name(id).map(str::to_string),
        };
        let source_id = match record.source {
            NO_SOURCE => None,
            id => self.dicts.sources.name(id as u32).map(str::to_string),
        };

        Ok(LogEntry {
            device_id: device.to_string(),
            signal_name: signal.name.to_string(),
            timestamp: record.timestamp,
            signal_type: value.signal_type(),
            value,
            category,
            source_id,
        })
    }

    pub fn decode(&self, row: u32) -> StoreResult<LogEntry> {
        let record = self.record(row)?;
        self.decode_record(&record)
    }

    pub(crate) fn decode_all(&self, rows: impl IntoIterator<Item = u32>) -> StoreResult<Vec<LogEntry>> {
        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    pub(crate) fn signal_type_of(record: &RowRecord) -> SignalType {
        match record.tag {
            ValueTag::Boolean => SignalType::Boolean,
            ValueTag::Integer => SignalType::Integer,
            ValueTag::String => SignalType::String,
        }
    }
}
