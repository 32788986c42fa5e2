// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Read paths over a [`StoreView`].
//!
//! Finalized views answer signal-restricted queries from the posting
//! indexes; views still being written fall back to scans that skip whole
//! batches by their timestamp bounds.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use chrono::{DateTime, Timelike, Utc};
use plcscope_kernel::{LogEntry, SignalType};
use plcscope_persistence::column::PostingList;
use plcscope_persistence::NO_ID;
use rustc_hash::FxHashMap;
use serde::Serialize;

use super::filter::{CompiledFilter, EntryFilter, SortColumn, SortDirection, SortSpec};
use super::view::{lower_bound_by, StoreView};
use super::StoreResult;

const MINUTE_MS: i64 = 60_000;

/// Last entry before and first entry after a chunk, per signal key.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ChunkBoundaries {
    pub before: BTreeMap<String, LogEntry>,
    pub after: BTreeMap<String, LogEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EntryPage {
    pub entries: Vec<LogEntry>,
    pub total: u64,
}

/// One populated minute of the time tree. `ts` is the earliest entry
/// timestamp inside that minute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimeBucket {
    pub date: String,
    pub hour: u32,
    pub minute: u32,
    pub ts: i64,
}

impl TimeBucket {
    /// Bucket for the first (earliest) entry seen in a minute.
    fn of(ts: i64) -> Option<Self> {
        let at = DateTime::<Utc>::from_timestamp_millis(ts.div_euclid(MINUTE_MS) * MINUTE_MS)?;
        Some(Self {
            date: at.format("%Y-%m-%d").to_string(),
            hour: at.hour(),
            minute: at.minute(),
            ts,
        })
    }
}

impl StoreView {
    /// Known signal ids for `keys`, in key order, without duplicates.
    fn resolve_signals(&self, keys: &[String]) -> Vec<u32> {
        let mut ids: Vec<u32> = keys.iter().filter_map(|k| self.dicts.signal_by_key(k)).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn signal_mask(&self, ids: &[u32]) -> Vec<bool> {
        let mut mask = vec![false; self.signal_count()];
        for &id in ids {
            mask[id as usize] = true;
        }
        mask
    }

    fn all_signal_ids(&self) -> Vec<u32> {
        (0..self.signal_count() as u32).collect()
    }

    /// Entries with `start <= ts < end`, in time order. `None` selects every
    /// signal; unknown keys are ignored.
    pub fn range(&self, start: i64, end: i64, signals: Option<&[String]>) -> StoreResult<Vec<LogEntry>> {
        if start >= end || self.is_empty() {
            return Ok(Vec::new());
        }
        let Some(keys) = signals else {
            return self.decode_all(self.rows_between(start, end));
        };

        let ids = self.resolve_signals(keys);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(index) = &self.signal_index {
            let mut rows: Vec<(i64, u32)> = Vec::new();
            for id in ids {
                let list = index.list(id);
                let lo = self.posting_lower_bound(&list, start);
                let hi = lower_bound_by(lo, list.len(), end, |i| self.ts(list.get(i)));
                rows.extend((lo..hi).map(|i| {
                    let row = list.get(i);
                    (self.ts(row), row)
                }));
            }
            rows.sort_unstable();
            return self.decode_all(rows.into_iter().map(|(_, row)| row));
        }

        let mask = self.signal_mask(&ids);
        self.decode_all(self.rows_between(start, end).filter(|&row| mask[self.signal_of(row) as usize]))
    }

    /// For each requested signal, the latest entry with `ts < start` and the
    /// earliest with `ts >= end`. Signals without such an entry are absent.
    pub fn boundaries(&self, start: i64, end: i64, keys: &[String]) -> StoreResult<ChunkBoundaries> {
        let mut out = ChunkBoundaries::default();
        let ids = self.resolve_signals(keys);
        if ids.is_empty() || self.is_empty() {
            return Ok(out);
        }

        if let Some(index) = &self.signal_index {
            for id in ids {
                let list = index.list(id);
                let key = self.signal_key(id);
                let before = self.posting_lower_bound(&list, start);
                if before > 0 {
                    out.before.insert(key.clone(), self.decode(list.get(before - 1))?);
                }
                let after = self.posting_lower_bound(&list, end);
                if after < list.len() {
                    out.after.insert(key, self.decode(list.get(after))?);
                }
            }
            return Ok(out);
        }

        let mask = self.signal_mask(&ids);
        let mut before: FxHashMap<u32, (i64, u32)> = FxHashMap::default();
        let mut after: FxHashMap<u32, (i64, u32)> = FxHashMap::default();
        for batch in self.batches() {
            if batch.min_ts >= start && batch.max_ts < end {
                continue;
            }
            for row in batch.first_row..batch.end_row().min(self.len()) {
                let signal = self.signal_of(row);
                if !mask[signal as usize] {
                    continue;
                }
                let ts = self.ts(row);
                if ts < start {
                    let best = before.entry(signal).or_insert((ts, row));
                    *best = (*best).max((ts, row));
                } else if ts >= end {
                    let best = after.entry(signal).or_insert((ts, row));
                    *best = (*best).min((ts, row));
                }
            }
        }
        for (signal, (_, row)) in before {
            out.before.insert(self.signal_key(signal), self.decode(row)?);
        }
        for (signal, (_, row)) in after {
            out.after.insert(self.signal_key(signal), self.decode(row)?);
        }
        Ok(out)
    }

    /// Latest entry at or before `ts` for each signal, ordered by key.
    pub fn values_at(&self, ts: i64, signals: Option<&[String]>) -> StoreResult<Vec<LogEntry>> {
        let ids = match signals {
            Some(keys) => self.resolve_signals(keys),
            None => self.all_signal_ids(),
        };
        if ids.is_empty() || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut latest: Vec<(String, u32)> = Vec::with_capacity(ids.len());
        if let Some(index) = &self.signal_index {
            for id in ids {
                let list = index.list(id);
                let pos = self.posting_lower_bound(&list, ts.saturating_add(1));
                if pos > 0 {
                    latest.push((self.signal_key(id), list.get(pos - 1)));
                }
            }
        } else {
            let mask = self.signal_mask(&ids);
            let mut best: FxHashMap<u32, (i64, u32)> = FxHashMap::default();
            for batch in self.batches().iter().filter(|b| b.min_ts <= ts) {
                for row in batch.first_row..batch.end_row().min(self.len()) {
                    let signal = self.signal_of(row);
                    let row_ts = self.ts(row);
                    if !mask[signal as usize] || row_ts > ts {
                        continue;
                    }
                    let slot = best.entry(signal).or_insert((row_ts, row));
                    *slot = (*slot).max((row_ts, row));
                }
            }
            latest.extend(best.into_iter().map(|(signal, (_, row))| (self.signal_key(signal), row)));
        }

        latest.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        self.decode_all(latest.into_iter().map(|(_, row)| row))
    }

    fn signal_key(&self, id: u32) -> String {
        self.dicts.signal(id).map(|s| s.key.to_string()).unwrap_or_default()
    }

    /// Every `device::signal` key, sorted.
    pub fn signal_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.dicts.signals().iter().map(|s| s.key.to_string()).collect();
        keys.sort_unstable();
        keys
    }

    /// Type of the latest stored value per signal key.
    pub fn signal_types(&self) -> BTreeMap<String, SignalType> {
        self.dicts
            .signals()
            .iter()
            .map(|s| (s.key.to_string(), s.latest_type))
            .collect()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dicts.categories.names().map(str::to_string).collect();
        names.sort_unstable();
        names
    }

    /// Candidate rows in time order, narrowed by the posting indexes when
    /// the filter pins signals or a device.
    fn candidates(&self, filter: &EntryFilter) -> Box<dyn Iterator<Item = u32> + '_> {
        if let Some(index) = &self.signal_index {
            if !filter.signals.is_empty() {
                let lists = self.resolve_signals(&filter.signals).into_iter().map(|id| index.list(id));
                return Box::new(PostingMerge::new(self, lists));
            }
        }
        if let (Some(index), Some(device)) = (&self.device_index, filter.device_id.as_deref()) {
            return match self.dicts.devices.id_of(device) {
                Some(id) => Box::new(index.list(id).iter()),
                None => Box::new(std::iter::empty()),
            };
        }
        Box::new(self.rows_in_time_order())
    }

    /// Calls `f` with every row passing `filter`, in time order.
    pub(crate) fn for_each_match(
        &self,
        filter: &EntryFilter,
        mut f: impl FnMut(u32) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let compiled = CompiledFilter::compile(self, filter)?;
        if compiled.matches_nothing() {
            return Ok(());
        }
        let mut scratch = String::new();
        for row in self.candidates(filter) {
            if compiled.matches(row, &mut scratch)? {
                f(row)?;
            }
        }
        Ok(())
    }

    /// One page of the rows passing `filter`, ordered by `sort` with ties in
    /// time order. Matches are streamed; the full ordered list is kept only
    /// while it stays within `keep_up_to` rows.
    pub(crate) fn sorted_window(
        &self,
        filter: &EntryFilter,
        sort: SortSpec,
        offset: u64,
        limit: u64,
        keep_up_to: usize,
    ) -> StoreResult<SortedWindow> {
        let ranks = RankTable::new(self, sort.column);
        let direct = sort.column == SortColumn::Timestamp && sort.direction == SortDirection::Asc;
        let (direct_from, direct_to) = (offset, offset.saturating_add(limit));

        let mut counts = vec![0u64; ranks.buckets()];
        let mut total = 0u64;
        let mut kept: Option<Vec<(u32, u32)>> = Some(Vec::new());
        let mut rows = Vec::new();
        self.for_each_match(filter, |row| {
            let rank = ranks.rank(self, row)?;
            counts[rank as usize] += 1;
            if direct && total >= direct_from && total < direct_to {
                rows.push(row);
            }
            total += 1;
            if kept.as_ref().is_some_and(|list| list.len() >= keep_up_to) {
                kept = None;
            } else if let Some(list) = &mut kept {
                list.push((rank, row));
            }
            Ok(())
        })?;

        let (from, to) = asc_window(sort.direction, total, offset, limit);
        if let Some(mut list) = kept {
            if !matches!(ranks, RankTable::Time) {
                list.sort_by_key(|&(rank, _)| rank);
            }
            let mut ids: Vec<u32> = list.into_iter().map(|(_, row)| row).collect();
            if sort.direction == SortDirection::Desc {
                ids.reverse();
            }
            let (lo, hi) = (offset.min(total) as usize, offset.saturating_add(limit).min(total) as usize);
            return Ok(SortedWindow {
                rows: ids[lo..hi].to_vec(),
                total,
                complete: Some(ids),
            });
        }
        if direct {
            return Ok(SortedWindow { rows, total, complete: None });
        }

        // Second pass: place each match at its position in ascending order
        // and keep the ones inside the window.
        let mut next_pos = Vec::with_capacity(counts.len());
        let mut acc = 0u64;
        for count in &counts {
            next_pos.push(acc);
            acc += count;
        }
        let mut window = vec![0u32; (to - from) as usize];
        if from < to {
            self.for_each_match(filter, |row| {
                let rank = ranks.rank(self, row)? as usize;
                let pos = next_pos[rank];
                next_pos[rank] += 1;
                if pos >= from && pos < to {
                    window[(pos - from) as usize] = row;
                }
                Ok(())
            })?;
        }
        if sort.direction == SortDirection::Desc {
            window.reverse();
        }
        Ok(SortedWindow {
            rows: window,
            total,
            complete: None,
        })
    }

    /// Position of the first row at (ascending) or before (descending) `ts`
    /// in the filtered, sorted table, counted without materializing it.
    pub(crate) fn position_of_time(&self, filter: &EntryFilter, sort: SortSpec, ts: i64) -> StoreResult<Option<u64>> {
        let ranks = RankTable::new(self, sort.column);
        let mut counts = vec![0u64; ranks.buckets()];
        let mut below = vec![0u64; ranks.buckets()];
        let mut above = 0u64;
        self.for_each_match(filter, |row| {
            let rank = ranks.rank(self, row)? as usize;
            counts[rank] += 1;
            let row_ts = self.ts(row);
            if row_ts < ts {
                below[rank] += 1;
            } else if row_ts > ts {
                above += 1;
            }
            Ok(())
        })?;
        let total: u64 = counts.iter().sum();

        if matches!(ranks, RankTable::Time) {
            let pos = match sort.direction {
                SortDirection::Asc => below[0],
                SortDirection::Desc => above,
            };
            return Ok((pos < total).then_some(pos));
        }

        let mut prefix = 0u64;
        let mut found = None;
        for (rank, (&count, &under)) in counts.iter().zip(&below).enumerate() {
            if count > under {
                found = Some((rank, prefix));
                if sort.direction == SortDirection::Asc {
                    break;
                }
            }
            prefix += count;
        }
        Ok(found.map(|(rank, start)| match sort.direction {
            SortDirection::Asc => start + below[rank],
            SortDirection::Desc => total - (start + counts[rank]),
        }))
    }

    /// Populated minutes over every row.
    pub(crate) fn time_tree_unfiltered(&self) -> Vec<TimeBucket> {
        let mut buckets = Vec::new();
        let mut cursor = self.cursor_from(i64::MIN);
        while let Some(row) = cursor.next(self) {
            let ts = self.ts(row);
            buckets.extend(TimeBucket::of(ts));
            let Some(next_minute) = (ts.div_euclid(MINUTE_MS) + 1).checked_mul(MINUTE_MS) else {
                break;
            };
            cursor = self.cursor_from(next_minute);
        }
        buckets
    }

    /// Populated minutes over the rows passing `filter`.
    pub(crate) fn time_tree_filtered(&self, filter: &EntryFilter) -> StoreResult<Vec<TimeBucket>> {
        let mut buckets = Vec::new();
        let mut last_minute = None;
        self.for_each_match(filter, |row| {
            push_bucket(&mut buckets, &mut last_minute, self.ts(row));
            Ok(())
        })?;
        Ok(buckets)
    }

    /// Populated minutes over time-ordered `rows`.
    pub(crate) fn time_tree_of(&self, rows: &[u32]) -> Vec<TimeBucket> {
        let mut buckets = Vec::new();
        let mut last_minute = None;
        for &row in rows {
            push_bucket(&mut buckets, &mut last_minute, self.ts(row));
        }
        buckets
    }
}

fn push_bucket(buckets: &mut Vec<TimeBucket>, last_minute: &mut Option<i64>, ts: i64) {
    let minute = ts.div_euclid(MINUTE_MS);
    if *last_minute != Some(minute) {
        *last_minute = Some(minute);
        buckets.extend(TimeBucket::of(ts));
    }
}

/// Ascending positions `[from, to)` that make up page `offset..offset+limit`
/// of `total` rows shown in `direction`.
pub(crate) fn asc_window(direction: SortDirection, total: u64, offset: u64, limit: u64) -> (u64, u64) {
    let start = offset.min(total);
    match direction {
        SortDirection::Asc => (start, offset.saturating_add(limit).min(total)),
        SortDirection::Desc => {
            let to = total - start;
            (to.saturating_sub(limit), to)
        }
    }
}

pub(crate) struct SortedWindow {
    /// Page rows in display order.
    pub rows: Vec<u32>,
    pub total: u64,
    /// Every match in display order, when it fit.
    pub complete: Option<Vec<u32>>,
}

/// Sort key of a row as a dense bucket number.
enum RankTable {
    Time,
    /// Rank per signal id.
    Signal(Vec<u32>, usize),
    /// Rank per category id; uncategorized rows sort last.
    Category(Vec<u32>),
}

impl RankTable {
    fn new(view: &StoreView, column: SortColumn) -> Self {
        let dicts = view.dictionaries();
        match column {
            SortColumn::Timestamp => RankTable::Time,
            SortColumn::DeviceId => {
                let device_ranks = dicts.devices.ranks();
                let ranks = dicts.signals().iter().map(|s| device_ranks[s.device as usize]).collect();
                RankTable::Signal(ranks, dicts.devices.len())
            }
            SortColumn::SignalName => RankTable::Signal(dicts.signal_name_ranks(), dicts.signal_count()),
            SortColumn::Category => RankTable::Category(dicts.categories.ranks()),
        }
    }

    fn buckets(&self) -> usize {
        match self {
            RankTable::Time => 1,
            RankTable::Signal(_, n) => (*n).max(1),
            RankTable::Category(ranks) => ranks.len() + 1,
        }
    }

    fn rank(&self, view: &StoreView, row: u32) -> StoreResult<u32> {
        Ok(match self {
            RankTable::Time => 0,
            RankTable::Signal(ranks, _) => ranks.get(view.signal_of(row) as usize).copied().unwrap_or(0),
            RankTable::Category(ranks) => match view.record(row)?.category {
                NO_ID => ranks.len() as u32,
                id => ranks.get(id as usize).copied().unwrap_or(ranks.len() as u32),
            },
        })
    }
}

/// Time-ordered posting lists merged into one time-ordered stream.
struct PostingMerge<'a> {
    view: &'a StoreView,
    lists: Vec<PostingList<'a>>,
    /// `(ts, row, list, position in list)`, smallest first.
    heap: BinaryHeap<Reverse<(i64, u32, usize, usize)>>,
}

impl<'a> PostingMerge<'a> {
    fn new(view: &'a StoreView, lists: impl IntoIterator<Item = PostingList<'a>>) -> Self {
        let lists: Vec<PostingList<'a>> = lists.into_iter().filter(|l| !l.is_empty()).collect();
        let heap = lists
            .iter()
            .enumerate()
            .map(|(i, list)| {
                let row = list.get(0);
                Reverse((view.ts(row), row, i, 0))
            })
            .collect();
        Self { view, lists, heap }
    }
}

impl Iterator for PostingMerge<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let Reverse((_, row, list, pos)) = self.heap.pop()?;
        let next = pos + 1;
        if next < self.lists[list].len() {
            let next_row = self.lists[list].get(next);
            self.heap.push(Reverse((self.view.ts(next_row), next_row, list, next)));
        }
        Some(row)
    }
}
