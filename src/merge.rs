// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Multi-source merge with fuzzy deduplication.
//!
//! Sources are consumed as timestamp-ordered streams and combined with a
//! k-way heap merge; ties on timestamp resolve in source order. A sliding
//! window then drops an entry when an entry with the same
//! `(deviceId, signalName, value)` from a *different* source was kept less
//! than `dedup_window_ms` earlier. Only kept entries inside the window are
//! held in memory, so the pass is linear in entry count.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::convert::Infallible;

use rustc_hash::FxHashMap;

use crate::config::DEFAULT_DEDUP_WINDOW_MS;
use crate::types::{LogEntry, SignalValue};

#[derive(Clone, Copy, Debug)]
pub struct MergeConfig {
    pub dedup_window_ms: i64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub emitted: u64,
    pub duplicates_removed: u64,
}

/// One input stream. `entries` must yield non-decreasing timestamps.
pub struct MergeInput<I> {
    pub source_id: String,
    pub entries: I,
}

impl<I> MergeInput<I> {
    pub fn new(source_id: impl Into<String>, entries: I) -> Self {
        Self {
            source_id: source_id.into(),
            entries,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    device_id: String,
    signal_name: String,
    value: SignalValue,
}

impl DedupKey {
    fn of(entry: &LogEntry) -> Self {
        Self {
            device_id: entry.device_id.clone(),
            signal_name: entry.signal_name.clone(),
            value: entry.value.clone(),
        }
    }
}

struct Head {
    timestamp: i64,
    source: usize,
    entry: LogEntry,
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp && self.source == other.source
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    // Reversed: BinaryHeap is a max-heap and we want the earliest head first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Streaming merge over fallible sources.
pub struct Merger<I, E>
where
    I: Iterator<Item = Result<LogEntry, E>>,
{
    sources: Vec<I>,
    source_ids: Vec<String>,
    heap: BinaryHeap<Head>,
    primed: bool,
    failed: bool,
    window_ms: i64,
    kept: FxHashMap<DedupKey, VecDeque<(i64, usize)>>,
    expiry: VecDeque<(i64, DedupKey)>,
    stats: MergeStats,
}

impl<I, E> Merger<I, E>
where
    I: Iterator<Item = Result<LogEntry, E>>,
{
    pub fn new(inputs: Vec<MergeInput<I>>, config: MergeConfig) -> Self {
        let mut sources = Vec::with_capacity(inputs.len());
        let mut source_ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            sources.push(input.entries);
            source_ids.push(input.source_id);
        }
        Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            source_ids,
            primed: false,
            failed: false,
            window_ms: config.dedup_window_ms.max(0),
            kept: FxHashMap::default(),
            expiry: VecDeque::new(),
            stats: MergeStats::default(),
        }
    }

    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    fn pull(&mut self, source: usize) -> Result<(), E> {
        if let Some(next) = self.sources[source].next() {
            let entry = next?;
            self.heap.push(Head {
                timestamp: entry.timestamp,
                source,
                entry,
            });
        }
        Ok(())
    }

    fn evict(&mut self, now: i64) {
        while let Some((ts, _)) = self.expiry.front() {
            if now - *ts < self.window_ms {
                break;
            }
            if let Some((_, key)) = self.expiry.pop_front() {
                if let Some(list) = self.kept.get_mut(&key) {
                    list.pop_front();
                    if list.is_empty() {
                        self.kept.remove(&key);
                    }
                }
            }
        }
    }

    fn is_cross_source_duplicate(&self, key: &DedupKey, source: usize) -> bool {
        self.kept
            .get(key)
            .map(|list| list.iter().any(|&(_, kept_source)| kept_source != source))
            .unwrap_or(false)
    }
}

impl<I, E> Iterator for Merger<I, E>
where
    I: Iterator<Item = Result<LogEntry, E>>,
{
    type Item = Result<LogEntry, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if !self.primed {
            self.primed = true;
            for source in 0..self.sources.len() {
                if let Err(e) = self.pull(source) {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }

        loop {
            let Head {
                timestamp,
                source,
                mut entry,
            } = self.heap.pop()?;

            if let Err(e) = self.pull(source) {
                self.failed = true;
                return Some(Err(e));
            }

            if self.window_ms > 0 {
                self.evict(timestamp);
                let key = DedupKey::of(&entry);
                if self.is_cross_source_duplicate(&key, source) {
                    self.stats.duplicates_removed += 1;
                    continue;
                }
                self.kept
                    .entry(key.clone())
                    .or_default()
                    .push_back((timestamp, source));
                self.expiry.push_back((timestamp, key));
            }

            entry.source_id = Some(self.source_ids[source].clone());
            self.stats.emitted += 1;
            return Some(Ok(entry));
        }
    }
}

/// In-memory convenience: stably sorts each source by timestamp, then merges.
pub fn merge_entries(sources: Vec<(String, Vec<LogEntry>)>, config: MergeConfig) -> (Vec<LogEntry>, MergeStats) {
    let inputs = sources
        .into_iter()
        .map(|(source_id, mut entries)| {
            entries.sort_by_key(|e| e.timestamp);
            MergeInput::new(source_id, entries.into_iter().map(Ok::<_, Infallible>))
        })
        .collect();

    let mut merger = Merger::new(inputs, config);
    let mut merged = Vec::new();
    for item in merger.by_ref() {
        match item {
            Ok(entry) => merged.push(entry),
            Err(never) => match never {},
        }
    }
    (merged, merger.stats())
}
