// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Blocking ingestion pipeline run for one session on the blocking pool.
//!
//! Single files stream straight into the session store. Multi-file sessions
//! parse each file into its own temporary store under `sources/`, then feed
//! the time-ordered scans of those stores through the merge engine into the
//! session store.

use std::fs::File;
use std::io::{self, BufReader};

use plcscope_kernel::config::MAX_RECORDED_ERRORS;
use plcscope_kernel::merge::{MergeConfig, MergeInput, Merger};
use plcscope_kernel::parser::{EntrySink, ParseSummary, Registry};
use plcscope_kernel::{KernelError, KernelResult, LogEntry, ParseError};
use thiserror::Error;

use super::manager::SessionHandle;
use crate::files::StoredFile;
use crate::store::{EventStore, StoreConfig, StoreError};

const READ_BUFFER: usize = 1 << 20;
const MERGE_PROGRESS_EVERY: u64 = 1 << 16;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("cannot open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] KernelError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    pub(crate) fn is_cancelled(&self) -> bool {
        matches!(self, IngestError::Parse(KernelError::Cancelled))
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct IngestSettings {
    pub batch_size: usize,
    pub dedup_window_ms: i64,
}

/// What the pipeline learned about the input, kept even when it fails.
#[derive(Debug, Default)]
pub(crate) struct IngestOutcome {
    parsers: Vec<&'static str>,
    pub errors: Vec<ParseError>,
    pub error_count: u64,
    pub duplicates_removed: u64,
}

impl IngestOutcome {
    fn absorb(&mut self, summary: ParseSummary, source_id: Option<&str>) {
        if !self.parsers.contains(&summary.parser) {
            self.parsers.push(summary.parser);
        }
        self.error_count += summary.error_count;
        let room = MAX_RECORDED_ERRORS.saturating_sub(self.errors.len());
        self.errors.extend(summary.errors.into_iter().take(room).map(|mut e| {
            e.source_id = source_id.map(str::to_string);
            e
        }));
    }

    fn record_fatal(&mut self, reason: String, source_id: Option<&str>) {
        self.error_count += 1;
        if self.errors.len() < MAX_RECORDED_ERRORS {
            let mut error = ParseError::fatal(reason);
            error.source_id = source_id.map(str::to_string);
            self.errors.push(error);
        }
    }

    /// Dialect name; multi-file sessions over mixed dialects list each once.
    pub fn parser_name(&self) -> Option<String> {
        (!self.parsers.is_empty()).then(|| self.parsers.join(","))
    }
}

/// Batches entries into store commits.
struct StoreSink<'a> {
    store: &'a EventStore,
    batch: Vec<LogEntry>,
    batch_size: usize,
}

impl<'a> StoreSink<'a> {
    fn new(store: &'a EventStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch: Vec::with_capacity(batch_size.min(1 << 16)),
            batch_size,
        }
    }

    fn push(&mut self, entry: LogEntry) -> Result<(), StoreError> {
        self.batch.push(entry);
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        self.store.append(&self.batch)?;
        self.batch.clear();
        Ok(())
    }
}

impl EntrySink for StoreSink<'_> {
    fn accept(&mut self, entry: LogEntry) -> KernelResult<()> {
        self.push(entry).map_err(|e| KernelError::Sink(Box::new(e)))
    }
}

/// Parses one file into `store`, mapping consumed bytes onto the
/// `[from, to)` progress band. Entries parsed before a failure are kept.
fn parse_file(
    handle: &SessionHandle,
    file: &StoredFile,
    registry: &Registry,
    store: &EventStore,
    settings: IngestSettings,
    band: (f64, f64),
) -> Result<ParseSummary, IngestError> {
    let reader = File::open(&file.path).map_err(|source| IngestError::Open {
        name: file.name.clone(),
        source,
    })?;
    let reader = BufReader::with_capacity(READ_BUFFER, reader);
    let size = file.size.max(1) as f64;
    let (from, to) = band;

    let mut sink = StoreSink::new(store, settings.batch_size);
    let parsed = registry.parse(reader, &mut sink, &mut |p| {
        handle.advance(from + (to - from) * (p.bytes_read as f64 / size).min(1.0));
        !handle.is_cancelled()
    });

    match parsed {
        Ok(summary) => {
            sink.flush()?;
            Ok(summary)
        }
        Err(e) => {
            if !matches!(e, KernelError::Sink(_) | KernelError::Cancelled) {
                if let Err(flush) = sink.flush() {
                    tracing::warn!(session = %handle.id(), error = %flush, "failed to keep partial batch");
                }
            }
            Err(e.into())
        }
    }
}

/// Runs the whole pipeline for a session. The store is finalized on
/// success and, best effort, after a failure so partial data stays
/// queryable.
pub(crate) fn run(
    handle: &SessionHandle,
    files: &[StoredFile],
    registry: &Registry,
    settings: IngestSettings,
    outcome: &mut IngestOutcome,
) -> Result<(), IngestError> {
    let result = if files.len() > 1 {
        ingest_merge(handle, files, registry, settings, outcome)
    } else {
        ingest_single(handle, files, registry, settings, outcome)
    };

    match result {
        Ok(()) => {
            handle.advance(if files.len() > 1 { 95.0 } else { 90.0 });
            handle.store().finalize().map_err(|e| {
                outcome.record_fatal(format!("indexing failed: {}", e), None);
                IngestError::from(e)
            })
        }
        Err(e) => {
            if !e.is_cancelled() {
                if let Err(finalize) = handle.store().finalize() {
                    tracing::warn!(session = %handle.id(), error = %finalize, "could not index partial session");
                }
            }
            Err(e)
        }
    }
}

fn ingest_single(
    handle: &SessionHandle,
    files: &[StoredFile],
    registry: &Registry,
    settings: IngestSettings,
    outcome: &mut IngestOutcome,
) -> Result<(), IngestError> {
    let Some(file) = files.first() else {
        return Ok(());
    };
    match parse_file(handle, file, registry, handle.store(), settings, (10.0, 90.0)) {
        Ok(summary) => {
            outcome.absorb(summary, None);
            Ok(())
        }
        Err(e) => {
            outcome.record_fatal(e.to_string(), None);
            Err(e)
        }
    }
}

/// Parses every file into its own store, then merges them. When a file
/// fails, the sources parsed so far (including the failed file's committed
/// rows) are still merged so the session keeps them, and the failure is
/// returned afterwards.
fn ingest_merge(
    handle: &SessionHandle,
    files: &[StoredFile],
    registry: &Registry,
    settings: IngestSettings,
    outcome: &mut IngestOutcome,
) -> Result<(), IngestError> {
    let sources_dir = handle.store().dir().join("sources");
    let n = files.len() as f64;
    let mut stores = Vec::with_capacity(files.len());
    let mut failure = None;

    for (i, file) in files.iter().enumerate() {
        let band = (10.0 + 70.0 * i as f64 / n, 10.0 + 70.0 * (i + 1) as f64 / n);
        let source_id = Some(file.file_id.as_str());
        let store = EventStore::create(sources_dir.join(i.to_string()), StoreConfig { cache_ids: 0 })?;
        let parsed = parse_file(handle, file, registry, &store, settings, band);
        let parsed = match store.finalize() {
            Ok(()) => parsed,
            Err(e) => parsed.and(Err(e.into())),
        };
        match parsed {
            Ok(summary) => outcome.absorb(summary, source_id),
            Err(e) => {
                outcome.record_fatal(e.to_string(), source_id);
                failure = Some(e);
            }
        }
        stores.push(store);
        if failure.is_some() {
            break;
        }
    }

    if let Some(e) = failure.take() {
        if e.is_cancelled() {
            return Err(e);
        }
        if let Err(merge) = merge_sources(handle, &stores, files, settings) {
            tracing::warn!(session = %handle.id(), error = %merge, "could not keep entries of parsed sources");
        }
        return Err(e);
    }
    handle.advance(80.0);

    match merge_sources(handle, &stores, files, settings) {
        Ok(removed) => outcome.duplicates_removed = removed,
        Err(e) => {
            outcome.record_fatal(e.to_string(), None);
            return Err(e);
        }
    }

    for store in &stores {
        store.destroy()?;
    }
    if let Err(e) = std::fs::remove_dir(&sources_dir) {
        tracing::debug!(session = %handle.id(), error = %e, "sources directory not removed");
    }
    Ok(())
}

/// Streams the per-source stores through the merge engine into the session
/// store. Returns the number of duplicates dropped.
fn merge_sources(
    handle: &SessionHandle,
    stores: &[EventStore],
    files: &[StoredFile],
    settings: IngestSettings,
) -> Result<u64, IngestError> {
    let mut inputs = Vec::with_capacity(stores.len());
    for (store, file) in stores.iter().zip(files) {
        inputs.push(MergeInput::new(file.file_id.clone(), store.scan()?));
    }
    let total: u64 = stores.iter().map(|s| s.stats().entry_count).sum::<u64>().max(1);

    let mut merger = Merger::new(inputs, MergeConfig { dedup_window_ms: settings.dedup_window_ms });
    let mut sink = StoreSink::new(handle.store(), settings.batch_size);
    let mut consumed = 0u64;
    while let Some(entry) = merger.next() {
        sink.push(entry?)?;
        consumed += 1;
        if consumed % MERGE_PROGRESS_EVERY == 0 {
            let seen = consumed + merger.stats().duplicates_removed;
            handle.advance(80.0 + 15.0 * (seen as f64 / total as f64).min(1.0));
            if handle.is_cancelled() {
                return Err(KernelError::Cancelled.into());
            }
        }
    }
    sink.flush()?;
    Ok(merger.stats().duplicates_removed)
}
