// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Query façade: request policy on top of session stores.
//!
//! Clamps paging, validates and clamps time windows, maps a closed store to
//! `SessionNotFound`, and enforces the server-side contract frozen on each
//! session when it completes.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use plcscope_kernel::{LogEntry, SignalType};
use serde::Serialize;

use crate::errors::{ServiceError, ServiceResult};
use crate::session::{ParseSession, SessionManager};
use crate::store::filter::{EntryFilter, SortSpec};
use crate::store::{ChunkBoundaries, EventStore, StoreError, StoreResult, TimeBucket};
use crate::telemetry;

#[derive(Clone, Debug, Default)]
pub struct PageRequest {
    /// 1-based.
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub filter: EntryFilter,
    pub sort: SortSpec,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntriesPage {
    pub entries: Vec<LogEntry>,
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

pub struct QueryService {
    sessions: Arc<SessionManager>,
    default_page_size: u64,
    max_page_size: u64,
}

fn validate_range(start: i64, end: i64) -> ServiceResult<()> {
    if start > end {
        return Err(ServiceError::InvalidRange(format!("start {} is after end {}", start, end)));
    }
    Ok(())
}

/// Intersects `[start, end)` with the session bounds `[min, max + 1)`.
/// `None` when nothing can match.
fn clamp_window(bounds: Option<(i64, i64)>, start: i64, end: i64) -> Option<(i64, i64)> {
    let (min, max) = bounds?;
    let start = start.max(min);
    let end = end.min(max.saturating_add(1));
    (start < end).then_some((start, end))
}

impl QueryService {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        let config = sessions.config();
        let max_page_size = config.max_page_size.max(1) as u64;
        Self {
            default_page_size: (config.default_page_size as u64).clamp(1, max_page_size),
            max_page_size,
            sessions,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Runs `op` against the session store, timing it and translating
    /// store errors for the caller.
    fn with_store<T>(&self, id: &str, op: &'static str, f: impl FnOnce(&EventStore) -> StoreResult<T>) -> ServiceResult<T> {
        let handle = self.sessions.access(id)?;
        let started = Instant::now();
        let result = f(handle.store());
        metrics::histogram!(telemetry::QUERY_DURATION, started.elapsed().as_secs_f64(), "op" => op);
        result.map_err(|e| match e {
            StoreError::Closed => ServiceError::SessionNotFound(id.to_string()),
            other => {
                if !matches!(other, StoreError::InvalidFilter(_)) {
                    tracing::error!(session = %id, op, error = %other, "query failed");
                }
                other.into()
            }
        })
    }

    pub fn parse(&self, file_ids: Vec<String>) -> ServiceResult<ParseSession> {
        self.sessions.create_parse(file_ids)
    }

    pub fn status(&self, id: &str) -> ServiceResult<ParseSession> {
        self.sessions.status(id)
    }

    pub fn keepalive(&self, id: &str) -> ServiceResult<ParseSession> {
        self.sessions.keepalive(id)
    }

    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        self.sessions.delete(id)
    }

    fn clamp_page(&self, page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
        let page = page.unwrap_or(1).max(1);
        let size = page_size.unwrap_or(self.default_page_size).clamp(1, self.max_page_size);
        (page, size)
    }

    pub fn entries(&self, id: &str, request: PageRequest) -> ServiceResult<EntriesPage> {
        let (page, page_size) = self.clamp_page(request.page, request.page_size);
        let offset = (page - 1).saturating_mul(page_size);
        let result = self.with_store(id, "entries", |store| {
            store.page(request.filter, request.sort, offset, page_size)
        })?;
        Ok(EntriesPage {
            entries: result.entries,
            page,
            page_size,
            total: result.total,
        })
    }

    /// Every entry in time order; only for sessions at or below the
    /// server-side threshold.
    pub fn all(&self, id: &str) -> ServiceResult<Vec<LogEntry>> {
        let handle = self.sessions.access(id)?;
        if handle.server_side() != Some(false) {
            return Err(ServiceError::ServerSideOnly(id.to_string()));
        }
        drop(handle);
        self.with_store(id, "all", |store| store.scan()?.collect())
    }

    pub fn chunk(&self, id: &str, start: i64, end: i64, signals: Option<Vec<String>>) -> ServiceResult<Vec<LogEntry>> {
        validate_range(start, end)?;
        self.with_store(id, "chunk", |store| {
            let stats = store.stats();
            match clamp_window(stats.start_time.zip(stats.end_time), start, end) {
                Some((start, end)) => store.range(start, end, signals.as_deref()),
                None => Ok(Vec::new()),
            }
        })
    }

    /// `before`/`after` are taken relative to the unclamped window.
    pub fn boundaries(&self, id: &str, start: i64, end: i64, signals: Vec<String>) -> ServiceResult<ChunkBoundaries> {
        validate_range(start, end)?;
        self.with_store(id, "boundaries", |store| store.boundaries(start, end, &signals))
    }

    pub fn values_at(&self, id: &str, ts: i64, signals: Option<Vec<String>>) -> ServiceResult<Vec<LogEntry>> {
        self.with_store(id, "values", |store| store.values_at(ts, signals.as_deref()))
    }

    pub fn signals(&self, id: &str) -> ServiceResult<Vec<String>> {
        self.with_store(id, "signals", |store| store.signal_keys())
    }

    pub fn signal_types(&self, id: &str) -> ServiceResult<BTreeMap<String, SignalType>> {
        self.with_store(id, "signal_types", |store| store.signal_types())
    }

    pub fn categories(&self, id: &str) -> ServiceResult<Vec<String>> {
        self.with_store(id, "categories", |store| store.categories())
    }

    pub fn time_tree(&self, id: &str, filter: EntryFilter) -> ServiceResult<Vec<TimeBucket>> {
        self.with_store(id, "time_tree", |store| store.time_tree(filter))
    }

    pub fn index_by_time(&self, id: &str, filter: EntryFilter, sort: SortSpec, ts: i64) -> ServiceResult<Option<u64>> {
        self.with_store(id, "index", |store| store.index_by_time(filter, sort, ts))
    }
}
