// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Session registry and lifecycle.
//!
//! Each session owns one event store under `<data_dir>/sessions/<id>` and is
//! ingested by one background task. The registry lock is only held to look
//! a session up or to remove it; store teardown happens outside it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use plcscope_kernel::parser::Registry;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ingest::{self, IngestOutcome, IngestSettings};
use super::model::{ParseSession, SessionStatus};
use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::errors::{ServiceError, ServiceResult};
use crate::files::{FileSource, StoredFile};
use crate::store::{EventStore, StoreConfig};
use crate::telemetry;

pub struct SessionHandle {
    id: String,
    meta: RwLock<ParseSession>,
    store: EventStore,
    last_accessed: AtomicI64,
    keepalive_at: AtomicI64,
    cancelled: AtomicBool,
    status_tx: watch::Sender<SessionStatus>,
}

impl SessionHandle {
    fn new(meta: ParseSession, store: EventStore) -> Self {
        let (status_tx, _) = watch::channel(meta.status);
        Self {
            id: meta.id.clone(),
            last_accessed: AtomicI64::new(meta.last_accessed_at),
            keepalive_at: AtomicI64::new(i64::MIN),
            meta: RwLock::new(meta),
            store,
            cancelled: AtomicBool::new(false),
            status_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn status(&self) -> SessionStatus {
        self.meta.read().status
    }

    /// Frozen at completion; `None` while ingestion runs.
    pub fn server_side(&self) -> Option<bool> {
        self.meta.read().server_side
    }

    pub fn snapshot(&self) -> ParseSession {
        let mut meta = self.meta.read().clone();
        meta.last_accessed_at = self.last_accessed.load(Ordering::Acquire);
        meta
    }

    pub(crate) fn advance(&self, progress: f64) {
        self.meta.write().advance(progress);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn touch(&self, now: i64) {
        self.last_accessed.fetch_max(now, Ordering::AcqRel);
    }

    fn is_expired(&self, now: i64, ttl_ms: i64, window_ms: i64) -> bool {
        if !self.status().is_terminal() {
            return false;
        }
        let idle = now.saturating_sub(self.last_accessed.load(Ordering::Acquire));
        let since_keepalive = now.saturating_sub(self.keepalive_at.load(Ordering::Acquire));
        idle >= ttl_ms && since_keepalive >= window_ms
    }

    fn begin(&self) -> bool {
        let mut meta = self.meta.write();
        if !meta.set_status(SessionStatus::Parsing) {
            return false;
        }
        meta.advance(10.0);
        drop(meta);
        self.status_tx.send_replace(SessionStatus::Parsing);
        true
    }

    /// Moves to a terminal state and freezes the store-derived fields.
    fn settle(&self, status: SessionStatus, outcome: IngestOutcome, elapsed: Duration, threshold: u64) {
        let stats = self.store.stats();
        let mut meta = self.meta.write();
        if !meta.set_status(status) {
            return;
        }
        if status == SessionStatus::Complete {
            meta.advance(100.0);
        }
        meta.entry_count = stats.entry_count;
        meta.signal_count = stats.signal_count;
        meta.start_time = stats.start_time;
        meta.end_time = stats.end_time;
        meta.parser_name = outcome.parser_name();
        meta.error_count = outcome.error_count;
        meta.errors = outcome.errors;
        meta.duplicates_removed = outcome.duplicates_removed;
        meta.processing_time_ms = elapsed.as_millis() as u64;
        meta.server_side = Some(stats.entry_count > threshold);
        drop(meta);
        self.status_tx.send_replace(status);
    }
}

pub struct SessionManager {
    sessions: DashMap<String, Arc<SessionHandle>>,
    config: NodeConfig,
    clock: Arc<dyn Clock>,
    files: Arc<dyn FileSource>,
    registry: Arc<Registry>,
    parse_slots: Arc<Semaphore>,
    pending: AtomicUsize,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Session directories from an earlier run are removed.
    pub fn new(config: NodeConfig, clock: Arc<dyn Clock>, files: Arc<dyn FileSource>) -> std::io::Result<Self> {
        let dir = config.sessions_dir();
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => tracing::info!(dir = %dir.display(), "removed stale session stores"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            sessions: DashMap::new(),
            parse_slots: Arc::new(Semaphore::new(config.max_concurrent_parses.max(1))),
            config,
            clock,
            files,
            registry: Arc::new(Registry::default()),
            pending: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn ttl_ms(&self) -> i64 {
        (self.config.session_ttl_secs as i64).saturating_mul(1000)
    }

    fn keepalive_ms(&self) -> i64 {
        (self.config.keepalive_window_secs as i64).saturating_mul(1000)
    }

    fn session_dir(&self, id: &str) -> PathBuf {
        self.config.sessions_dir().join(id)
    }

    /// Registers a session for `file_ids` and starts ingesting it in the
    /// background. More than one file makes it a merge session.
    pub fn create_parse(self: &Arc<Self>, file_ids: Vec<String>) -> ServiceResult<ParseSession> {
        if file_ids.is_empty() {
            return Err(ServiceError::InvalidInput("at least one fileId is required".to_string()));
        }
        if self.shutdown.is_cancelled() {
            return Err(ServiceError::Busy("server is shutting down".to_string()));
        }
        let files = file_ids
            .iter()
            .map(|id| self.files.resolve(id).ok_or_else(|| ServiceError::FileNotFound(id.clone())))
            .collect::<ServiceResult<Vec<StoredFile>>>()?;

        let now = self.clock.now_ms();
        if self.sessions.len() >= self.config.max_sessions && !self.evict_idle(now) {
            return Err(ServiceError::Busy(format!(
                "{} sessions are live; delete one or retry later",
                self.config.max_sessions
            )));
        }
        let queued = self.pending.fetch_add(1, Ordering::AcqRel);
        if queued >= self.config.max_pending_parses {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            return Err(ServiceError::Busy("parse queue is full".to_string()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let store = match EventStore::create(
            self.session_dir(&id),
            StoreConfig {
                cache_ids: self.config.query_cache_ids,
            },
        ) {
            Ok(store) => store,
            Err(e) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                return Err(e.into());
            }
        };

        let handle = Arc::new(SessionHandle::new(ParseSession::new(id.clone(), file_ids, now), store));
        self.sessions.insert(id.clone(), handle.clone());
        metrics::increment_gauge!(telemetry::SESSIONS_ACTIVE, 1.0);
        tracing::info!(session = %id, files = files.len(), "parse session created");

        let snapshot = handle.snapshot();
        tokio::spawn(self.clone().run(handle, files));
        Ok(snapshot)
    }

    async fn run(self: Arc<Self>, handle: Arc<SessionHandle>, files: Vec<StoredFile>) {
        let permit = tokio::select! {
            permit = self.parse_slots.clone().acquire_owned() => permit.ok(),
            _ = self.shutdown.cancelled() => None,
        };

        let started = Instant::now();
        let threshold = self.config.server_side_threshold;
        let (outcome, result) = match permit {
            Some(permit) if !handle.is_cancelled() && handle.begin() => {
                let settings = IngestSettings {
                    batch_size: self.config.batch_size,
                    dedup_window_ms: self.config.dedup_window_ms,
                };
                let registry = self.registry.clone();
                let worker = handle.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let mut outcome = IngestOutcome::default();
                    let result = ingest::run(&worker, &files, &registry, settings, &mut outcome).map_err(|e| e.to_string());
                    (outcome, result)
                })
                .await;
                drop(permit);
                joined.unwrap_or_else(|e| (IngestOutcome::default(), Err(format!("ingestion task failed: {}", e))))
            }
            _ => (IngestOutcome::default(), Err("parse cancelled before it started".to_string())),
        };
        self.pending.fetch_sub(1, Ordering::AcqRel);

        let elapsed = started.elapsed();
        metrics::histogram!(telemetry::PARSE_DURATION, elapsed.as_secs_f64());
        metrics::counter!(telemetry::PARSE_ERRORS, outcome.error_count);
        metrics::counter!(telemetry::DUPLICATES_REMOVED, outcome.duplicates_removed);

        match result {
            Ok(()) => {
                handle.settle(SessionStatus::Complete, outcome, elapsed, threshold);
                let stats = handle.store.stats();
                metrics::counter!(telemetry::SESSIONS_COMPLETED, 1);
                metrics::counter!(telemetry::ENTRIES_INGESTED, stats.entry_count);
                tracing::info!(
                    session = %handle.id,
                    entries = stats.entry_count,
                    signals = stats.signal_count,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "parse session complete"
                );
            }
            Err(reason) => {
                tracing::warn!(session = %handle.id, %reason, "parse session failed");
                let mut outcome = outcome;
                if outcome.errors.is_empty() {
                    outcome.errors.push(plcscope_kernel::ParseError::fatal(reason));
                    outcome.error_count += 1;
                }
                handle.settle(SessionStatus::Error, outcome, elapsed, threshold);
                metrics::counter!(telemetry::SESSIONS_FAILED, 1);
            }
        }
    }

    /// Finds a live session, expiring it on the spot if its time is up.
    fn lookup(&self, id: &str) -> ServiceResult<Arc<SessionHandle>> {
        let handle = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_string()))?;
        let now = self.clock.now_ms();
        if handle.is_expired(now, self.ttl_ms(), self.keepalive_ms()) {
            self.expire(id, now);
            return Err(ServiceError::SessionNotFound(id.to_string()));
        }
        Ok(handle)
    }

    /// Session metadata. Does not count as access.
    pub fn status(&self, id: &str) -> ServiceResult<ParseSession> {
        Ok(self.lookup(id)?.snapshot())
    }

    /// Session handle for a data query; refreshes `lastAccessedAt`.
    pub fn access(&self, id: &str) -> ServiceResult<Arc<SessionHandle>> {
        let handle = self.lookup(id)?;
        handle.touch(self.clock.now_ms());
        Ok(handle)
    }

    pub fn keepalive(&self, id: &str) -> ServiceResult<ParseSession> {
        let handle = self.lookup(id)?;
        let now = self.clock.now_ms();
        handle.touch(now);
        handle.keepalive_at.fetch_max(now, Ordering::AcqRel);
        tracing::debug!(session = %id, "keepalive");
        Ok(handle.snapshot())
    }

    pub fn delete(&self, id: &str) -> ServiceResult<()> {
        let (_, handle) = self
            .sessions
            .remove(id)
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_string()))?;
        self.release(&handle, "deleted");
        Ok(())
    }

    pub fn list(&self) -> Vec<ParseSession> {
        self.sessions.iter().map(|entry| entry.value().snapshot()).collect()
    }

    fn expire(&self, id: &str, now: i64) -> bool {
        let (ttl, window) = (self.ttl_ms(), self.keepalive_ms());
        match self.sessions.remove_if(id, |_, h| h.is_expired(now, ttl, window)) {
            Some((_, handle)) => {
                metrics::counter!(telemetry::SESSIONS_EXPIRED, 1);
                self.release(&handle, "expired");
                true
            }
            None => false,
        }
    }

    /// Evicts the least recently used terminal session that is not under
    /// keepalive.
    fn evict_idle(&self, now: i64) -> bool {
        let window = self.keepalive_ms();
        let victim = self
            .sessions
            .iter()
            .filter(|entry| {
                let h = entry.value();
                h.status().is_terminal() && now.saturating_sub(h.keepalive_at.load(Ordering::Acquire)) >= window
            })
            .min_by_key(|entry| entry.value().last_accessed.load(Ordering::Acquire))
            .map(|entry| entry.key().clone());

        let Some(id) = victim else {
            return false;
        };
        match self.sessions.remove_if(&id, |_, h| h.status().is_terminal()) {
            Some((_, handle)) => {
                self.release(&handle, "evicted at capacity");
                true
            }
            None => false,
        }
    }

    /// Cancels ingestion and removes the store. The handle is already out of
    /// the registry.
    fn release(&self, handle: &SessionHandle, reason: &'static str) {
        handle.cancelled.store(true, Ordering::Release);
        if let Err(e) = handle.store.destroy() {
            tracing::error!(session = %handle.id, error = %e, "failed to remove session store");
        }
        metrics::decrement_gauge!(telemetry::SESSIONS_ACTIVE, 1.0);
        tracing::info!(session = %handle.id, reason, "session released");
    }

    /// Expires every session whose time is up. Returns how many went.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now_ms();
        let (ttl, window) = (self.ttl_ms(), self.keepalive_ms());
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_expired(now, ttl, window))
            .map(|entry| entry.key().clone())
            .collect();
        let removed = expired.iter().filter(|id| self.expire(id, now)).count();
        if removed > 0 {
            tracing::info!(removed, remaining = self.sessions.len(), "session sweep");
        }
        removed
    }

    /// Starts the periodic sweep. It stops on [`SessionManager::shutdown`] or
    /// when the manager is dropped.
    pub fn start_sweeper(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let token = self.shutdown.clone();
        let every = Duration::from_secs(self.config.cleanup_interval_secs.max(1));

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.sweep();
                    }
                }
            }
            tracing::debug!("session sweeper stopped");
        });

        if let Some(previous) = self.sweeper.lock().replace(task) {
            previous.abort();
        }
    }

    /// Resolves once the session reaches a terminal state.
    pub async fn wait_settled(&self, id: &str) -> ServiceResult<ParseSession> {
        let handle = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::SessionNotFound(id.to_string()))?;
        let mut rx = handle.status_tx.subscribe();
        rx.wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| ServiceError::SessionNotFound(id.to_string()))?;
        Ok(handle.snapshot())
    }

    /// Stops the sweeper, refuses new parses and removes every session.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let sweeper = self.sweeper.lock().take();
        if let Some(task) = sweeper {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "session sweeper ended abnormally");
            }
        }
        self.parse_slots.close();

        let ids: Vec<String> = self.sessions.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            if let Some((_, handle)) = self.sessions.remove(&id) {
                self.release(&handle, "shutdown");
            }
        }
        tracing::info!("session manager shut down");
    }
}
