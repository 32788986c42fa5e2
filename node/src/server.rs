// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use plcscope_kernel::{LogEntry, SignalType};
use tower_http::trace::TraceLayer;

use crate::api::*;
use crate::errors::{ServiceError, ServiceResult};
use crate::files::{LocalFileStore, StoredFile};
use crate::query::{EntriesPage, QueryService};
use crate::session::ParseSession;
use crate::store::{ChunkBoundaries, TimeBucket};

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub files: Arc<LocalFileStore>,
}

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.query.sessions().config().max_upload_bytes;

    Router::new()
        .route("/api/parse", post(start_parse))
        .route("/api/parse/:id", axum::routing::delete(delete_session))
        .route("/api/parse/:id/status", get(session_status))
        .route("/api/parse/:id/keepalive", post(keepalive))
        .route("/api/parse/:id/entries", get(entries))
        .route("/api/parse/:id/all", get(all_entries))
        .route("/api/parse/:id/chunk", get(chunk))
        .route("/api/parse/:id/chunk/boundaries", get(chunk_boundaries))
        .route("/api/parse/:id/signals", get(signals))
        .route("/api/parse/:id/signals/types", get(signal_types))
        .route("/api/parse/:id/categories", get(categories))
        .route("/api/parse/:id/timetree", get(time_tree))
        .route("/api/parse/:id/values", get(values_at))
        .route("/api/parse/:id/index", get(index_by_time))
        .route(
            "/api/files",
            put(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Store reads touch mapped files; keep them off the async workers.
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal(format!("query task failed: {}", e)))?
}

async fn start_parse(
    State(state): State<AppState>,
    Json(req): Json<ParseRequest>,
) -> Result<(StatusCode, Json<ParseResponse>), ServiceError> {
    let session = state.query.parse(req.into_file_ids())?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ParseResponse {
            session_id: session.id,
            status: session.status,
        }),
    ))
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ParseSession>, ServiceError> {
    Ok(Json(state.query.status(&id)?))
}

async fn keepalive(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ServiceError> {
    state.query.keepalive(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ServiceError> {
    state.query.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn entries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TableParams>,
) -> Result<Json<EntriesPage>, ServiceError> {
    let request = params.page_request();
    blocking(move || state.query.entries(&id, request)).await.map(Json)
}

async fn all_entries(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<LogEntry>>, ServiceError> {
    blocking(move || state.query.all(&id)).await.map(Json)
}

async fn chunk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ChunkParams>,
) -> Result<Json<Vec<LogEntry>>, ServiceError> {
    let signals = split_signals(params.signals.as_deref());
    blocking(move || state.query.chunk(&id, params.start, params.end, signals))
        .await
        .map(Json)
}

async fn chunk_boundaries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ChunkParams>,
) -> Result<Json<ChunkBoundaries>, ServiceError> {
    let signals = split_signals(params.signals.as_deref()).unwrap_or_default();
    blocking(move || state.query.boundaries(&id, params.start, params.end, signals))
        .await
        .map(Json)
}

async fn signals(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<String>>, ServiceError> {
    blocking(move || state.query.signals(&id)).await.map(Json)
}

async fn signal_types(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BTreeMap<String, SignalType>>, ServiceError> {
    blocking(move || state.query.signal_types(&id)).await.map(Json)
}

async fn categories(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Vec<String>>, ServiceError> {
    blocking(move || state.query.categories(&id)).await.map(Json)
}

async fn time_tree(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TableParams>,
) -> Result<Json<Vec<TimeBucket>>, ServiceError> {
    let filter = params.filter();
    blocking(move || state.query.time_tree(&id, filter)).await.map(Json)
}

async fn values_at(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ValuesParams>,
) -> Result<Json<Vec<LogEntry>>, ServiceError> {
    let signals = split_signals(params.signals.as_deref());
    blocking(move || state.query.values_at(&id, params.ts, signals))
        .await
        .map(Json)
}

async fn index_by_time(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<TableParams>,
) -> Result<Json<IndexResponse>, ServiceError> {
    let ts = params
        .ts
        .ok_or_else(|| ServiceError::InvalidInput("ts is required".to_string()))?;
    let (filter, sort) = (params.filter(), params.sort());
    let index = blocking(move || state.query.index_by_time(&id, filter, sort, ts)).await?;
    Ok(Json(IndexResponse { index }))
}

async fn upload_file(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<StoredFile>), ServiceError> {
    let name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "upload.log".to_string());
    let files = state.files.clone();
    let stored = blocking(move || {
        files
            .import(&name, &body)
            .map_err(|e| ServiceError::Internal(format!("failed to store upload: {}", e)))
    })
    .await?;
    tracing::info!(file_id = %stored.file_id, name = %stored.name, size = stored.size, "file uploaded");
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.query.sessions().len(),
    })
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}
