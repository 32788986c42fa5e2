// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const ENTRIES_INGESTED: &str = "plcscope_entries_ingested_total";
pub const PARSE_ERRORS: &str = "plcscope_parse_errors_total";
pub const SESSIONS_COMPLETED: &str = "plcscope_sessions_completed_total";
pub const SESSIONS_FAILED: &str = "plcscope_sessions_failed_total";
pub const SESSIONS_EXPIRED: &str = "plcscope_sessions_expired_total";
pub const SESSIONS_ACTIVE: &str = "plcscope_sessions_active";
pub const PARSE_DURATION: &str = "plcscope_parse_duration_seconds";
pub const QUERY_DURATION: &str = "plcscope_query_duration_seconds";
pub const DUPLICATES_REMOVED: &str = "plcscope_merge_duplicates_removed_total";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "plcscope_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => tracing::warn!(error = %e, "metrics recorder not installed"),
    }

    metrics::describe_counter!(ENTRIES_INGESTED, "Log entries committed to session stores");
    metrics::describe_counter!(PARSE_ERRORS, "Rejected log lines");
    metrics::describe_counter!(SESSIONS_COMPLETED, "Sessions that finished indexing");
    metrics::describe_counter!(SESSIONS_FAILED, "Sessions that ended in the error state");
    metrics::describe_counter!(SESSIONS_EXPIRED, "Sessions removed by TTL expiry");
    metrics::describe_gauge!(SESSIONS_ACTIVE, "Live sessions");
    metrics::describe_histogram!(PARSE_DURATION, "Wall time from parse start to terminal state");
    metrics::describe_histogram!(QUERY_DURATION, "Event store query latency");
    metrics::describe_counter!(DUPLICATES_REMOVED, "Entries dropped by merge deduplication");

    metrics::gauge!("plcscope_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
