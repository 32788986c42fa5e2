// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use plcscope_node::clock::SystemClock;
use plcscope_node::config::NodeConfig;
use plcscope_node::files::{FileSource, LocalFileStore};
use plcscope_node::query::QueryService;
use plcscope_node::server::{build_router, AppState};
use plcscope_node::session::SessionManager;
use plcscope_node::telemetry;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let cfg = match NodeConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(2);
        }
    };
    tracing::info!("Initializing PLC log node with config: {:?}", cfg);

    let files = match LocalFileStore::new(&cfg.upload_dir) {
        Ok(files) => Arc::new(files),
        Err(e) => {
            tracing::error!(dir = %cfg.upload_dir.display(), error = %e, "cannot open upload directory");
            std::process::exit(1);
        }
    };

    let sessions = match SessionManager::new(cfg.clone(), Arc::new(SystemClock), files.clone() as Arc<dyn FileSource>) {
        Ok(sessions) => Arc::new(sessions),
        Err(e) => {
            tracing::error!(dir = %cfg.sessions_dir().display(), error = %e, "cannot prepare session directory");
            std::process::exit(1);
        }
    };
    sessions.start_sweeper();

    let app = build_router(AppState {
        query: Arc::new(QueryService::new(sessions.clone())),
        files,
    });

    let addr = cfg.bind_addr;
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "server error");
    }
    sessions.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
