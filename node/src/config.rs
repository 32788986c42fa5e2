// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid value {value:?} for {key}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub bind_addr: SocketAddr,
    /// Session stores live under `<data_dir>/sessions/<id>`.
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub max_concurrent_parses: usize,
    /// Sessions allowed to wait for a parse slot before new requests are
    /// rejected.
    pub max_pending_parses: usize,
    pub max_sessions: usize,
    pub session_ttl_secs: u64,
    pub keepalive_window_secs: u64,
    pub cleanup_interval_secs: u64,
    /// Sessions with more entries than this are served window-by-window.
    pub server_side_threshold: u64,
    pub batch_size: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub dedup_window_ms: i64,
    /// Upper bound on row ids held by the per-session filter cache.
    pub query_cache_ids: usize,
    pub max_upload_bytes: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("./data"),
            upload_dir: PathBuf::from("./data/uploads"),
            max_concurrent_parses: 2,
            max_pending_parses: 32,
            max_sessions: 10,
            session_ttl_secs: 30 * 60,
            keepalive_window_secs: 5 * 60,
            cleanup_interval_secs: 60,
            server_side_threshold: 100_000,
            batch_size: 50_000,
            default_page_size: 100,
            max_page_size: 1000,
            dedup_window_ms: plcscope_kernel::config::DEFAULT_DEDUP_WINDOW_MS,
            query_cache_ids: 4_000_000,
            max_upload_bytes: 1 << 30,
        }
    }
}

fn env_override<T: FromStr>(key: &'static str, target: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = std::env::var(key) {
        *target = value.parse().map_err(|_| ConfigError { key, value })?;
    }
    Ok(())
}

impl NodeConfig {
    /// Defaults overridden by `PLCSCOPE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        env_override("PLCSCOPE_BIND_ADDR", &mut cfg.bind_addr)?;
        env_override("PLCSCOPE_DATA_DIR", &mut cfg.data_dir)?;
        env_override("PLCSCOPE_UPLOAD_DIR", &mut cfg.upload_dir)?;
        env_override("PLCSCOPE_MAX_CONCURRENT_PARSES", &mut cfg.max_concurrent_parses)?;
        env_override("PLCSCOPE_MAX_PENDING_PARSES", &mut cfg.max_pending_parses)?;
        env_override("PLCSCOPE_MAX_SESSIONS", &mut cfg.max_sessions)?;
        env_override("PLCSCOPE_SESSION_TTL_SECS", &mut cfg.session_ttl_secs)?;
        env_override("PLCSCOPE_KEEPALIVE_WINDOW_SECS", &mut cfg.keepalive_window_secs)?;
        env_override("PLCSCOPE_CLEANUP_INTERVAL_SECS", &mut cfg.cleanup_interval_secs)?;
        env_override("PLCSCOPE_SERVER_SIDE_THRESHOLD", &mut cfg.server_side_threshold)?;
        env_override("PLCSCOPE_BATCH_SIZE", &mut cfg.batch_size)?;
        env_override("PLCSCOPE_MAX_PAGE_SIZE", &mut cfg.max_page_size)?;
        env_override("PLCSCOPE_DEDUP_WINDOW_MS", &mut cfg.dedup_window_ms)?;
        env_override("PLCSCOPE_QUERY_CACHE_IDS", &mut cfg.query_cache_ids)?;
        env_override("PLCSCOPE_MAX_UPLOAD_BYTES", &mut cfg.max_upload_bytes)?;
        Ok(cfg)
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.bind_addr.port(), 3000);
        assert_eq!(cfg.server_side_threshold, 100_000);
        assert_eq!(cfg.session_ttl_secs, 1800);
        assert!(cfg.keepalive_window_secs < cfg.session_ttl_secs);
        assert_eq!(cfg.sessions_dir(), PathBuf::from("./data/sessions"));
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut port_like = 5usize;
        std::env::set_var("PLCSCOPE_TEST_ONLY_VALUE", "not-a-number");
        let err = env_override("PLCSCOPE_TEST_ONLY_VALUE", &mut port_like).unwrap_err();
        assert_eq!(err.key, "PLCSCOPE_TEST_ONLY_VALUE");
        assert_eq!(port_like, 5);

        std::env::set_var("PLCSCOPE_TEST_ONLY_VALUE", "42");
        env_override("PLCSCOPE_TEST_ONLY_VALUE", &mut port_like).unwrap();
        assert_eq!(port_like, 42);
    }
}
