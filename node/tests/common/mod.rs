#![allow(dead_code)]

use std::sync::Arc;

use plcscope_node::clock::ManualClock;
use plcscope_node::config::NodeConfig;
use plcscope_node::files::{FileSource, LocalFileStore, StoredFile};
use plcscope_node::session::SessionManager;
use tempfile::{tempdir, TempDir};

pub const START_MS: i64 = 1_700_000_000_000;

pub struct Harness {
    pub dir: TempDir,
    pub config: NodeConfig,
    pub clock: Arc<ManualClock>,
    pub files: Arc<LocalFileStore>,
    pub sessions: Arc<SessionManager>,
}

pub fn harness(tweak: impl FnOnce(&mut NodeConfig)) -> Harness {
    let dir = tempdir().unwrap();
    let mut config = NodeConfig::default();
    config.data_dir = dir.path().join("data");
    config.upload_dir = dir.path().join("uploads");
    tweak(&mut config);

    let clock = Arc::new(ManualClock::new(START_MS));
    let files = Arc::new(LocalFileStore::new(&config.upload_dir).unwrap());
    let sessions = Arc::new(
        SessionManager::new(config.clone(), clock.clone(), files.clone() as Arc<dyn FileSource>).unwrap(),
    );
    Harness {
        dir,
        config,
        clock,
        files,
        sessions,
    }
}

/// `2024-01-15 08:00:00.000` shifted by `offset_ms`, in log notation.
pub fn stamp(offset_ms: i64) -> String {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap();
    (base + chrono::Duration::milliseconds(offset_ms))
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

pub fn csv_line(offset_ms: i64, device: &str, signal: &str, value: &str) -> String {
    format!("{},{},{},{}\n", stamp(offset_ms), device, signal, value)
}

impl Harness {
    pub fn upload(&self, name: &str, body: &str) -> StoredFile {
        self.files.import(name, body.as_bytes()).unwrap()
    }
}
