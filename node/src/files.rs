// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Resolution of uploaded file ids to assembled files on disk.
//!
//! Upload transport and chunk reassembly happen elsewhere; this module only
//! maps a `fileId` to a complete file plus its declared name.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub file_id: String,
    pub name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub size: u64,
}

pub trait FileSource: Send + Sync {
    fn resolve(&self, file_id: &str) -> Option<StoredFile>;
}

/// Files kept under one upload directory, addressed by id.
pub struct LocalFileStore {
    root: PathBuf,
    registered: RwLock<HashMap<String, StoredFile>>,
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.')
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            registered: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Registers an already assembled file under `file_id`.
    pub fn register(&self, file_id: impl Into<String>, name: impl Into<String>, path: impl Into<PathBuf>) -> io::Result<StoredFile> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        let file = StoredFile {
            file_id: file_id.into(),
            name: name.into(),
            path,
            size,
        };
        self.registered.write().insert(file.file_id.clone(), file.clone());
        Ok(file)
    }

    /// Stores `bytes` as a new upload and returns its descriptor.
    pub fn import(&self, name: &str, bytes: &[u8]) -> io::Result<StoredFile> {
        let file_id = uuid::Uuid::new_v4().to_string();
        let path = self.root.join(&file_id);
        std::fs::write(&path, bytes)?;
        self.register(file_id, name, path)
    }
}

impl FileSource for LocalFileStore {
    fn resolve(&self, file_id: &str) -> Option<StoredFile> {
        if let Some(file) = self.registered.read().get(file_id) {
            return Some(file.clone());
        }
        if !is_safe_id(file_id) {
            return None;
        }
        // Files dropped into the upload directory by the transport layer.
        let path = self.root.join(file_id);
        let meta = std::fs::metadata(&path).ok().filter(|m| m.is_file())?;
        Some(StoredFile {
            file_id: file_id.to_string(),
            name: file_id.to_string(),
            path,
            size: meta.len(),
        })
    }
}
