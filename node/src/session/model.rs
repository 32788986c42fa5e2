// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plcscope_kernel::ParseError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Parsing,
    Complete,
    Error,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Error)
    }

    /// Status only moves forward: pending, parsing, then one terminal state.
    /// Pending may fail directly (cancelled before a slot was granted).
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Pending, Parsing) | (Pending, Error) | (Parsing, Parsing) | (Parsing, Complete) | (Parsing, Error)
        )
    }
}

/// Client-visible session record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseSession {
    pub id: String,
    /// First input file; kept for single-file clients.
    pub file_id: String,
    pub file_ids: Vec<String>,
    pub status: SessionStatus,
    /// 0..=100, never decreases.
    pub progress: f64,
    pub entry_count: u64,
    pub signal_count: u64,
    pub processing_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parser_name: Option<String>,
    pub errors: Vec<ParseError>,
    pub error_count: u64,
    pub duplicates_removed: u64,
    /// Decided once at completion; null until then.
    pub server_side: Option<bool>,
    pub created_at: i64,
    pub last_accessed_at: i64,
}

impl ParseSession {
    pub fn new(id: String, file_ids: Vec<String>, now_ms: i64) -> Self {
        Self {
            id,
            file_id: file_ids.first().cloned().unwrap_or_default(),
            file_ids,
            status: SessionStatus::Pending,
            progress: 0.0,
            entry_count: 0,
            signal_count: 0,
            processing_time_ms: 0,
            start_time: None,
            end_time: None,
            parser_name: None,
            errors: Vec::new(),
            error_count: 0,
            duplicates_removed: 0,
            server_side: None,
            created_at: now_ms,
            last_accessed_at: now_ms,
        }
    }

    pub fn is_merge(&self) -> bool {
        self.file_ids.len() > 1
    }

    /// Raises progress, clamped to `[0, 100]`. Lower values are ignored.
    pub fn advance(&mut self, progress: f64) {
        let p = progress.clamp(0.0, 100.0);
        if p > self.progress {
            self.progress = p;
        }
    }

    /// Applies a status change if it is a legal forward move.
    pub fn set_status(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }
}
