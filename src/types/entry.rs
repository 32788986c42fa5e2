// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Log entry and per-line parse error records.

use serde::{Deserialize, Serialize};

use crate::config::SIGNAL_KEY_SEPARATOR;
use crate::types::value::{SignalType, SignalValue};

/// One observed signal state at a point in time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub device_id: String,
    pub signal_name: String,
    /// Milliseconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub value: SignalValue,
    pub signal_type: SignalType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl LogEntry {
    pub fn new(
        device_id: impl Into<String>,
        signal_name: impl Into<String>,
        timestamp: i64,
        value: SignalValue,
    ) -> Self {
        let signal_type = value.signal_type();
        Self {
            device_id: device_id.into(),
            signal_name: signal_name.into(),
            timestamp,
            value,
            signal_type,
            category: None,
            source_id: None,
        }
    }

    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category.filter(|c| !c.is_empty());
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn signal_key(&self) -> String {
        signal_key(&self.device_id, &self.signal_name)
    }
}

/// Builds the `device::signal` key used by chunk and boundary queries.
pub fn signal_key(device_id: &str, signal_name: &str) -> String {
    let mut key = String::with_capacity(device_id.len() + signal_name.len() + 2);
    key.push_str(device_id);
    key.push_str(SIGNAL_KEY_SEPARATOR);
    key.push_str(signal_name);
    key
}

/// A rejected input line. Never fatal; accumulated on the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    /// 1-based line number, 0 when the error is not tied to a line.
    pub line: usize,
    pub content: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl ParseError {
    pub fn new(line: usize, content: &str, reason: impl Into<String>) -> Self {
        Self {
            line,
            content: truncate_content(content),
            reason: reason.into(),
            source_id: None,
        }
    }

    /// An error not tied to an input line (storage failure, unknown format).
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self {
            line: 0,
            content: String::new(),
            reason: reason.into(),
            source_id: None,
        }
    }
}

fn truncate_content(content: &str) -> String {
    let max = crate::config::MAX_ERROR_CONTENT_LEN;
    if content.len() <= max {
        return content.to_string();
    }
    let mut end = max;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    content[..end].to_string()
}
