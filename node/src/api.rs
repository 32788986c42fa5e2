// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plcscope_kernel::SignalType;
use serde::{Deserialize, Serialize};

use crate::query::PageRequest;
use crate::session::SessionStatus;
use crate::store::filter::{EntryFilter, SortColumn, SortDirection, SortSpec};

/// Comma-separated signal keys; blanks are dropped.
pub fn split_signals(raw: Option<&str>) -> Option<Vec<String>> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
}

impl ParseRequest {
    /// `fileIds` wins over `fileId` when both are sent.
    pub fn into_file_ids(self) -> Vec<String> {
        if self.file_ids.is_empty() {
            self.file_id.into_iter().collect()
        } else {
            self.file_ids
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    pub session_id: String,
    pub status: SessionStatus,
}

/// Query string for the table view, the time tree and index lookups.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub search: Option<String>,
    #[serde(default)]
    pub regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    pub category: Option<String>,
    pub device_id: Option<String>,
    pub signals: Option<String>,
    pub signal_type: Option<SignalType>,
    pub sort: Option<SortColumn>,
    pub order: Option<SortDirection>,
    /// `/index` only.
    #[serde(alias = "timestamp")]
    pub ts: Option<i64>,
}

impl TableParams {
    pub fn filter(&self) -> EntryFilter {
        EntryFilter {
            search: self.search.clone(),
            regex: self.regex,
            case_sensitive: self.case_sensitive,
            category: self.category.clone(),
            device_id: self.device_id.clone(),
            signals: split_signals(self.signals.as_deref()).unwrap_or_default(),
            signal_type: self.signal_type,
        }
    }

    pub fn sort(&self) -> SortSpec {
        SortSpec {
            column: self.sort.unwrap_or_default(),
            direction: self.order.unwrap_or_default(),
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            page_size: self.page_size,
            filter: self.filter(),
            sort: self.sort(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChunkParams {
    pub start: i64,
    pub end: i64,
    pub signals: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ValuesParams {
    #[serde(alias = "timestamp")]
    pub ts: i64,
    pub signals: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub index: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_signals() {
        assert_eq!(
            split_signals(Some("a::x, b::y,,")),
            Some(vec!["a::x".to_string(), "b::y".to_string()])
        );
        assert_eq!(split_signals(None), None);
        assert_eq!(split_signals(Some("")), Some(Vec::new()));
    }

    #[test]
    fn test_parse_request_prefers_file_ids() {
        let req: ParseRequest = serde_json::from_str(r#"{"fileId":"a","fileIds":["b","c"]}"#).unwrap();
        assert_eq!(req.into_file_ids(), vec!["b", "c"]);
        let req: ParseRequest = serde_json::from_str(r#"{"fileId":"a"}"#).unwrap();
        assert_eq!(req.into_file_ids(), vec!["a"]);
    }
}
