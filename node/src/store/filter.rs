// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Entry filters for the paginated table view and the time tree.

use std::fmt::Write as _;

use plcscope_kernel::SignalType;
use plcscope_persistence::{RowRecord, ValueTag, NO_ID};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::view::StoreView;
use super::{StoreError, StoreResult};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EntryFilter {
    pub search: Option<String>,
    pub regex: bool,
    pub case_sensitive: bool,
    pub category: Option<String>,
    pub device_id: Option<String>,
    /// Signal keys (`device::signal`).
    pub signals: Vec<String>,
    pub signal_type: Option<SignalType>,
}

impl EntryFilter {
    /// Drops empty criteria and orders the signal set so equal filters
    /// produce equal cache keys.
    pub fn normalized(mut self) -> Self {
        self.search = self.search.filter(|s| !s.trim().is_empty());
        if self.search.is_none() {
            self.regex = false;
            self.case_sensitive = false;
        }
        self.category = self.category.filter(|s| !s.is_empty());
        self.device_id = self.device_id.filter(|s| !s.is_empty());
        self.signals.retain(|s| !s.is_empty());
        self.signals.sort();
        self.signals.dedup();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none()
            && self.category.is_none()
            && self.device_id.is_none()
            && self.signals.is_empty()
            && self.signal_type.is_none()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    #[default]
    Timestamp,
    DeviceId,
    SignalName,
    Category,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

enum TextMatcher {
    Substring { needle: String, case_sensitive: bool },
    Pattern(Regex),
}

fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    if needle_lower.is_ascii() {
        let n = needle_lower.as_bytes();
        haystack
            .as_bytes()
            .windows(n.len())
            .any(|w| w.eq_ignore_ascii_case(n))
    } else {
        haystack.to_lowercase().contains(needle_lower)
    }
}

impl TextMatcher {
    fn compile(filter: &EntryFilter) -> StoreResult<Option<Self>> {
        let Some(search) = filter.search.as_deref() else {
            return Ok(None);
        };
        if filter.regex {
            let pattern = RegexBuilder::new(search)
                .case_insensitive(!filter.case_sensitive)
                .size_limit(1 << 20)
                .build()
                .map_err(|e| StoreError::InvalidFilter(format!("invalid regex: {}", e)))?;
            return Ok(Some(TextMatcher::Pattern(pattern)));
        }
        let needle = if filter.case_sensitive {
            search.to_string()
        } else {
            search.to_lowercase()
        };
        Ok(Some(TextMatcher::Substring {
            needle,
            case_sensitive: filter.case_sensitive,
        }))
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            TextMatcher::Substring { needle, case_sensitive: true } => text.contains(needle.as_str()),
            TextMatcher::Substring { needle, case_sensitive: false } => contains_ignore_case(text, needle),
            TextMatcher::Pattern(re) => re.is_match(text),
        }
    }
}

enum IdFilter {
    Any,
    Only(u32),
    Nothing,
}

/// A filter resolved against one view's dictionaries.
pub(crate) struct CompiledFilter<'v> {
    view: &'v StoreView,
    matcher: Option<TextMatcher>,
    /// Per signal id: passes device and signal-set criteria.
    allowed: Option<Vec<bool>>,
    /// Per signal id: device id or signal name matches the search text.
    name_hit: Vec<bool>,
    category: IdFilter,
    signal_type: Option<SignalType>,
    matches_nothing: bool,
}

impl<'v> CompiledFilter<'v> {
    pub(crate) fn compile(view: &'v StoreView, filter: &EntryFilter) -> StoreResult<Self> {
        let dicts = view.dictionaries();
        let matcher = TextMatcher::compile(filter)?;
        let mut matches_nothing = false;

        let allowed = if filter.device_id.is_some() || !filter.signals.is_empty() {
            let mut mask = vec![true; dicts.signal_count()];
            if let Some(device) = filter.device_id.as_deref() {
                match dicts.devices.id_of(device) {
                    Some(device) => {
                        for (id, info) in dicts.signals().iter().enumerate() {
                            mask[id] &= info.device == device;
                        }
                    }
                    None => matches_nothing = true,
                }
            }
            if !filter.signals.is_empty() {
                let mut wanted = vec![false; dicts.signal_count()];
                for key in &filter.signals {
                    if let Some(id) = dicts.signal_by_key(key) {
                        wanted[id as usize] = true;
                    }
                }
                for (m, w) in mask.iter_mut().zip(wanted) {
                    *m &= w;
                }
            }
            if !mask.iter().any(|m| *m) {
                matches_nothing = true;
            }
            Some(mask)
        } else {
            None
        };

        let name_hit = match &matcher {
            Some(m) => dicts
                .signals()
                .iter()
                .map(|info| {
                    m.is_match(&info.name)
                        || dicts.devices.name(info.device).map(|d| m.is_match(d)).unwrap_or(false)
                })
                .collect(),
            None => Vec::new(),
        };

        let category = match filter.category.as_deref() {
            None => IdFilter::Any,
            Some(name) => match dicts.categories.id_of(name) {
                Some(id) => IdFilter::Only(id),
                None => {
                    matches_nothing = true;
                    IdFilter::Nothing
                }
            },
        };

        Ok(Self {
            view,
            matcher,
            allowed,
            name_hit,
            category,
            signal_type: filter.signal_type,
            matches_nothing,
        })
    }

    pub(crate) fn matches_nothing(&self) -> bool {
        self.matches_nothing
    }

    /// Evaluates the filter for one row. `scratch` holds rendered values.
    pub(crate) fn matches(&self, row: u32, scratch: &mut String) -> StoreResult<bool> {
        if self.matches_nothing {
            return Ok(false);
        }
        let signal = self.view.signal_of(row);
        if let Some(allowed) = &self.allowed {
            if !allowed.get(signal as usize).copied().unwrap_or(false) {
                return Ok(false);
            }
        }
        if matches!(self.category, IdFilter::Any) && self.signal_type.is_none() && self.matcher.is_none() {
            return Ok(true);
        }

        let record = self.view.record(row)?;
        match self.category {
            IdFilter::Any => {}
            IdFilter::Only(id) if record.category == id && record.category != NO_ID => {}
            _ => return Ok(false),
        }
        if let Some(ty) = self.signal_type {
            if StoreView::signal_type_of(&record) != ty {
                return Ok(false);
            }
        }
        match &self.matcher {
            None => Ok(true),
            Some(_) if self.name_hit.get(signal as usize).copied().unwrap_or(false) => Ok(true),
            Some(m) => self.value_matches(m, &record, scratch),
        }
    }

    fn value_matches(&self, matcher: &TextMatcher, record: &RowRecord, scratch: &mut String) -> StoreResult<bool> {
        match record.tag {
            ValueTag::Boolean => Ok(matcher.is_match(if record.value != 0 { "true" } else { "false" })),
            ValueTag::Integer => {
                scratch.clear();
                let _ = write!(scratch, "{}", record.value);
                Ok(matcher.is_match(scratch))
            }
            ValueTag::String => Ok(matcher.is_match(self.view.maps.string(record.value as u64)?)),
        }
    }
}
