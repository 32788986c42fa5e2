// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! MCS/AMHS carrier transfer log:
//!
//! ```text
//! 2024-01-15 08:30:00.123 [UPDATE=CMD001, CARRIER01] [Priority=5], [TransferState=2], [CarrierLoc=EQ01]
//! ```
//!
//! Every key/value pair becomes one entry on the carrier's device id, plus
//! synthetic `_Action` and `_CommandID` signals.

use std::sync::OnceLock;

use regex::Regex;

use super::infer::{infer_value, parse_timestamp, typed_value};
use super::LogParser;
use crate::types::{LogEntry, SignalType, SignalValue};

pub const CATEGORY: &str = "MCS";

const MISMATCH: &str = "line does not match MCS format";

const BOOLEAN_KEYS: &[&str] = &[
    "IsBoost",
    "IsMultiJob",
    "IsMultipleDestination",
    "IsLocationGroupOrder",
    "IsExecuteCommand",
];

const INTEGER_KEYS: &[&str] = &["Priority", "AltCount", "AltCount2", "WaitCount", "CirculationCount"];

const STATE_KEYS: &[&str] = &[
    "TransferState",
    "TransferState2",
    "TransferAbnormalState",
    "TransferAbnormalState2",
    "ResultCode",
    "ResultCode2",
    "CommandType",
];

static LINE: OnceLock<Regex> = OnceLock::new();
static PAIR: OnceLock<Regex> = OnceLock::new();

fn line_regex() -> &'static Regex {
    LINE.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}(?:\.\d+)?)\s+\[(ADD|UPDATE|REMOVE)=([^,\]]+)(?:,\s*([^\]]+))?\]\s*(.*)$",
        )
        .expect("static regex")
    })
}

fn pair_regex() -> &'static Regex {
    PAIR.get_or_init(|| Regex::new(r"\[([^=\]]+)=([^\]]*)\]").expect("static regex"))
}

#[derive(Debug, Default)]
pub struct McsParser;

fn normalize_key(key: &str) -> &str {
    match key {
        "CarrierLoc" | "CarrierLocation" => "CurrentLocation",
        other => other,
    }
}

fn key_value(key: &str, raw: &str) -> SignalValue {
    if BOOLEAN_KEYS.contains(&key) {
        return typed_value(raw, SignalType::Boolean);
    }
    if INTEGER_KEYS.contains(&key) {
        return typed_value(raw, SignalType::Integer);
    }
    if STATE_KEYS.contains(&key) {
        return SignalValue::String(raw.to_string());
    }
    if raw.eq_ignore_ascii_case("TRUE") {
        return SignalValue::Boolean(true);
    }
    if raw.eq_ignore_ascii_case("FALSE") {
        return SignalValue::Boolean(false);
    }
    infer_value(raw)
}

impl LogParser for McsParser {
    fn name(&self) -> &'static str {
        "mcs_log"
    }

    fn accepts(&self, line: &str) -> bool {
        line_regex().is_match(line.trim())
    }

    fn parse_line(&self, line: &str, out: &mut Vec<LogEntry>) -> Result<(), &'static str> {
        let caps = line_regex().captures(line.trim()).ok_or(MISMATCH)?;
        let timestamp = parse_timestamp(&caps[1]).ok_or("invalid timestamp")?;
        let action = &caps[2];
        let first_id = caps[3].trim();

        // With two ids the first is the command id and the second the carrier.
        let (carrier, command) = match caps.get(4).map(|m| m.as_str().trim()) {
            Some(second) if !second.is_empty() => (second, Some(first_id)),
            _ => (first_id, None),
        };
        if carrier.is_empty() {
            return Err(MISMATCH);
        }

        let entry = |signal: &str, value: SignalValue| {
            LogEntry::new(carrier, signal, timestamp, value).with_category(Some(CATEGORY.to_string()))
        };

        out.push(entry("_Action", SignalValue::String(action.to_string())));
        if let Some(command) = command {
            out.push(entry("_CommandID", SignalValue::String(command.to_string())));
        }

        if let Some(rest) = caps.get(5) {
            for pair in pair_regex().captures_iter(rest.as_str()) {
                let key = normalize_key(pair[1].trim());
                let raw = pair[2].trim();
                if key.is_empty() || raw.is_empty() || raw == "None" {
                    continue;
                }
                out.push(entry(key, key_value(key, raw)));
            }
        }
        Ok(())
    }
}
