// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bracket-delimited PLC debug log:
//!
//! ```text
//! 2024-01-15 08:30:00.123 [Info] [Line1/Cell2/Robot-01] [IO:DoorOpen] (boolean) : ON
//! ```

use std::sync::OnceLock;

use regex::Regex;

use super::infer::{extract_device_id, infer_type, parse_timestamp, typed_value};
use super::{take_bracket, LogParser};
use crate::types::{LogEntry, SignalType};

static SIGNATURE: OnceLock<Regex> = OnceLock::new();

fn signature() -> &'static Regex {
    SIGNATURE.get_or_init(|| {
        Regex::new(
            r"^\d{4}-\d{2}-\d{2}[ T]+\d{2}:\d{2}:\d{2}(?:\.\d+)?\s+\[[^\]]+\]\s+\[[^\]]+\]\s+\[[^:\]]+:[^\]]+\]\s+\([^)]+\)\s*:",
        )
        .expect("static regex")
    })
}

#[derive(Debug, Default)]
pub struct PlcDebugParser;

const MISMATCH: &str = "line does not match PLC debug format";

impl LogParser for PlcDebugParser {
    fn name(&self) -> &'static str {
        "plc_debug"
    }

    fn accepts(&self, line: &str) -> bool {
        signature().is_match(line.trim_start())
    }

    fn parse_line(&self, line: &str, out: &mut Vec<LogEntry>) -> Result<(), &'static str> {
        let line = line.trim();
        let open = line.find('[').ok_or(MISMATCH)?;
        let ts_text = &line[..open];

        let (level, rest) = take_bracket(&line[open..]).ok_or(MISMATCH)?;
        let (path, rest) = take_bracket(rest).ok_or(MISMATCH)?;
        let (qualified, rest) = take_bracket(rest).ok_or(MISMATCH)?;
        let (category, signal) = qualified.split_once(':').ok_or(MISMATCH)?;

        let rest = rest.trim_start().strip_prefix('(').ok_or(MISMATCH)?;
        let close = rest.find(')').ok_or(MISMATCH)?;
        let declared = &rest[..close];
        let raw_value = rest[close + 1..]
            .trim_start()
            .strip_prefix(':')
            .ok_or(MISMATCH)?;

        if level.trim().is_empty()
            || path.trim().is_empty()
            || category.trim().is_empty()
            || signal.trim().is_empty()
            || declared.trim().is_empty()
        {
            return Err(MISMATCH);
        }

        let timestamp = parse_timestamp(ts_text).ok_or("invalid timestamp")?;
        let device = extract_device_id(path).ok_or("device ID not found in path")?;

        let ty = SignalType::from_declared(declared).unwrap_or_else(|| infer_type(raw_value));
        let value = typed_value(raw_value, ty);

        out.push(
            LogEntry::new(device, signal.trim(), timestamp, value)
                .with_category(Some(category.trim().to_string())),
        );
        Ok(())
    }
}
