// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Tab-separated PLC trace:
//!
//! ```text
//! 2024-01-15 08:30:00.123 [] Line1/Robot-01<TAB>Ready<TAB>OUT<TAB>1<TAB>..<TAB>..<TAB>..<TAB>2024-01-15 08:30:00.120
//! ```

use super::infer::{extract_device_id, infer_value, parse_timestamp};
use super::LogParser;
use crate::types::LogEntry;

const MARKER: &str = " [] ";
const MIN_FIELDS: usize = 8;
const MISMATCH: &str = "line does not match PLC tab format";

#[derive(Debug, Default)]
pub struct PlcTabParser;

impl PlcTabParser {
    fn split(line: &str) -> Option<(&str, Vec<&str>)> {
        let at = line.find(MARKER)?;
        let fields: Vec<&str> = line[at + MARKER.len()..].split('\t').collect();
        (fields.len() >= MIN_FIELDS).then(|| (line[..at].trim(), fields))
    }
}

impl LogParser for PlcTabParser {
    fn name(&self) -> &'static str {
        "plc_tab"
    }

    fn accepts(&self, line: &str) -> bool {
        match Self::split(line) {
            Some((ts, fields)) => {
                parse_timestamp(ts).is_some() && !fields[0].trim().is_empty() && !fields[1].trim().is_empty()
            }
            None => false,
        }
    }

    fn parse_line(&self, line: &str, out: &mut Vec<LogEntry>) -> Result<(), &'static str> {
        let (ts_text, fields) = Self::split(line).ok_or(MISMATCH)?;
        let signal = fields[1].trim();
        if signal.is_empty() {
            return Err(MISMATCH);
        }

        let timestamp = parse_timestamp(ts_text).ok_or("invalid timestamp")?;
        let device = extract_device_id(fields[0]).ok_or("device ID not found in path")?;
        let value = infer_value(fields[3]);

        out.push(LogEntry::new(device, signal, timestamp, value));
        Ok(())
    }
}
