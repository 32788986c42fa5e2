// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Comma-separated signal dump: `timestamp,device,signal,value`. The value
//! column may itself contain commas.

use super::infer::{extract_device_id, infer_value, parse_timestamp};
use super::LogParser;
use crate::types::LogEntry;

const MISMATCH: &str = "line does not match CSV signal format";

#[derive(Debug, Default)]
pub struct CsvParser;

fn is_header(line: &str) -> bool {
    line.split(',')
        .next()
        .map(|first| first.trim().eq_ignore_ascii_case("timestamp"))
        .unwrap_or(false)
}

impl LogParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv_signal"
    }

    fn accepts(&self, line: &str) -> bool {
        if is_header(line) {
            return line.split(',').count() >= 4;
        }
        let mut parts = line.splitn(4, ',');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ts), Some(device), Some(signal), Some(_)) => {
                parse_timestamp(ts).is_some() && !device.trim().is_empty() && !signal.trim().is_empty()
            }
            _ => false,
        }
    }

    fn parse_line(&self, line: &str, out: &mut Vec<LogEntry>) -> Result<(), &'static str> {
        if is_header(line) {
            return Ok(());
        }
        let mut parts = line.splitn(4, ',');
        let (ts, path, signal, raw) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(ts), Some(path), Some(signal), Some(raw)) => (ts, path.trim(), signal.trim(), raw),
            _ => return Err(MISMATCH),
        };
        if path.is_empty() || signal.is_empty() {
            return Err(MISMATCH);
        }

        let timestamp = parse_timestamp(ts).ok_or("invalid timestamp")?;
        let device = extract_device_id(path).unwrap_or(path);

        out.push(LogEntry::new(device, signal, timestamp, infer_value(raw)));
        Ok(())
    }
}
