// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Field-level helpers shared by every dialect: value typing, timestamp and
//! device id extraction.

use chrono::NaiveDate;

use crate::types::{SignalType, SignalValue};

/// Recognizes `ON/OFF`, `TRUE/FALSE`, `YES/NO` and `1/0`, case-insensitively.
pub fn parse_bool_literal(raw: &str) -> Option<bool> {
    let s = raw.trim();
    if s.len() > 5 {
        return None;
    }
    match s.to_ascii_uppercase().as_str() {
        "ON" | "TRUE" | "1" | "YES" => Some(true),
        "OFF" | "FALSE" | "0" | "NO" => Some(false),
        _ => None,
    }
}

/// Parses a signed integer literal with optional `0x`/`0b`/`0o` prefix and
/// `_` or `,` digit separators. Values outside `i64` are rejected.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let (radix, digits) = match body.get(..2) {
        Some("0x") | Some("0X") => (16, &body[2..]),
        Some("0b") | Some("0B") => (2, &body[2..]),
        Some("0o") | Some("0O") => (8, &body[2..]),
        _ => (10, body),
    };

    // Separators may only sit between digits.
    if digits.is_empty()
        || !digits.starts_with(|c: char| c.is_digit(radix))
        || !digits.ends_with(|c: char| c.is_digit(radix))
    {
        return None;
    }

    let mut magnitude: i128 = 0;
    for c in digits.chars() {
        if c == '_' || c == ',' {
            continue;
        }
        let d = c.to_digit(radix)? as i128;
        magnitude = magnitude.checked_mul(radix as i128)?.checked_add(d)?;
        if magnitude > (i64::MAX as i128) + 1 {
            return None;
        }
    }

    let signed = if negative { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}

/// Infers a type from the raw literal: boolean, then integer, else string.
pub fn infer_type(raw: &str) -> SignalType {
    if parse_bool_literal(raw).is_some() {
        SignalType::Boolean
    } else if parse_integer(raw).is_some() {
        SignalType::Integer
    } else {
        SignalType::String
    }
}

pub fn infer_value(raw: &str) -> SignalValue {
    typed_value(raw, infer_type(raw))
}

/// Converts `raw` to the declared type. A literal that does not fit the
/// declared type is kept as a string so value and type never disagree.
pub fn typed_value(raw: &str, declared: SignalType) -> SignalValue {
    let trimmed = raw.trim();
    match declared {
        SignalType::Boolean => match parse_bool_literal(trimmed) {
            Some(b) => SignalValue::Boolean(b),
            None => SignalValue::String(trimmed.to_string()),
        },
        SignalType::Integer => match parse_integer(trimmed) {
            Some(i) => SignalValue::Integer(i),
            None => SignalValue::String(trimmed.to_string()),
        },
        SignalType::String => SignalValue::String(trimmed.to_string()),
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS[.fff]` (space or `T` separated) as UTC and
/// returns milliseconds since the epoch. Sub-millisecond digits are dropped.
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let (date, time) = s.split_once(|c: char| c == ' ' || c == 'T')?;
    let time = time.trim_start();

    let d = date.as_bytes();
    if d.len() != 10 || d[4] != b'-' || d[7] != b'-' {
        return None;
    }
    let year = digits(&d[0..4])?;
    let month = digits(&d[5..7])?;
    let day = digits(&d[8..10])?;

    let t = time.as_bytes();
    if t.len() < 8 || t[2] != b':' || t[5] != b':' {
        return None;
    }
    let hour = digits(&t[0..2])?;
    let minute = digits(&t[3..5])?;
    let second = digits(&t[6..8])?;

    let mut millis = 0u32;
    if t.len() > 8 {
        if t[8] != b'.' {
            return None;
        }
        let frac = &t[9..];
        if frac.is_empty() || !frac.iter().all(u8::is_ascii_digit) {
            return None;
        }
        for i in 0..3 {
            millis = millis * 10 + frac.get(i).map(|b| (b - b'0') as u32).unwrap_or(0);
        }
    }

    let naive = NaiveDate::from_ymd_opt(year as i32, month, day)?
        .and_hms_milli_opt(hour, minute, second, millis)?;
    Some(naive.and_utc().timestamp_millis())
}

fn digits(bytes: &[u8]) -> Option<u32> {
    let mut v = 0u32;
    for b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        v = v * 10 + (b - b'0') as u32;
    }
    Some(v)
}

/// Extracts the device id from a hierarchical path: the last segment after
/// `/`, `\` or `]`, with any `@suffix` removed. Only `[A-Za-z0-9_-]` ids are
/// valid.
pub fn extract_device_id(path: &str) -> Option<&str> {
    let path = path.trim();
    let start = path
        .rfind(|c: char| c == '/' || c == '\\' || c == ']')
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut segment = &path[start..];
    if let Some(at) = segment.find('@') {
        segment = &segment[..at];
    }
    let valid = !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    valid.then_some(segment)
}
