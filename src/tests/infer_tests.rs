// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::parser::infer::*;
use crate::types::{SignalType, SignalValue};

#[test]
fn test_bool_literals() {
    for raw in ["ON", "on", "TRUE", "1", "yes", " True "] {
        assert_eq!(parse_bool_literal(raw), Some(true), "{raw}");
    }
    for raw in ["OFF", "false", "0", "NO"] {
        assert_eq!(parse_bool_literal(raw), Some(false), "{raw}");
    }
    assert_eq!(parse_bool_literal("2"), None);
    assert_eq!(parse_bool_literal("ENABLED"), None);
}

#[test]
fn test_integer_literals() {
    assert_eq!(parse_integer("42"), Some(42));
    assert_eq!(parse_integer("-17"), Some(-17));
    assert_eq!(parse_integer("+8"), Some(8));
    assert_eq!(parse_integer("0x1F"), Some(31));
    assert_eq!(parse_integer("0b101"), Some(5));
    assert_eq!(parse_integer("0o17"), Some(15));
    assert_eq!(parse_integer("1,234,567"), Some(1_234_567));
    assert_eq!(parse_integer("1_000"), Some(1000));
    assert_eq!(parse_integer("-9223372036854775808"), Some(i64::MIN));

    assert_eq!(parse_integer("9223372036854775808"), None);
    assert_eq!(parse_integer("3.14"), None);
    assert_eq!(parse_integer("_1"), None);
    assert_eq!(parse_integer("0x"), None);
    assert_eq!(parse_integer(""), None);
    assert_eq!(parse_integer("-"), None);
}

#[test]
fn test_infer_type_precedence() {
    assert_eq!(infer_type("1"), SignalType::Boolean);
    assert_eq!(infer_type("10"), SignalType::Integer);
    assert_eq!(infer_type("AUTO"), SignalType::String);
    assert_eq!(infer_value("  ON "), SignalValue::Boolean(true));
    assert_eq!(infer_value("250"), SignalValue::Integer(250));
    assert_eq!(infer_value("EQ-01"), SignalValue::String("EQ-01".into()));
}

#[test]
fn test_declared_type_falls_back_to_string() {
    let v = typed_value("maybe", SignalType::Boolean);
    assert_eq!(v, SignalValue::String("maybe".into()));
    assert_eq!(v.signal_type(), SignalType::String);
    assert_eq!(typed_value("7", SignalType::String), SignalValue::String("7".into()));
}

#[test]
fn test_timestamp_parsing() {
    assert_eq!(parse_timestamp("1970-01-01 00:00:01.5"), Some(1500));
    assert_eq!(parse_timestamp("1970-01-01 00:00:00.123456"), Some(123));
    assert_eq!(parse_timestamp("1970-01-01T00:01:00"), Some(60_000));
    assert_eq!(parse_timestamp("2024-01-15 08:30:00.123"), Some(1_705_307_400_123));

    assert_eq!(parse_timestamp("2024-13-01 00:00:00"), None);
    assert_eq!(parse_timestamp("2024-02-30 00:00:00"), None);
    assert_eq!(parse_timestamp("2024-01-15 08:30"), None);
    assert_eq!(parse_timestamp("2024-01-15 08:30:00."), None);
    assert_eq!(parse_timestamp("not a time"), None);
}

#[test]
fn test_device_id_extraction() {
    assert_eq!(extract_device_id("Line1/Cell2/Robot-01"), Some("Robot-01"));
    assert_eq!(extract_device_id(r"PLC\Zone_A\Conveyor_3"), Some("Conveyor_3"));
    assert_eq!(extract_device_id("Station@backup"), Some("Station"));
    assert_eq!(extract_device_id("[Main]Press7"), Some("Press7"));
    assert_eq!(extract_device_id("Line1/"), None);
    assert_eq!(extract_device_id("Line1/Robot 01"), None);
}

#[test]
fn test_entry_wire_shape() {
    let entry = crate::types::LogEntry::new("Robot-01", "Ready", 1_700_000_000_000, SignalValue::Boolean(true))
        .with_category(Some(String::new()));
    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["deviceId"], "Robot-01");
    assert_eq!(json["signalName"], "Ready");
    assert_eq!(json["value"], true);
    assert_eq!(json["signalType"], "boolean");
    assert!(json.get("category").is_none());
    assert!(json.get("sourceId").is_none());

    let back: crate::types::LogEntry = serde_json::from_value(json).unwrap();
    assert_eq!(back.signal_type, SignalType::Boolean);
}
