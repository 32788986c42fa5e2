// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::parser::csv::CsvParser;
use crate::parser::mcs::McsParser;
use crate::parser::plc_debug::PlcDebugParser;
use crate::parser::plc_tab::PlcTabParser;
use crate::parser::{parse_stream, LogParser};
use crate::types::{LogEntry, SignalType, SignalValue};
use std::vec::Vec;

const TS: i64 = 1_705_307_400_123;

fn parse_one(parser: &dyn LogParser, line: &str) -> Result<Vec<LogEntry>, &'static str> {
    let mut out = Vec::new();
    parser.parse_line(line, &mut out)?;
    Ok(out)
}

#[test]
fn test_plc_debug_field_mapping() {
    let line = "2024-01-15 08:30:00.123 [Info] [Line1/Cell2/Robot-01] [IO:DoorOpen] (boolean) : ON";
    let entries = parse_one(&PlcDebugParser, line).unwrap();
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.device_id, "Robot-01");
    assert_eq!(e.signal_name, "DoorOpen");
    assert_eq!(e.timestamp, TS);
    assert_eq!(e.value, SignalValue::Boolean(true));
    assert_eq!(e.signal_type, SignalType::Boolean);
    assert_eq!(e.category.as_deref(), Some("IO"));
    assert!(e.source_id.is_none());
}

#[test]
fn test_plc_debug_declared_and_inferred_types() {
    let int_line = "2024-01-15 08:30:00.123 [Info] [A/B/Press] [Motion:Speed] (integer) : 1,200";
    let e = &parse_one(&PlcDebugParser, int_line).unwrap()[0];
    assert_eq!(e.value, SignalValue::Integer(1200));

    let str_line = "2024-01-15 08:30:00.123 [Info] [A/B/Press] [Mode:State] (string) : 1";
    let e = &parse_one(&PlcDebugParser, str_line).unwrap()[0];
    assert_eq!(e.value, SignalValue::String("1".into()));

    let odd_line = "2024-01-15 08:30:00.123 [Info] [A/B/Press] [Mode:State] (word) : 15";
    let e = &parse_one(&PlcDebugParser, odd_line).unwrap()[0];
    assert_eq!(e.signal_type, SignalType::Integer);
}

#[test]
fn test_plc_debug_rejections() {
    let p = PlcDebugParser;
    assert_eq!(
        parse_one(&p, "garbage").unwrap_err(),
        "line does not match PLC debug format"
    );
    assert_eq!(
        parse_one(&p, "2024-99-15 08:30:00.123 [Info] [A/Robot] [IO:X] (boolean) : ON").unwrap_err(),
        "invalid timestamp"
    );
    assert_eq!(
        parse_one(&p, "2024-01-15 08:30:00.123 [Info] [A/Robot 1] [IO:X] (boolean) : ON").unwrap_err(),
        "device ID not found in path"
    );
    assert_eq!(
        parse_one(&p, "2024-01-15 08:30:00.123 [Info] [A/Robot] [NoColon] (boolean) : ON").unwrap_err(),
        "line does not match PLC debug format"
    );
}

#[test]
fn test_plc_tab_field_mapping() {
    let line = "2024-01-15 08:30:00.123 [] Line1/Robot-01\tReady\tOUT\t1\tx\ty\tz\t2024-01-15 08:30:00.120";
    let p = PlcTabParser;
    assert!(p.accepts(line));
    let entries = parse_one(&p, line).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].device_id, "Robot-01");
    assert_eq!(entries[0].signal_name, "Ready");
    assert_eq!(entries[0].value, SignalValue::Boolean(true));
    assert_eq!(entries[0].category, None);

    let short = "2024-01-15 08:30:00.123 [] Line1/Robot-01\tReady\tOUT\t1";
    assert!(!p.accepts(short));
    assert_eq!(parse_one(&p, short).unwrap_err(), "line does not match PLC tab format");
}

#[test]
fn test_mcs_emits_action_command_and_pairs() {
    let line = "2024-01-15 08:30:00.123 [UPDATE=CMD001, CARRIER01] [Priority=5], [IsBoost=1], \
                [CarrierLoc=EQ01], [TransferState=2], [Note=None], [Empty=], [Flag=FALSE]";
    let p = McsParser;
    assert!(p.accepts(line));
    let entries = parse_one(&p, line).unwrap();

    let by_name = |name: &str| entries.iter().find(|e| e.signal_name == name).cloned();
    assert!(entries.iter().all(|e| e.device_id == "CARRIER01" && e.timestamp == TS));
    assert_eq!(by_name("_Action").unwrap().value, SignalValue::String("UPDATE".into()));
    assert_eq!(by_name("_CommandID").unwrap().value, SignalValue::String("CMD001".into()));
    assert_eq!(by_name("Priority").unwrap().value, SignalValue::Integer(5));
    assert_eq!(by_name("IsBoost").unwrap().value, SignalValue::Boolean(true));
    assert_eq!(by_name("CurrentLocation").unwrap().value, SignalValue::String("EQ01".into()));
    assert_eq!(by_name("TransferState").unwrap().value, SignalValue::String("2".into()));
    assert_eq!(by_name("Flag").unwrap().value, SignalValue::Boolean(false));
    assert!(by_name("Note").is_none());
    assert!(by_name("Empty").is_none());
    assert!(by_name("CarrierLoc").is_none());
    assert_eq!(entries.len(), 7);
}

#[test]
fn test_mcs_single_id_is_carrier() {
    let line = "2024-01-15 08:30:00.123 [REMOVE=CARRIER02]";
    let entries = parse_one(&McsParser, line).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].device_id, "CARRIER02");
    assert_eq!(entries[0].signal_name, "_Action");
    assert_eq!(
        parse_one(&McsParser, "2024-01-15 08:30:00.123 [MOVE=X]").unwrap_err(),
        "line does not match MCS format"
    );
}

#[test]
fn test_csv_field_mapping() {
    let p = CsvParser;
    let e = &parse_one(&p, "2024-01-15 08:30:00.123,Line1/Robot-01,Mode,AUTO,MANUAL").unwrap()[0];
    assert_eq!(e.device_id, "Robot-01");
    assert_eq!(e.signal_name, "Mode");
    assert_eq!(e.value, SignalValue::String("AUTO,MANUAL".into()));

    // Unparseable path keeps the raw device text.
    let e = &parse_one(&p, "2024-01-15 08:30:00.123,Robot 01,Mode,3").unwrap()[0];
    assert_eq!(e.device_id, "Robot 01");

    assert!(parse_one(&p, "Timestamp,Device,Signal,Value").unwrap().is_empty());
    assert_eq!(parse_one(&p, "2024-01-15,Robot,Mode,1").unwrap_err(), "invalid timestamp");
    assert_eq!(parse_one(&p, "a,b").unwrap_err(), "line does not match CSV signal format");
}

#[test]
fn test_stream_records_errors_and_continues() {
    let input = "\u{feff}2024-01-15 08:30:00.123,Robot-01,A,1\n\
                 \n\
                 broken line\n\
                 2024-01-15 08:30:00.124,Robot-01,A,0\r\n";
    let mut sink: Vec<LogEntry> = Vec::new();
    let mut calls = 0;
    let summary = parse_stream(&CsvParser, input.as_bytes(), &mut sink, &mut |_| {
        calls += 1;
        true
    })
    .unwrap();

    assert_eq!(summary.parser, "csv_signal");
    assert_eq!(summary.lines, 4);
    assert_eq!(summary.entries, 2);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.errors[0].line, 3);
    assert_eq!(summary.errors[0].content, "broken line");
    assert_eq!(sink.len(), 2);
    assert_eq!(sink[1].value, SignalValue::Boolean(false));
    assert!(calls >= 1);
}

#[test]
fn test_stream_cancellation() {
    let input = "2024-01-15 08:30:00.123,Robot-01,A,1\n";
    let mut sink: Vec<LogEntry> = Vec::new();
    let result = parse_stream(&CsvParser, input.as_bytes(), &mut sink, &mut |_| false);
    assert!(matches!(result, Err(crate::error::KernelError::Cancelled)));
}
