// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::error::KernelError;
use crate::parser::{ParseProgress, Registry};
use crate::types::LogEntry;
use std::vec::Vec;

fn run(registry: &Registry, input: &str) -> Result<(crate::parser::ParseSummary, Vec<LogEntry>), KernelError> {
    let mut sink = Vec::new();
    let summary = registry.parse(input.as_bytes(), &mut sink, &mut |_: &ParseProgress| true)?;
    Ok((summary, sink))
}

#[test]
fn test_priority_order() {
    assert_eq!(Registry::default().names(), vec!["plc_debug", "plc_tab", "mcs_log", "csv_signal"]);
}

#[test]
fn test_detects_each_dialect() {
    let registry = Registry::default();
    let cases = [
        ("2024-01-15 08:30:00.123 [Info] [A/Robot] [IO:Run] (boolean) : ON", "plc_debug"),
        ("2024-01-15 08:30:00.123 [] A/Robot\tRun\tIN\t0\ta\tb\tc\t2024-01-15 08:30:00.100", "plc_tab"),
        ("2024-01-15 08:30:00.123 [ADD=CMD1, CAR1] [Priority=1]", "mcs_log"),
        ("2024-01-15 08:30:00.123,A/Robot,Run,1", "csv_signal"),
        ("timestamp,device,signal,value", "csv_signal"),
    ];
    for (line, expected) in cases {
        assert_eq!(registry.detect(line).map(|p| p.name()), Some(expected), "{line}");
    }
    assert!(registry.detect("hello world").is_none());
}

#[test]
fn test_leading_blank_lines_keep_line_numbers() {
    let input = "\n\n2024-01-15 08:30:00.123,Robot,Run,1\nbad\n";
    let (summary, entries) = run(&Registry::default(), input).unwrap();
    assert_eq!(summary.parser, "csv_signal");
    assert_eq!(entries.len(), 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].line, 4);
}

#[test]
fn test_format_owns_whole_stream() {
    // The second line is valid CSV but the stream belongs to the debug parser.
    let input = "2024-01-15 08:30:00.123 [Info] [A/Robot] [IO:Run] (boolean) : ON\n\
                 2024-01-15 08:30:00.124,A/Robot,Run,1\n";
    let (summary, entries) = run(&Registry::default(), input).unwrap();
    assert_eq!(summary.parser, "plc_debug");
    assert_eq!(entries.len(), 1);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.errors[0].reason, "line does not match PLC debug format");
}

#[test]
fn test_empty_and_unknown_input() {
    let registry = Registry::default();
    assert!(matches!(run(&registry, ""), Err(KernelError::EmptyInput)));
    assert!(matches!(run(&registry, "\n  \n"), Err(KernelError::EmptyInput)));
    assert!(matches!(run(&registry, "what is this\n"), Err(KernelError::UnknownFormat(_))));
}
