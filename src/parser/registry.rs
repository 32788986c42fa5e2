// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Dialect detection.

use std::io::{BufRead, Cursor, Read};

use super::csv::CsvParser;
use super::mcs::McsParser;
use super::plc_debug::PlcDebugParser;
use super::plc_tab::PlcTabParser;
use super::{parse_stream, EntrySink, LogParser, ParseProgress, ParseSummary};
use crate::error::{KernelError, KernelResult};

/// Ordered set of candidate parsers. The first one whose signature check
/// accepts the first non-empty line owns the whole stream.
pub struct Registry {
    parsers: Vec<Box<dyn LogParser>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            parsers: vec![
                Box::new(PlcDebugParser),
                Box::new(PlcTabParser),
                Box::new(McsParser),
                Box::new(CsvParser),
            ],
        }
    }
}

impl Registry {
    pub fn names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }

    pub fn detect(&self, first_line: &str) -> Option<&dyn LogParser> {
        let line = first_line.trim_start_matches('\u{feff}');
        self.parsers
            .iter()
            .find(|p| p.accepts(line))
            .map(|p| p.as_ref())
    }

    /// Detects the dialect from the first non-empty line, then parses the
    /// whole stream with it. Lines read during detection are replayed so
    /// line numbers stay exact.
    pub fn parse<R, S>(
        &self,
        mut reader: R,
        sink: &mut S,
        progress: &mut dyn FnMut(&ParseProgress) -> bool,
    ) -> KernelResult<ParseSummary>
    where
        R: BufRead,
        S: EntrySink + ?Sized,
    {
        let mut head = Vec::new();
        let mut line = Vec::new();
        let first = loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                return Err(KernelError::EmptyInput);
            }
            head.extend_from_slice(&line);
            let text = String::from_utf8_lossy(&line);
            let candidate = text
                .trim_start_matches('\u{feff}')
                .trim_end_matches(|c| c == '\n' || c == '\r');
            if !candidate.trim().is_empty() {
                break candidate.to_string();
            }
        };

        let parser = self
            .detect(&first)
            .ok_or_else(|| KernelError::UnknownFormat(first.chars().take(120).collect()))?;

        parse_stream(parser, Cursor::new(head).chain(reader), sink, progress)
    }
}
