// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Streaming, line-oriented dialect parsers.
//!
//! A [`LogParser`] understands one textual dialect. The [`registry::Registry`]
//! picks the first parser whose signature check accepts the first non-empty
//! line, and [`parse_stream`] then drives that parser over the whole input
//! one line at a time, handing entries to an [`EntrySink`] as they are
//! produced. Nothing here buffers more than the current line.

use std::io::BufRead;

use crate::config::{MAX_RECORDED_ERRORS, PROGRESS_REPORT_BYTES};
use crate::error::{KernelError, KernelResult};
use crate::types::{LogEntry, ParseError};

pub mod infer;
pub mod plc_debug;
pub mod plc_tab;
pub mod mcs;
pub mod csv;
pub mod registry;

pub use registry::Registry;

/// One log dialect.
pub trait LogParser: Send + Sync {
    /// Stable dialect name reported on the session (`plc_debug`, ...).
    fn name(&self) -> &'static str;

    /// Cheap signature check against the first non-empty line.
    fn accepts(&self, line: &str) -> bool;

    /// Parses one non-empty line into zero or more entries. On rejection the
    /// returned reason is recorded and nothing is pushed.
    fn parse_line(&self, line: &str, out: &mut Vec<LogEntry>) -> Result<(), &'static str>;
}

/// Receives entries as the parser produces them.
pub trait EntrySink {
    fn accept(&mut self, entry: LogEntry) -> KernelResult<()>;
}

impl EntrySink for Vec<LogEntry> {
    fn accept(&mut self, entry: LogEntry) -> KernelResult<()> {
        self.push(entry);
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseProgress {
    pub bytes_read: u64,
    pub lines: u64,
    pub entries: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ParseSummary {
    pub parser: &'static str,
    pub lines: u64,
    pub entries: u64,
    pub bytes_read: u64,
    /// First `MAX_RECORDED_ERRORS` rejected lines, in input order.
    pub errors: Vec<ParseError>,
    pub error_count: u64,
}

/// Drives `parser` over every line of `reader`.
///
/// `progress` is called roughly every megabyte and once at the end; returning
/// `false` cancels the parse with [`KernelError::Cancelled`].
pub fn parse_stream<R, S>(
    parser: &dyn LogParser,
    mut reader: R,
    sink: &mut S,
    progress: &mut dyn FnMut(&ParseProgress) -> bool,
) -> KernelResult<ParseSummary>
where
    R: BufRead,
    S: EntrySink + ?Sized,
{
    let mut summary = ParseSummary {
        parser: parser.name(),
        ..ParseSummary::default()
    };
    let mut buf = Vec::with_capacity(4096);
    let mut scratch = Vec::with_capacity(16);
    let mut next_report = PROGRESS_REPORT_BYTES;

    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        summary.lines += 1;
        summary.bytes_read += n as u64;

        let text = String::from_utf8_lossy(&buf);
        let mut line = text.trim_end_matches(|c| c == '\n' || c == '\r');
        if summary.lines == 1 {
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }

        if !line.trim().is_empty() {
            scratch.clear();
            match parser.parse_line(line, &mut scratch) {
                Ok(()) => {
                    for entry in scratch.drain(..) {
                        sink.accept(entry)?;
                        summary.entries += 1;
                    }
                }
                Err(reason) => {
                    summary.error_count += 1;
                    if summary.errors.len() < MAX_RECORDED_ERRORS {
                        summary
                            .errors
                            .push(ParseError::new(summary.lines as usize, line, reason));
                    }
                }
            }
        }

        if summary.bytes_read >= next_report {
            next_report = summary.bytes_read + PROGRESS_REPORT_BYTES;
            if !progress(&snapshot(&summary)) {
                return Err(KernelError::Cancelled);
            }
        }
    }

    if !progress(&snapshot(&summary)) {
        return Err(KernelError::Cancelled);
    }
    Ok(summary)
}

fn snapshot(summary: &ParseSummary) -> ParseProgress {
    ParseProgress {
        bytes_read: summary.bytes_read,
        lines: summary.lines,
        entries: summary.entries,
    }
}

/// Returns the first `[...]` group of `s` (after leading whitespace) and the
/// remainder following the closing bracket.
pub(crate) fn take_bracket(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start().strip_prefix('[')?;
    let close = s.find(']')?;
    Some((&s[..close], &s[close + 1..]))
}
