// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! plcscope-kernel: PLC log entry model, streaming dialect parsers and the
//! multi-source merge engine.

pub mod config;
pub mod error;
pub mod types;
pub mod parser;
pub mod merge;

pub use error::{KernelError, KernelResult};
pub use types::{LogEntry, ParseError, SignalType, SignalValue};

#[cfg(test)]
pub mod tests;
