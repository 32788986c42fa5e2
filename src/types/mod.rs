// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
pub mod value;
pub mod entry;

pub use entry::{signal_key, LogEntry, ParseError};
pub use value::{SignalType, SignalValue};
