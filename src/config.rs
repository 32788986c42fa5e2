// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Configuration constants.

/// Separator between device id and signal name in a signal key.
pub const SIGNAL_KEY_SEPARATOR: &str = "::";

/// Default fuzzy-dedup window for merged sources, in milliseconds.
pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 1000;

/// Maximum number of `ParseError`s retained per parse. Errors past the cap
/// are still counted.
pub const MAX_RECORDED_ERRORS: usize = 1000;

/// Rejected line content is truncated to this many bytes in a `ParseError`.
pub const MAX_ERROR_CONTENT_LEN: usize = 512;

/// Progress callbacks fire at most once per this many bytes consumed.
pub const PROGRESS_REPORT_BYTES: u64 = 1 << 20;
