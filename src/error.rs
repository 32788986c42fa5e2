// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use thiserror::Error;

/// Fatal ingestion errors. Malformed lines are not errors at this level; they
/// are reported as [`crate::types::ParseError`] records.
#[derive(Error, Debug)]
pub enum KernelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Input contained no non-empty line.
    #[error("input contains no log lines")]
    EmptyInput,
    /// No registered dialect accepted the signature line.
    #[error("no parser recognizes line: {0}")]
    UnknownFormat(String),
    /// The entry sink refused an entry (for example a storage failure).
    #[error("entry sink failed: {0}")]
    Sink(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The consumer asked the parse to stop.
    #[error("parse cancelled")]
    Cancelled,
}

pub type KernelResult<T> = Result<T, KernelError>;
