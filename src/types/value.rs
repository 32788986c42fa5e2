// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Signal value typing.

use core::fmt;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SignalType {
    Boolean = 0,
    Integer = 1,
    String = 2,
}

impl SignalType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SignalType::Boolean),
            1 => Some(SignalType::Integer),
            2 => Some(SignalType::String),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Boolean => "boolean",
            SignalType::Integer => "integer",
            SignalType::String => "string",
        }
    }

    /// Parses a declared type token such as the `(boolean)` group of a debug
    /// log line. Unknown tokens yield `None` and the caller infers instead.
    pub fn from_declared(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Some(SignalType::Boolean),
            "integer" | "int" => Some(SignalType::Integer),
            "string" | "str" => Some(SignalType::String),
            _ => None,
        }
    }
}

impl Default for SignalType {
    fn default() -> Self {
        SignalType::String
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed signal value. Serializes as the bare JSON value; the type travels
/// alongside as [`SignalType`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl SignalValue {
    pub fn signal_type(&self) -> SignalType {
        match self {
            SignalValue::Boolean(_) => SignalType::Boolean,
            SignalValue::Integer(_) => SignalType::Integer,
            SignalValue::String(_) => SignalType::String,
        }
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Boolean(b) => write!(f, "{}", b),
            SignalValue::Integer(i) => write!(f, "{}", i),
            SignalValue::String(s) => f.write_str(s),
        }
    }
}

impl From<bool> for SignalValue {
    fn from(v: bool) -> Self {
        SignalValue::Boolean(v)
    }
}

impl From<i64> for SignalValue {
    fn from(v: i64) -> Self {
        SignalValue::Integer(v)
    }
}

impl From<&str> for SignalValue {
    fn from(v: &str) -> Self {
        SignalValue::String(v.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(v: String) -> Self {
        SignalValue::String(v)
    }
}
