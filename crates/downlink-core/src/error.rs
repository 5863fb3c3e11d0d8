//! Error types for downlink core
//!
//! Decode failures are the only errors raised here. Sequence anomalies are
//! not errors; they are folded into the tracker's loss counter.

use serde_json::error::Category;

/// Main core error type
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Inbound frame could not be decoded
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Outbound envelope could not be encoded
    #[error("encode failed: {0}")]
    Encode(String),

    /// History capacity must be at least one
    #[error("invalid history capacity: {0}")]
    InvalidCapacity(usize),
}

/// Envelope decode errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Zero-length frame
    #[error("empty frame")]
    Empty,

    /// Not valid JSON
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Valid JSON that does not match the envelope schema
    #[error("schema violation: {0}")]
    Schema(String),

    /// Input ended mid-document
    #[error("truncated frame at line {line}, column {column}")]
    Truncated { line: usize, column: usize },
}

impl DecodeError {
    /// Check if the frame was syntactically JSON but structurally wrong
    #[inline]
    #[must_use]
    pub fn is_schema_violation(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Data => Self::Schema(err.to_string()),
            Category::Eof => Self::Truncated {
                line: err.line(),
                column: err.column(),
            },
            Category::Syntax | Category::Io => Self::Syntax {
                line: err.line(),
                column: err.column(),
                message: err.to_string(),
            },
        }
    }
}
