//! Error kinds raised by schema arithmetic and pooling.
//!
//! Decode/encode failures here are caller-visible: they never panic. A
//! `BufferTooSmall` on decode is the caller's problem to log, not a reason
//! to tear down whatever peer or session produced the bytes.

use thiserror::Error;

/// Errors raised while reading or writing a schema-described record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// `decode`/`read` was given fewer bytes than the schema requires.
    #[error("buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// A string value's UTF-8 byte length exceeds the field's declared max.
    #[error("string field '{field}' overflows max_bytes={max_bytes} (got {actual} bytes)")]
    StringOverflow {
        field: &'static str,
        max_bytes: usize,
        actual: usize,
    },

    /// Bytes at a string field's body were not valid UTF-8.
    #[error("string field '{field}' is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
}
