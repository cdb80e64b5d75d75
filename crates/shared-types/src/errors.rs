//! # Shared Error Types

use thiserror::Error;

/// Errors raised while decoding shared entities from their text forms.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded byte length did not match the expected size.
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
