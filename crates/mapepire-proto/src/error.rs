//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Encoded request exceeds the frame limit.
    #[error("request too large: {size} bytes (max: {max})")]
    RequestTooLarge { size: usize, max: usize },

    /// Response body is not a well-formed response object.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Response echoed an identifier other than the one sent.
    #[error("response ID mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },
}
