//! Client error types.

use thiserror::Error;

/// Message recorded when connect is called on an open session.
pub const ALREADY_CONNECTED_MESSAGE: &str = "already connected to mapepire server; existing connection will be used unless you disconnect first";

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Connect was called while a session is open. Not fatal.
    #[error("{}", ALREADY_CONNECTED_MESSAGE)]
    AlreadyConnected,

    /// Operation attempted without an open session.
    #[error("not connected to mapepire server")]
    NotConnected,

    /// Handshake, send, or receive failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered but reported failure.
    #[error("server reported failure: {0}")]
    ServerReported(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] mapepire_proto::Error),

    /// No response within the request timeout.
    #[error("request timed out")]
    Timeout,

    /// The pending exchange was cancelled.
    #[error("request cancelled")]
    Cancelled,
}

/// Error classification, kept after the error itself is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    AlreadyConnected,
    NotConnected,
    Transport,
    ServerReported,
    MalformedResponse,
    Protocol,
    Timeout,
    Cancelled,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyConnected => ErrorKind::AlreadyConnected,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Transport(_) => ErrorKind::Transport,
            Error::ServerReported(_) => ErrorKind::ServerReported,
            Error::Protocol(mapepire_proto::Error::MalformedResponse(_)) => {
                ErrorKind::MalformedResponse
            }
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Timeout => ErrorKind::Timeout,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the connection can no longer be trusted after this error.
    ///
    /// A stray or missing frame breaks request/response correlation, so
    /// these end the session.
    pub fn ends_session(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Timeout
                | Error::Cancelled
                | Error::Protocol(mapepire_proto::Error::IdMismatch { .. })
        )
    }
}
