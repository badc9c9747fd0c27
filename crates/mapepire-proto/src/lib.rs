//! Mapepire protocol types and serialization.
//!
//! This crate defines the wire protocol spoken with a Mapepire database
//! server: newline-terminated JSON text frames carried over a WebSocket.
//! It knows nothing about sockets or session state.
//!
//! # Modules
//!
//! - [`message`] - Request envelopes and operation kinds
//! - [`response`] - Response decoding
//! - [`framing`] - Text frame encoding and bounded reads
//! - [`error`] - Protocol error types
//!
//! # Example
//!
//! ```
//! use mapepire_proto::{framing, OperationKind, Request, Response};
//!
//! let frame = framing::encode_frame(&Request::sql("Q1", "VALUES 1")).unwrap();
//! assert_eq!(frame, "{\"id\":\"Q1\",\"type\":\"sql\",\"sql\":\"VALUES 1\"}\n");
//!
//! let response = Response::decode(r#"{"id":"Q1","success":true}"#, OperationKind::Sql).unwrap();
//! assert!(response.success);
//! ```

pub mod error;
pub mod framing;
pub mod message;
pub mod response;

pub use error::Error;

// Re-export commonly used types at crate root
pub use message::{
    Operation, OperationKind, Request, Technique, CONNECT_ID, DEFAULT_COMMAND_ID,
    DEFAULT_PING_ID, DEFAULT_QUERY_ID,
};
pub use response::{Column, Metadata, Response};

/// Path of the database endpoint on the server.
pub const ENDPOINT_PATH: &str = "/db";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8076;
