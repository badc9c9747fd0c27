//! Text framing for the WebSocket transport.
//!
//! Every request is one WebSocket text frame holding a single JSON object
//! followed by a newline. Responses are read into a bounded buffer: a body
//! longer than the limit is cut short rather than reassembled.

use crate::{Error, Request};

/// Frame terminator appended to every request.
pub const FRAME_TERMINATOR: char = '\n';

/// Default receive capacity (512 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 512 * 1024;

/// Maximum encoded request size (4 MB).
pub const MAX_REQUEST_SIZE: usize = 4 * 1024 * 1024;

/// Encode a request as a newline-terminated JSON text frame.
///
/// Caller text is escaped by the JSON encoder, so quotes and control
/// characters in SQL or command text cannot break out of their field.
pub fn encode_frame(request: &Request) -> Result<String, Error> {
    let mut frame = serde_json::to_string(request)
        .map_err(|e| Error::Serialization(format!("failed to serialize request: {}", e)))?;

    if frame.len() + 1 > MAX_REQUEST_SIZE {
        return Err(Error::RequestTooLarge {
            size: frame.len() + 1,
            max: MAX_REQUEST_SIZE,
        });
    }

    frame.push(FRAME_TERMINATOR);
    Ok(frame)
}

/// Cut a received frame down to at most `max` bytes.
///
/// The cut lands on a UTF-8 character boundary. Returns the kept text and
/// whether anything was dropped.
pub fn truncate_frame(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }

    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}
