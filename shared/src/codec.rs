//! Chunked message framing over a byte stream.
//!
//! A message body is the bincode encoding of [`WireFrame`]. The body is cut into
//! chunks of at most `CHUNK_SIZE - CHUNK_HEADER` bytes; each chunk carries a
//! one-byte marker and a big-endian `u16` length:
//!
//! ```text
//! [b'C'][len][..bytes..]  continuation, more chunks follow
//! [b'E'][len][..bytes..]  terminal chunk, the message is complete
//! ```
//!
//! Chunks are length-delimited, so parameters may carry arbitrary text.

use crate::message::{Action, Message, ProtocolError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest chunk written to the stream, header included.
pub const CHUNK_SIZE: usize = 1024;
pub const CHUNK_HEADER: usize = 3;
pub const CONTINUE_MARKER: u8 = b'C';
pub const END_MARKER: u8 = b'E';
/// Upper bound on a reassembled message body.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

const CHUNK_PAYLOAD: usize = CHUNK_SIZE - CHUNK_HEADER;

/// Framing failure. Unlike [`ProtocolError`] the stream position is lost, so the
/// connection cannot continue.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid chunk marker 0x{0:02x}")]
    BadMarker(u8),
    #[error("message of {0} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit")]
    Oversized(usize),
    #[error("failed to serialize message: {0}")]
    Encode(String),
}

/// Result of decoding one complete chunk sequence.
pub type Decoded = Result<Message, ProtocolError>;

#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    timestamp: u64,
    #[serde(rename = "type")]
    kind: String,
    action: String,
    parameters: Option<String>,
}

/// Encodes one message into its full chunk sequence.
pub fn encode(message: &Message) -> Result<Vec<u8>, FrameError> {
    let frame = WireFrame {
        timestamp: message.timestamp,
        kind: message.message_type().as_str().to_string(),
        action: message.action.as_str().to_string(),
        parameters: message.parameters.clone(),
    };
    let body = bincode::serialize(&frame).map_err(|e| FrameError::Encode(e.to_string()))?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::Oversized(body.len()));
    }

    let chunk_count = body.len().div_ceil(CHUNK_PAYLOAD).max(1);
    let mut out = Vec::with_capacity(body.len() + chunk_count * CHUNK_HEADER);

    let mut chunks = body.chunks(CHUNK_PAYLOAD).peekable();
    if chunks.peek().is_none() {
        push_chunk(&mut out, END_MARKER, &[]);
    }
    while let Some(chunk) = chunks.next() {
        let marker = if chunks.peek().is_some() {
            CONTINUE_MARKER
        } else {
            END_MARKER
        };
        push_chunk(&mut out, marker, chunk);
    }
    Ok(out)
}

fn push_chunk(out: &mut Vec<u8>, marker: u8, bytes: &[u8]) {
    out.push(marker);
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Decodes every complete message at the front of `buf`.
///
/// Returns the decoded messages in stream order together with the number of
/// bytes consumed. Bytes of a trailing, still incomplete chunk sequence are not
/// consumed and must be presented again once more data has arrived.
pub fn decode(buf: &[u8]) -> Result<(Vec<Decoded>, usize), FrameError> {
    let mut messages = Vec::new();
    let mut consumed = 0;
    let mut cursor = 0;
    let mut body: Vec<u8> = Vec::new();

    while buf.len() - cursor >= CHUNK_HEADER {
        let marker = buf[cursor];
        if marker != CONTINUE_MARKER && marker != END_MARKER {
            return Err(FrameError::BadMarker(marker));
        }
        let len = u16::from_be_bytes([buf[cursor + 1], buf[cursor + 2]]) as usize;
        let start = cursor + CHUNK_HEADER;
        if buf.len() - start < len {
            break;
        }
        if body.len() + len > MAX_MESSAGE_SIZE {
            return Err(FrameError::Oversized(body.len() + len));
        }
        body.extend_from_slice(&buf[start..start + len]);
        cursor = start + len;

        if marker == END_MARKER {
            messages.push(decode_body(&body));
            body.clear();
            consumed = cursor;
        }
    }

    Ok((messages, consumed))
}

fn decode_body(body: &[u8]) -> Decoded {
    let frame: WireFrame =
        bincode::deserialize(body).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let action = Action::parse(&frame.kind, &frame.action)?;
    Ok(Message {
        timestamp: frame.timestamp,
        action,
        parameters: frame.parameters,
    })
}
