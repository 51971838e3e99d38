//! Frame codec for encoding and decoding portpool protocol messages.
//!
//! Wire format:
//! ```text
//! [length:4][body:length]
//! ```
//! `length` is a big-endian `u32` equal to the exact byte length of `body`.
//! `body` is a UTF-8 JSON object deserializing to a [`Message`].
//!
//! # Streaming reads
//!
//! TCP is a stream protocol: one `read()` may return part of a frame.  The
//! reader loops until the exact number of bytes is available, and reports a
//! [`FrameError::TruncatedMessage`] if the peer closes the stream first.  A
//! partial message is never returned.
//!
//! The length prefix is checked against [`MAX_MESSAGE_SIZE`] before any body
//! buffer is allocated.  An oversized prefix is not drained: once the limit is
//! violated the length field cannot be trusted, so the caller must close the
//! session.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::messages::{Message, LENGTH_PREFIX_SIZE, MAX_MESSAGE_SIZE};

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream before sending any byte of a new frame.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The length prefix declares a body larger than the allowed maximum.
    #[error("message too large: {declared} bytes (max {max})")]
    MessageTooLarge { declared: usize, max: usize },

    /// The stream ended part-way through a frame.
    #[error("truncated message: expected {expected} bytes, received {received}")]
    TruncatedMessage { expected: usize, received: usize },

    /// The body is not valid JSON, not UTF-8, or not a well-formed message.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The message could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The underlying stream failed (connection reset, broken pipe, ...).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Returns `true` for an orderly end of session: the peer closed the
    /// connection between frames.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }

    /// Returns `true` when the session may continue after reporting the error
    /// to the peer.
    ///
    /// Only a malformed body is recoverable: the frame boundary was honoured,
    /// so the next length prefix is still aligned.  Every other variant is a
    /// transport failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::MalformedMessage(_))
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Message`] into a length-prefixed frame.
///
/// # Errors
///
/// Returns [`FrameError::Serialization`] if JSON serialization fails and
/// [`FrameError::MessageTooLarge`] if the body would exceed
/// [`MAX_MESSAGE_SIZE`] (a conforming peer would reject it).
///
/// # Examples
///
/// ```rust
/// use portpool_core::{decode_body, encode_frame, Message};
///
/// let msg = Message::empty("hello");
/// let frame = encode_frame(&msg).unwrap();
/// assert_eq!(&frame[..4], &(frame.len() as u32 - 4).to_be_bytes());
/// assert_eq!(decode_body(&frame[4..]).unwrap(), msg);
/// ```
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, FrameError> {
    let body = serde_json::to_vec(msg).map_err(|e| FrameError::Serialization(e.to_string()))?;
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLarge {
            declared: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(LENGTH_PREFIX_SIZE + body.len());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Parses a frame body (without its length prefix) into a [`Message`].
///
/// # Errors
///
/// Returns [`FrameError::MalformedMessage`] if the bytes are not a JSON
/// object with a non-empty string `action` and an object (or absent) `payload`.
pub fn decode_body(body: &[u8]) -> Result<Message, FrameError> {
    let msg: Message =
        serde_json::from_slice(body).map_err(|e| FrameError::MalformedMessage(e.to_string()))?;
    if msg.action.is_empty() {
        return Err(FrameError::MalformedMessage(
            "action must not be empty".to_string(),
        ));
    }
    Ok(msg)
}

/// Reads exactly one frame from `reader` and decodes it.
///
/// # Errors
///
/// - [`FrameError::ConnectionClosed`] if the stream ends before the first byte.
/// - [`FrameError::MessageTooLarge`] if the prefix exceeds [`MAX_MESSAGE_SIZE`];
///   the body is not read.
/// - [`FrameError::TruncatedMessage`] if the stream ends mid-prefix or mid-body.
/// - [`FrameError::MalformedMessage`] if the body does not parse.
/// - [`FrameError::Io`] for any other read failure.
pub async fn read_frame<R>(reader: &mut R) -> Result<Message, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let filled = read_until_full(reader, &mut prefix).await?;
    if filled == 0 {
        return Err(FrameError::ConnectionClosed);
    }
    if filled < LENGTH_PREFIX_SIZE {
        return Err(FrameError::TruncatedMessage {
            expected: LENGTH_PREFIX_SIZE,
            received: filled,
        });
    }

    let declared = u32::from_be_bytes(prefix) as usize;
    if declared > MAX_MESSAGE_SIZE {
        return Err(FrameError::MessageTooLarge {
            declared,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; declared];
    let received = read_until_full(reader, &mut body).await?;
    if received < declared {
        return Err(FrameError::TruncatedMessage {
            expected: declared,
            received,
        });
    }

    decode_body(&body)
}

/// Encodes `msg` and writes the whole frame to `writer`, then flushes.
///
/// # Errors
///
/// Returns any [`encode_frame`] error, or [`FrameError::Io`] if the write fails.
pub async fn write_frame<W>(writer: &mut W, msg: &Message) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let frame = encode_frame(msg)?;
    // `write_all` retries partial writes until every byte has been accepted.
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Fills `buf` from `reader`, returning how many bytes were read before EOF.
///
/// Unlike `read_exact`, an early EOF is not an error here; the caller decides
/// whether zero bytes means a clean close or a truncation.
async fn read_until_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }
    Ok(filled)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
