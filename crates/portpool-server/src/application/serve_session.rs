//! Session connection handler for the framed JSON protocol.
//!
//! One call to [`serve_protocol_session`] drives one accepted connection
//! through the loop
//!
//! ```text
//! AWAITING_FRAME → DECODING → DISPATCHING → SENDING → AWAITING_FRAME
//! ```
//!
//! until the peer closes or the transport fails.  The protocol is strictly
//! request → response: exactly one message is in flight, and responses are
//! written in the order requests arrived.
//!
//! # Error policy
//!
//! | Failure                         | Effect                                  |
//! |---------------------------------|-----------------------------------------|
//! | peer closes between frames      | session ends cleanly                    |
//! | oversized or truncated frame    | session ends (framing can't be trusted) |
//! | any other read error            | session ends                            |
//! | malformed JSON                  | `error` frame sent, session continues   |
//! | unknown action / handler error  | `error` frame sent, session continues   |
//! | response over the size limit    | `error` frame sent, session continues   |
//! | writing a response              | session ends                            |

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use portpool_core::{encode_frame, read_frame, FrameError, Message, SessionTag};

use crate::application::dispatch::ActionRegistry;
use crate::application::tag_traffic::SinkError;

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the connection between frames.
    PeerClosed,
    /// Nothing arrived within the configured idle timeout.
    IdleTimeout(Duration),
    /// Reading from the connection failed or violated the framing rules.
    Transport(FrameError),
    /// A response could not be encoded or written.
    SendFailed(FrameError),
    /// The downstream sink refused a tagged chunk.
    SinkFailed(SinkError),
    /// Echo mode: a line exceeded the length limit without a newline.
    LineTooLong { max: usize },
}

impl SessionEnd {
    /// `true` for endings that are part of normal operation.
    pub fn is_expected(&self) -> bool {
        matches!(self, SessionEnd::PeerClosed | SessionEnd::IdleTimeout(_))
    }
}

/// Outcome of one finished session, for logging.
#[derive(Debug)]
pub struct SessionSummary {
    pub tag: SessionTag,
    /// Responses written (protocol mode), chunks delivered (tagging mode), or
    /// lines echoed (echo mode).
    pub frames: u64,
    /// `error` frames sent back to the peer.
    pub errors_reported: u64,
    pub end: SessionEnd,
}

impl SessionSummary {
    pub(crate) fn new(tag: SessionTag) -> Self {
        Self {
            tag,
            frames: 0,
            errors_reported: 0,
            end: SessionEnd::PeerClosed,
        }
    }

    pub(crate) fn ended(mut self, end: SessionEnd) -> Self {
        self.end = end;
        self
    }

    /// Logs the ending at info level when expected, warn otherwise.
    pub fn log(&self) {
        let tag = self.tag;
        match &self.end {
            SessionEnd::PeerClosed => {
                info!("session {tag} closed by peer after {} frame(s)", self.frames)
            }
            SessionEnd::IdleTimeout(limit) => {
                info!("session {tag} idle for {limit:?}; closing")
            }
            SessionEnd::Transport(e) => warn!("session {tag} transport error: {e}"),
            SessionEnd::SendFailed(e) => warn!("session {tag} failed to send response: {e}"),
            SessionEnd::SinkFailed(e) => warn!("session {tag} downstream sink failed: {e}"),
            SessionEnd::LineTooLong { max } => {
                warn!("session {tag} sent a line longer than {max} bytes; closing")
            }
        }
    }
}

/// Runs the request/response loop on `stream` until the session ends.
///
/// `idle_timeout` bounds the wait for the first byte of each new frame;
/// `None` waits forever.  Once a frame has started arriving it is read to the
/// end without a deadline.
pub async fn serve_protocol_session<S>(
    stream: &mut S,
    tag: SessionTag,
    registry: &ActionRegistry,
    idle_timeout: Option<Duration>,
) -> SessionSummary
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut summary = SessionSummary::new(tag);
    let mut stream = BufReader::new(stream);

    loop {
        // ── AWAITING_FRAME ────────────────────────────────────────────────────
        if let Some(end) = await_next_byte(&mut stream, idle_timeout).await {
            return summary.ended(end);
        }

        // ── DECODING / DISPATCHING ────────────────────────────────────────────
        let response = match read_frame(&mut stream).await {
            Ok(request) => {
                debug!("session {tag}: received '{}'", request.action);
                match registry.dispatch(&request) {
                    Ok(response) => response,
                    Err(e) => {
                        debug!("session {tag}: dispatch error: {e}");
                        summary.errors_reported += 1;
                        Message::error(e.to_string())
                    }
                }
            }
            Err(FrameError::MalformedMessage(detail)) => {
                debug!("session {tag}: malformed message: {detail}");
                summary.errors_reported += 1;
                Message::error(format!("invalid message format: {detail}"))
            }
            Err(e) if e.is_clean_close() => return summary.ended(SessionEnd::PeerClosed),
            Err(e) => return summary.ended(SessionEnd::Transport(e)),
        };

        // ── SENDING ───────────────────────────────────────────────────────────
        let frame = match encode_frame(&response) {
            Ok(frame) => frame,
            // The request was fine and framing is intact; tell the peer.
            Err(FrameError::MessageTooLarge { declared, max }) => {
                debug!("session {tag}: '{}' response too large", response.action);
                summary.errors_reported += 1;
                let error =
                    Message::error(format!("response too large: {declared} bytes (max {max})"));
                match encode_frame(&error) {
                    Ok(frame) => frame,
                    Err(e) => return summary.ended(SessionEnd::SendFailed(e)),
                }
            }
            Err(e) => return summary.ended(SessionEnd::SendFailed(e)),
        };
        if let Err(e) = send_frame(&mut stream, &frame).await {
            return summary.ended(SessionEnd::SendFailed(FrameError::Io(e)));
        }
        summary.frames += 1;
    }
}

/// Waits until `reader` has at least one unread byte.
///
/// Returns the reason the session must end instead: EOF, a read error, or no
/// byte within `idle_timeout`.  Nothing is consumed, so the caller's next read
/// sees the byte.
pub(crate) async fn await_next_byte<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> Option<SessionEnd>
where
    R: AsyncBufRead + Unpin,
{
    let filled = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.fill_buf()).await {
            Ok(result) => result.map(|buf| !buf.is_empty()),
            Err(_) => return Some(SessionEnd::IdleTimeout(limit)),
        },
        None => reader.fill_buf().await.map(|buf| !buf.is_empty()),
    };

    match filled {
        Ok(true) => None,
        Ok(false) => Some(SessionEnd::PeerClosed),
        Err(e) => Some(SessionEnd::Transport(FrameError::Io(e))),
    }
}

async fn send_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
