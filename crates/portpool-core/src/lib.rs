//! # portpool-core
//!
//! Shared library for portpool containing the message model, the frame
//! codec, and the session tagging format.
//!
//! This crate is used by both the server and client applications.
//! It never opens sockets: the codec is written against the generic
//! `tokio::io::{AsyncRead, AsyncWrite}` traits so it can be driven by a TCP
//! stream, an in-memory buffer, or a scripted mock in tests.
//!
//! # Architecture overview
//!
//! portpool accepts raw TCP traffic on a large contiguous range of ports.
//! Each accepted connection either speaks a small request/response protocol
//! or has its raw bytes stamped with the port and session it arrived on.
//!
//! - **`protocol::messages`** – The [`Message`] type: an `action` name plus a
//!   JSON object `payload`.
//!
//! - **`protocol::codec`** – How a message travels over the network: a 4-byte
//!   big-endian length prefix followed by a UTF-8 JSON body, capped at
//!   [`MAX_MESSAGE_SIZE`].
//!
//! - **`protocol::tagging`** – The raw-mode chunk format: an 8-byte
//!   `(port, session_id)` header in front of every chunk read from a socket.
//!
//! - **`protocol::session_id`** – The per-listener counter that hands out
//!   session identifiers.

pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `portpool_core::Message` instead of `portpool_core::protocol::messages::Message`.
pub use protocol::codec::{decode_body, encode_frame, read_frame, write_frame, FrameError};
pub use protocol::messages::{Message, Payload, MAX_MESSAGE_SIZE};
pub use protocol::session_id::{SessionCounter, SessionId};
pub use protocol::tagging::{SessionTag, TagError, TaggedChunk};
