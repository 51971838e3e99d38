//! Raw-mode chunk tagging.
//!
//! In tagging mode the server does not speak the JSON protocol.  Instead every
//! chunk read from a socket is stamped with the port and session it arrived on,
//! so a downstream consumer can demultiplex traffic from many thousands of open
//! sockets without keeping its own routing table.
//!
//! Wire format of one chunk:
//! ```text
//! [port:4][session_id:4][payload:0..=4088]
//! ```
//! Both header fields are big-endian `u32`.  The header is repeated on every
//! chunk, so any chunk can be routed on its own even if chunks are processed
//! out of arrival order.

use thiserror::Error;

use crate::protocol::session_id::SessionId;

/// Size of the `(port, session_id)` header in bytes.
pub const TAG_HEADER_SIZE: usize = 8;

/// Size of the per-connection read buffer, header included.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Largest payload a single chunk can carry.
pub const MAX_CHUNK_PAYLOAD: usize = READ_BUFFER_SIZE - TAG_HEADER_SIZE;

/// Errors produced when parsing a tagged chunk.
#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    /// Fewer bytes than a full header.
    #[error("chunk too short: {0} bytes, header needs {TAG_HEADER_SIZE}")]
    ShortChunk(usize),

    /// The port field does not fit in a TCP port number.
    #[error("invalid port in chunk header: {0}")]
    InvalidPort(u32),
}

/// Origin of a chunk: the port it arrived on and the session on that port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionTag {
    pub port: u16,
    pub session_id: SessionId,
}

impl SessionTag {
    pub fn new(port: u16, session_id: SessionId) -> Self {
        Self { port, session_id }
    }

    /// Encodes the 8-byte chunk header for this session.
    pub fn header(&self) -> [u8; TAG_HEADER_SIZE] {
        let mut header = [0u8; TAG_HEADER_SIZE];
        header[..4].copy_from_slice(&u32::from(self.port).to_be_bytes());
        header[4..].copy_from_slice(&self.session_id.to_be_bytes());
        header
    }
}

impl std::fmt::Display for SessionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.port, self.session_id)
    }
}

/// One stamped chunk: header followed by the raw bytes of one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedChunk {
    tag: SessionTag,
    bytes: Vec<u8>,
}

impl TaggedChunk {
    /// Builds a chunk by stamping `payload` with `tag`'s header.
    pub fn stamp(tag: SessionTag, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(TAG_HEADER_SIZE + payload.len());
        bytes.extend_from_slice(&tag.header());
        bytes.extend_from_slice(payload);
        Self { tag, bytes }
    }

    /// Parses a chunk received by a downstream consumer.
    ///
    /// # Errors
    ///
    /// Returns [`TagError::ShortChunk`] if `bytes` is shorter than the header,
    /// or [`TagError::InvalidPort`] if the port field exceeds `u16::MAX`.
    pub fn parse(bytes: &[u8]) -> Result<Self, TagError> {
        if bytes.len() < TAG_HEADER_SIZE {
            return Err(TagError::ShortChunk(bytes.len()));
        }
        let raw_port = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let port = u16::try_from(raw_port).map_err(|_| TagError::InvalidPort(raw_port))?;
        let session_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Ok(Self {
            tag: SessionTag::new(port, session_id),
            bytes: bytes.to_vec(),
        })
    }

    pub fn tag(&self) -> SessionTag {
        self.tag
    }

    /// The raw bytes after the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[TAG_HEADER_SIZE..]
    }

    /// The full stamped chunk, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
