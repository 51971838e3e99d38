//! Tagging mode: relay raw socket bytes to a sink, stamped with their origin.
//!
//! Each read of up to [`MAX_CHUNK_PAYLOAD`] bytes becomes one [`TaggedChunk`]
//! whose 8-byte header carries the listener port and the session id.  The
//! header is written afresh for every chunk, so no chunk ever carries another
//! session's origin.
//!
//! What happens to a chunk after tagging is up to the [`ChunkSink`]:
//!
//! - [`LoggingSink`] counts and logs it (the default when nothing downstream
//!   is configured).
//! - [`ChannelSink`] forwards it into an `mpsc` channel for another task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::debug;

use portpool_core::protocol::tagging::MAX_CHUNK_PAYLOAD;
use portpool_core::{FrameError, SessionTag, TaggedChunk};

use crate::application::serve_session::{SessionEnd, SessionSummary};

/// Failure to hand a chunk downstream.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The receiving side is gone.
    #[error("sink closed")]
    Closed,

    #[error("sink rejected chunk: {0}")]
    Rejected(String),
}

/// Downstream consumer of tagged chunks.
///
/// Shared by every tagging session across all ports, so implementations must
/// tolerate concurrent calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn deliver(&self, chunk: TaggedChunk) -> Result<(), SinkError>;
}

/// Logs every chunk at debug level and keeps running totals.
#[derive(Debug, Default)]
pub struct LoggingSink {
    chunks: AtomicU64,
    bytes: AtomicU64,
}

impl LoggingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunks seen so far.
    pub fn chunks(&self) -> u64 {
        self.chunks.load(Ordering::Relaxed)
    }

    /// Payload bytes seen so far, headers excluded.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ChunkSink for LoggingSink {
    async fn deliver(&self, chunk: TaggedChunk) -> Result<(), SinkError> {
        let len = chunk.payload().len() as u64;
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(len, Ordering::Relaxed);
        debug!("tagged chunk from {}: {len} byte(s)", chunk.tag());
        Ok(())
    }
}

/// Forwards chunks into a bounded channel.  A full channel applies
/// backpressure to the socket reader.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<TaggedChunk>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<TaggedChunk>) -> Self {
        Self { tx }
    }

    /// Creates a sink together with the receiver it feeds.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TaggedChunk>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn deliver(&self, chunk: TaggedChunk) -> Result<(), SinkError> {
        self.tx.send(chunk).await.map_err(|_| SinkError::Closed)
    }
}

/// Reads `reader` until EOF, delivering each read as one tagged chunk.
///
/// `idle_timeout` bounds the wait for each read; `None` waits forever.
pub async fn relay_tagged_session<R>(
    reader: &mut R,
    tag: SessionTag,
    sink: &dyn ChunkSink,
    idle_timeout: Option<Duration>,
) -> SessionSummary
where
    R: AsyncRead + Unpin,
{
    let mut summary = SessionSummary::new(tag);
    let mut buffer = vec![0u8; MAX_CHUNK_PAYLOAD];

    loop {
        let read = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, reader.read(&mut buffer)).await {
                Ok(result) => result,
                Err(_) => {
                    summary.end = SessionEnd::IdleTimeout(limit);
                    return summary;
                }
            },
            None => reader.read(&mut buffer).await,
        };

        let n = match read {
            Ok(0) => {
                summary.end = SessionEnd::PeerClosed;
                return summary;
            }
            Ok(n) => n,
            Err(e) => {
                summary.end = SessionEnd::Transport(FrameError::Io(e));
                return summary;
            }
        };

        if let Err(e) = sink.deliver(TaggedChunk::stamp(tag, &buffer[..n])).await {
            summary.end = SessionEnd::SinkFailed(e);
            return summary;
        }
        summary.frames += 1;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
