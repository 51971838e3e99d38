//! TCP connection to a portpool server speaking the framed JSON protocol.
//!
//! The protocol is strictly request → response, so the client owns a single
//! `TcpStream` and never splits it: every [`ProtocolClient::request`] writes
//! one frame and then reads exactly one frame back.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::debug;

use portpool_core::protocol::messages::actions;
use portpool_core::{read_frame, write_frame, FrameError, Message, Payload};

/// Error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Sending the request or reading the response failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The server answered with an `error` message.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// The server answered with an action other than the one expected.
    #[error("expected '{expected}' response, got '{received}'")]
    UnexpectedResponse { expected: String, received: String },
}

/// One open session with a portpool server.
pub struct ProtocolClient {
    stream: TcpStream,
}

impl ProtocolClient {
    /// Opens a TCP connection to `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Connect`] if the address cannot be resolved or
    /// the connection is refused.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not set TCP_NODELAY: {e}");
        }
        Ok(Self { stream })
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.local_addr()
    }

    pub fn peer_addr(&self) -> std::io::Result<SocketAddr> {
        self.stream.peer_addr()
    }

    /// Sends `msg` and waits for the response frame.
    ///
    /// An `error` response is returned as a normal message here; the typed
    /// helpers below turn it into [`ClientError::Rejected`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Frame`] if the write fails or the connection
    /// closes before a complete response arrives.
    pub async fn request(&mut self, msg: &Message) -> Result<Message, ClientError> {
        debug!("sending '{}'", msg.action);
        write_frame(&mut self.stream, msg).await?;
        let response = read_frame(&mut self.stream).await?;
        debug!("received '{}'", response.action);
        Ok(response)
    }

    /// Sends `hello` with the current Unix time as `timestamp` and returns the
    /// server's greeting text.
    pub async fn hello(&mut self) -> Result<String, ClientError> {
        let mut payload = Payload::new();
        payload.insert("timestamp".to_string(), Value::from(unix_timestamp()));

        let response = self
            .expect_action(&Message::new(actions::HELLO, payload), actions::HELLO_RESPONSE)
            .await?;
        Ok(response.message_text().unwrap_or_default().to_string())
    }

    /// Sends `echo` with `payload` and returns the echoed payload.
    pub async fn echo(&mut self, payload: Payload) -> Result<Payload, ClientError> {
        let response = self
            .expect_action(&Message::new(actions::ECHO, payload), actions::ECHO_RESPONSE)
            .await?;
        Ok(response.payload)
    }

    async fn expect_action(
        &mut self,
        msg: &Message,
        expected: &str,
    ) -> Result<Message, ClientError> {
        let response = self.request(msg).await?;
        if response.is_error() {
            let text = response.message_text().unwrap_or("unspecified error");
            return Err(ClientError::Rejected(text.to_string()));
        }
        if response.action != expected {
            return Err(ClientError::UnexpectedResponse {
                expected: expected.to_string(),
                received: response.action,
            });
        }
        Ok(response)
    }
}

/// Seconds since the Unix epoch; `0` if the clock is set before it.
fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
