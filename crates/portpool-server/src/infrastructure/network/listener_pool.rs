//! Port-range listener pool: one TCP listener per port, one accept loop each.
//!
//! # How the pool is laid out
//!
//! ```text
//! PortRange [start, end]
//!   └─ bind_range()       one TcpListener per port, best effort
//!        └─ run_accept_loop()   one task per bound port
//!             └─ serve_connection()   one task per accepted socket
//! ```
//!
//! A port that fails to bind is logged and skipped; large ranges are expected
//! to collide with ports other processes already hold.  Each listener owns its
//! own [`SessionCounter`], the only shared mutable state on a port, so session
//! ids on one port never depend on traffic on another.
//!
//! Accept loops stop when the pool's [`CancellationToken`] is cancelled.  That
//! token is the only shutdown signal; a failed `accept()` is always treated as
//! a genuine error, logged, and retried after a short backoff.

use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use portpool_core::{SessionCounter, SessionTag};

use crate::application::dispatch::ActionRegistry;
use crate::application::echo_lines::echo_lines_session;
use crate::application::serve_session::serve_protocol_session;
use crate::application::tag_traffic::{relay_tagged_session, ChunkSink};

/// Pause after a failed `accept()` before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for pool start-up.
#[derive(Debug, Error, PartialEq)]
pub enum PoolError {
    #[error("invalid port range {start}..={end}: start must be at least 1 and not above end")]
    InvalidRange { start: u16, end: u16 },

    /// Every port in the range failed to bind.
    #[error("none of the {requested} requested port(s) could be bound")]
    NoPortsBound { requested: usize },

    #[error("pool has already been started")]
    AlreadyStarted,
}

// ── Port range ────────────────────────────────────────────────────────────────

/// A validated, inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    start: u16,
    end: u16,
}

impl PortRange {
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidRange`] if `start` is 0 or greater than `end`.
    pub fn new(start: u16, end: u16) -> Result<Self, PoolError> {
        if start == 0 || start > end {
            return Err(PoolError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range covering exactly one port.
    pub fn single(port: u16) -> Result<Self, PoolError> {
        Self::new(port, port)
    }

    pub fn start(&self) -> u16 {
        self.start
    }

    pub fn end(&self) -> u16 {
        self.end
    }

    /// Number of ports in the range.  A validated range is never empty.
    pub fn port_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Result of binding a port range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindReport {
    /// Ports in the requested range.
    pub requested: usize,
    /// Ports that bound successfully.
    pub bound: usize,
    /// Ports that failed to bind, ascending.
    pub failed_ports: Vec<u16>,
}

impl BindReport {
    /// `true` when every requested port bound.
    pub fn is_complete(&self) -> bool {
        self.failed_ports.is_empty()
    }
}

// ── Connection mode ───────────────────────────────────────────────────────────

/// What every accepted connection speaks.
#[derive(Clone)]
pub enum ConnectionMode {
    /// Framed JSON request/response answered by the registry.
    Protocol { registry: Arc<ActionRegistry> },
    /// Raw reads stamped with their origin and handed to the sink.
    Tagging { sink: Arc<dyn ChunkSink> },
    /// Text lines echoed back with the port they arrived on.
    Echo,
}

impl ConnectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionMode::Protocol { .. } => "protocol",
            ConnectionMode::Tagging { .. } => "tagging",
            ConnectionMode::Echo => "echo",
        }
    }
}

/// Per-connection behaviour shared by every accept loop in a pool.
#[derive(Clone)]
pub struct ConnectionSettings {
    pub mode: ConnectionMode,
    /// Bound on the wait for the first byte of each frame, chunk, or line.
    /// `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

// ── Binding ───────────────────────────────────────────────────────────────────

/// One bound port and the session counter that belongs to it.
pub struct PortListener {
    port: u16,
    listener: TcpListener,
    sessions: Arc<SessionCounter>,
}

impl PortListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The counter accept loops draw session ids from.
    pub fn sessions(&self) -> Arc<SessionCounter> {
        Arc::clone(&self.sessions)
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

/// Binds one listener per port in `range`, skipping ports that fail.
///
/// Never fails as a whole: the caller decides what an empty result means.
pub async fn bind_range(ip: IpAddr, range: PortRange) -> (Vec<PortListener>, BindReport) {
    let mut listeners = Vec::with_capacity(range.port_count());
    let mut failed_ports = Vec::new();

    for port in range.ports() {
        let addr = SocketAddr::new(ip, port);
        match TcpListener::bind(addr).await {
            Ok(listener) => {
                debug!("listening on {addr}");
                listeners.push(PortListener {
                    port,
                    listener,
                    sessions: Arc::new(SessionCounter::new()),
                });
            }
            Err(e) => {
                warn!("failed to bind {addr}: {e}");
                failed_ports.push(port);
            }
        }
    }

    let report = BindReport {
        requested: range.port_count(),
        bound: listeners.len(),
        failed_ports,
    };
    (listeners, report)
}

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections on `listener` until `shutdown` is cancelled.
///
/// Each connection gets the port's next session id and its own task.  The
/// listener is dropped (and the port released) when the loop returns;
/// connections already handed off keep running.
pub async fn run_accept_loop(
    listener: PortListener,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
) {
    let PortListener {
        port,
        listener,
        sessions,
    } = listener;

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                let tag = SessionTag::new(port, sessions.next());
                let settings = settings.clone();
                tokio::spawn(async move {
                    serve_connection(stream, peer, tag, settings).await;
                });
            }
            Err(e) => {
                // e.g. file descriptor exhaustion; the listener itself is still usable.
                warn!("accept error on port {port}: {e}");
                if backoff_or_shutdown(&shutdown).await {
                    break;
                }
            }
        }
    }

    debug!("accept loop on port {port} stopped");
}

/// Sleeps for [`ACCEPT_ERROR_BACKOFF`] unless `shutdown` fires first.
///
/// Returns `true` when the accept loop should stop.
async fn backoff_or_shutdown(shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => false,
    }
}

/// Runs one accepted connection to completion in the configured mode.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    tag: SessionTag,
    settings: ConnectionSettings,
) {
    info!("session {tag} opened from {peer}");
    if let Err(e) = stream.set_nodelay(true) {
        debug!("session {tag}: could not set TCP_NODELAY: {e}");
    }

    let summary = match &settings.mode {
        ConnectionMode::Protocol { registry } => {
            serve_protocol_session(&mut stream, tag, registry, settings.idle_timeout).await
        }
        ConnectionMode::Tagging { sink } => {
            relay_tagged_session(&mut stream, tag, sink.as_ref(), settings.idle_timeout).await
        }
        ConnectionMode::Echo => echo_lines_session(&mut stream, tag, settings.idle_timeout).await,
    };
    summary.log();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
