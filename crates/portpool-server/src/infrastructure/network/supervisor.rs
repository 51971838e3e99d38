//! Pool supervisor: owns every accept loop and orders shutdown.
//!
//! ```text
//! start(range)  ──► bind_range ──► one accept-loop task per bound port (JoinSet)
//! shutdown()    ──► cancel token ──► every loop breaks, drops its listener
//! wait()        ──► join every loop task
//! ```
//!
//! The port → session-counter table is filled once by [`PoolSupervisor::start`]
//! and only read afterwards.  [`PoolSupervisor::shutdown`] is idempotent and
//! safe to call from another task through [`PoolSupervisor::shutdown_token`].

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use portpool_core::SessionCounter;

use crate::infrastructure::network::listener_pool::{
    bind_range, run_accept_loop, BindReport, ConnectionSettings, PoolError, PortRange,
};

/// Starts, stops, and inspects one listener pool.
pub struct PoolSupervisor {
    bind_ip: IpAddr,
    settings: ConnectionSettings,
    shutdown: CancellationToken,
    accept_loops: JoinSet<()>,
    ports: BTreeMap<u16, Arc<SessionCounter>>,
    started: bool,
}

impl PoolSupervisor {
    pub fn new(bind_ip: IpAddr, settings: ConnectionSettings) -> Self {
        Self {
            bind_ip,
            settings,
            shutdown: CancellationToken::new(),
            accept_loops: JoinSet::new(),
            ports: BTreeMap::new(),
            started: false,
        }
    }

    /// Binds every port in `range` and starts an accept loop for each one
    /// that bound.
    ///
    /// # Errors
    ///
    /// - [`PoolError::AlreadyStarted`] on a second call.
    /// - [`PoolError::NoPortsBound`] if not a single port could be bound.
    pub async fn start(&mut self, range: PortRange) -> Result<BindReport, PoolError> {
        if self.started {
            return Err(PoolError::AlreadyStarted);
        }
        self.started = true;

        info!(
            "starting {} pool on {} ports {range}",
            self.settings.mode.name(),
            self.bind_ip
        );
        let (listeners, report) = bind_range(self.bind_ip, range).await;
        if listeners.is_empty() {
            return Err(PoolError::NoPortsBound {
                requested: report.requested,
            });
        }

        for listener in listeners {
            self.ports.insert(listener.port(), listener.sessions());
            self.accept_loops.spawn(run_accept_loop(
                listener,
                self.settings.clone(),
                self.shutdown.child_token(),
            ));
        }

        if report.is_complete() {
            info!("bound all {} port(s)", report.bound);
        } else {
            warn!(
                "bound {} of {} port(s); {} failed",
                report.bound,
                report.requested,
                report.failed_ports.len()
            );
        }
        Ok(report)
    }

    /// Signals every accept loop to stop.  Calling it again has no effect.
    ///
    /// Connections that were already accepted are not interrupted.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("shutting down listener pool");
        }
        self.shutdown.cancel();
    }

    /// A handle that triggers [`Self::shutdown`] when cancelled, e.g. from a
    /// signal handler task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Waits until every accept loop has exited.
    ///
    /// Returns immediately if the pool was never started.  A loop that
    /// panicked is logged and does not stop the wait.
    pub async fn wait(&mut self) {
        while let Some(joined) = self.accept_loops.join_next().await {
            if let Err(e) = joined {
                error!("accept loop task failed: {e}");
            }
        }
        info!("all accept loops stopped");
    }

    /// Ports with a running (or stopped) accept loop, ascending.
    pub fn bound_ports(&self) -> Vec<u16> {
        self.ports.keys().copied().collect()
    }

    /// Sessions accepted so far on `port`, or `None` if the port is not in
    /// the pool.
    pub fn sessions_accepted(&self, port: u16) -> Option<u32> {
        self.ports.get(&port).map(|sessions| sessions.issued())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use crate::application::dispatch::ActionRegistry;
    use crate::infrastructure::network::listener_pool::ConnectionMode;

    fn protocol_supervisor() -> PoolSupervisor {
        PoolSupervisor::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            ConnectionSettings {
                mode: ConnectionMode::Protocol {
                    registry: Arc::new(ActionRegistry::with_builtins()),
                },
                idle_timeout: None,
            },
        )
    }

    fn held_port() -> (std::net::TcpListener, u16) {
        let holder = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = holder.local_addr().unwrap().port();
        (holder, port)
    }

    #[tokio::test]
    async fn test_start_with_no_bindable_port_fails() {
        // Arrange
        let (_holder, port) = held_port();
        let mut supervisor = protocol_supervisor();

        // Act
        let result = supervisor.start(PortRange::single(port).unwrap()).await;

        // Assert
        assert_eq!(result, Err(PoolError::NoPortsBound { requested: 1 }));
        assert!(supervisor.bound_ports().is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (holder, port) = held_port();
        drop(holder);
        let mut supervisor = protocol_supervisor();
        supervisor.start(PortRange::single(port).unwrap()).await.unwrap();

        let second = supervisor.start(PortRange::single(port).unwrap()).await;

        assert_eq!(second, Err(PoolError::AlreadyStarted));
        supervisor.shutdown();
        supervisor.wait().await;
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_wait_completes() {
        // Arrange
        let (holder, port) = held_port();
        drop(holder);
        let mut supervisor = protocol_supervisor();
        let report = supervisor.start(PortRange::single(port).unwrap()).await.unwrap();
        assert_eq!(report.bound, 1);

        // Act
        supervisor.shutdown();
        supervisor.shutdown();

        // Assert
        assert!(supervisor.is_shutting_down());
        tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .expect("wait must return after shutdown");
    }

    #[tokio::test]
    async fn test_wait_without_start_returns_immediately() {
        let mut supervisor = protocol_supervisor();
        tokio::time::timeout(Duration::from_secs(1), supervisor.wait())
            .await
            .expect("nothing to wait for");
    }

    #[tokio::test]
    async fn test_sessions_accepted_unknown_port_is_none() {
        let supervisor = protocol_supervisor();
        assert_eq!(supervisor.sessions_accepted(10_000), None);
    }

    #[tokio::test]
    async fn test_cancelling_shared_token_stops_the_pool() {
        let (holder, port) = held_port();
        drop(holder);
        let mut supervisor = protocol_supervisor();
        supervisor.start(PortRange::single(port).unwrap()).await.unwrap();

        supervisor.shutdown_token().cancel();

        tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .expect("external cancel must stop every loop");
        assert!(supervisor.is_shutting_down());
    }
}
