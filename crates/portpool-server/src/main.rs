//! portpool server entry point.
//!
//! Binds a TCP listener on every port of a range and serves each accepted
//! connection in one of three modes:
//!
//! - **protocol** – length-prefixed JSON request/response (`hello`, `echo`).
//! - **tagging**  – raw bytes, each read stamped with `(port, session_id)`.
//! - **echo**     – text lines sent back as `[port N] line`.
//!
//! # Usage
//!
//! ```text
//! portpool-server [OPTIONS]
//!
//! Options:
//!   --config       <PATH>  TOML config file [default: portpool.toml]
//!   --bind         <IP>    Bind address for every listener
//!   --start-port   <PORT>  First port of the range (inclusive)
//!   --end-port     <PORT>  Last port of the range (inclusive)
//!   --mode         <MODE>  protocol | tagging | echo
//!   --idle-timeout <SECS>  Per-session idle timeout, 0 disables
//! ```
//!
//! # Precedence
//!
//! Command-line flag, then environment variable, then config file, then the
//! built-in default.
//!
//! | Variable                 | Flag             |
//! |--------------------------|------------------|
//! | `PORTPOOL_CONFIG`        | `--config`       |
//! | `PORTPOOL_BIND`          | `--bind`         |
//! | `PORTPOOL_START_PORT`    | `--start-port`   |
//! | `PORTPOOL_END_PORT`      | `--end-port`     |
//! | `PORTPOOL_MODE`          | `--mode`         |
//! | `PORTPOOL_IDLE_TIMEOUT`  | `--idle-timeout` |
//!
//! `RUST_LOG` overrides `logging.log_level` from the config file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portpool_server::application::dispatch::ActionRegistry;
use portpool_server::application::tag_traffic::LoggingSink;
use portpool_server::infrastructure::network::listener_pool::{
    ConnectionMode, ConnectionSettings, PortRange,
};
use portpool_server::infrastructure::network::supervisor::PoolSupervisor;
use portpool_server::infrastructure::storage::config::{
    load_config, ListenerMode, ServerConfig, DEFAULT_CONFIG_FILE,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Port-range TCP listener pool.
#[derive(Debug, Parser)]
#[command(
    name = "portpool-server",
    about = "Listens on a range of TCP ports and serves a framed JSON protocol, tags raw traffic, or echoes lines",
    version
)]
struct Cli {
    /// Path to the TOML config file.  A missing file means built-in defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "PORTPOOL_CONFIG")]
    config: PathBuf,

    /// IP address every listener binds on.
    #[arg(long, env = "PORTPOOL_BIND")]
    bind: Option<String>,

    /// First port of the range, inclusive.
    #[arg(long, env = "PORTPOOL_START_PORT")]
    start_port: Option<u16>,

    /// Last port of the range, inclusive.
    #[arg(long, env = "PORTPOOL_END_PORT")]
    end_port: Option<u16>,

    /// What accepted connections speak.
    #[arg(long, value_enum, env = "PORTPOOL_MODE")]
    mode: Option<ListenerMode>,

    /// Seconds a session may sit idle before it is closed.  `0` disables.
    #[arg(long, env = "PORTPOOL_IDLE_TIMEOUT")]
    idle_timeout: Option<u64>,
}

impl Cli {
    /// Layers the flags that were given on top of the file config.
    fn apply_to(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(bind) = self.bind {
            config.pool.bind_address = bind;
        }
        if let Some(start) = self.start_port {
            config.pool.start_port = start;
        }
        if let Some(end) = self.end_port {
            config.pool.end_port = end;
        }
        if let Some(mode) = self.mode {
            config.pool.mode = mode;
        }
        if let Some(secs) = self.idle_timeout {
            config.session.idle_timeout_secs = secs;
        }
        config
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let file_config = load_config(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    let config = cli.apply_to(file_config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.log_level)),
        )
        .init();

    let bind_ip = config.pool.bind_ip()?;
    let range = PortRange::new(config.pool.start_port, config.pool.end_port)?;

    // Kept so the tagging totals can be logged after shutdown.
    let logging_sink = Arc::new(LoggingSink::new());
    let mode = match config.pool.mode {
        ListenerMode::Protocol => ConnectionMode::Protocol {
            registry: Arc::new(ActionRegistry::with_builtins()),
        },
        ListenerMode::Tagging => ConnectionMode::Tagging {
            sink: logging_sink.clone(),
        },
        ListenerMode::Echo => ConnectionMode::Echo,
    };
    let settings = ConnectionSettings {
        mode,
        idle_timeout: config.session.idle_timeout(),
    };

    let mut supervisor = PoolSupervisor::new(bind_ip, settings);
    let report = supervisor
        .start(range)
        .await
        .with_context(|| format!("failed to start listener pool on {bind_ip} ports {range}"))?;
    info!(
        "portpool server running: {} of {} port(s) bound",
        report.bound, report.requested
    );

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = supervisor.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; stopping accept loops");
                shutdown.cancel();
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    supervisor.wait().await;

    if config.pool.mode == ListenerMode::Tagging {
        info!(
            "tagging sink saw {} chunk(s), {} byte(s)",
            logging_sink.chunks(),
            logging_sink.bytes()
        );
    }
    info!("portpool server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
