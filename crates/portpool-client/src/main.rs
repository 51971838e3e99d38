//! portpool client entry point.
//!
//! Connects to one port of a portpool server, sends `hello`, then `echo`
//! with the given text, and logs both responses.
//!
//! ```text
//! portpool-client [OPTIONS]
//!
//! Options:
//!   --addr <HOST:PORT>  Server address [default: 127.0.0.1:10000]
//!   --text <TEXT>       Text sent in the echo request [default: This is a test message]
//! ```

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portpool_client::ProtocolClient;
use portpool_core::Payload;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "portpool-client",
    about = "Sends hello and echo requests to a portpool server",
    version
)]
struct Cli {
    /// Server address as `host:port`.
    #[arg(long, default_value = "127.0.0.1:10000", env = "PORTPOOL_ADDR")]
    addr: String,

    /// Text sent in the echo request.
    #[arg(long, default_value = "This is a test message")]
    text: String,
}

impl Cli {
    fn echo_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("text".to_string(), Value::String(self.text.clone()));
        payload
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut client = ProtocolClient::connect(&cli.addr).await?;
    info!("connected to {}", cli.addr);

    let greeting = client.hello().await.context("hello request failed")?;
    info!("hello_response: {greeting}");

    let echoed = client
        .echo(cli.echo_payload())
        .await
        .context("echo request failed")?;
    info!("echo_response: {}", serde_json::Value::Object(echoed));

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
