//! Echo mode: newline-delimited lines sent back with the port they arrived on.
//!
//! Every complete line `L\n` is answered with `[port P] L\n`, where `P` is the
//! listener port.  A trailing partial line at EOF is discarded, and a line that
//! grows past [`MAX_LINE_LEN`] bytes without a newline ends the session.
//!
//! This mode is meant for eyeballing a pool with `nc` or `telnet`: it shows
//! which port a connection landed on without any client-side framing.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use portpool_core::{FrameError, SessionTag};

use crate::application::serve_session::{await_next_byte, SessionEnd, SessionSummary};

/// Longest accepted line, newline included.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// The text put in front of every echoed line.
pub fn line_prefix(port: u16) -> String {
    format!("[port {port}] ")
}

/// Echoes lines on `stream` until the peer closes or the session fails.
///
/// `idle_timeout` bounds the wait for the first byte of each line.
pub async fn echo_lines_session<S>(
    stream: &mut S,
    tag: SessionTag,
    idle_timeout: Option<Duration>,
) -> SessionSummary
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut summary = SessionSummary::new(tag);
    let mut stream = BufReader::new(stream);
    let prefix = line_prefix(tag.port);
    let mut line = Vec::with_capacity(prefix.len() + 128);

    loop {
        if let Some(end) = await_next_byte(&mut stream, idle_timeout).await {
            return summary.ended(end);
        }

        line.clear();
        line.extend_from_slice(prefix.as_bytes());
        let read = match (&mut stream)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .await
        {
            Ok(read) => read,
            Err(e) => return summary.ended(SessionEnd::Transport(FrameError::Io(e))),
        };

        if line.last() != Some(&b'\n') {
            if read == MAX_LINE_LEN {
                return summary.ended(SessionEnd::LineTooLong { max: MAX_LINE_LEN });
            }
            debug!("session {tag}: dropping {read} byte(s) of unterminated line");
            return summary.ended(SessionEnd::PeerClosed);
        }

        if let Err(e) = write_line(&mut stream, &line).await {
            return summary.ended(SessionEnd::SendFailed(FrameError::Io(e)));
        }
        summary.frames += 1;
    }
}

async fn write_line<W>(writer: &mut W, line: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(line).await?;
    writer.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;

    const TAG: SessionTag = SessionTag {
        port: 10_000,
        session_id: 0,
    };

    fn spawn_session(
        idle_timeout: Option<Duration>,
    ) -> (DuplexStream, tokio::task::JoinHandle<SessionSummary>) {
        let (client, mut server) = tokio::io::duplex(MAX_LINE_LEN);
        let handle =
            tokio::spawn(async move { echo_lines_session(&mut server, TAG, idle_timeout).await });
        (client, handle)
    }

    #[test]
    fn test_line_prefix_names_the_port() {
        assert_eq!(line_prefix(10_042), "[port 10042] ");
    }

    #[tokio::test]
    async fn test_each_line_is_echoed_with_port_prefix() {
        // Arrange
        let (mut client, handle) = spawn_session(None);

        // Act – two lines in one write, then close our side.
        client.write_all(b"hello\nsecond line\n").await.unwrap();
        client.shutdown().await.unwrap();
        let mut echoed = String::new();
        client.read_to_string(&mut echoed).await.unwrap();
        let summary = handle.await.unwrap();

        // Assert
        assert_eq!(echoed, "[port 10000] hello\n[port 10000] second line\n");
        assert_eq!(summary.frames, 2);
        assert!(matches!(summary.end, SessionEnd::PeerClosed));
    }

    #[tokio::test]
    async fn test_unterminated_line_at_eof_is_dropped() {
        let (mut client, handle) = spawn_session(None);

        client.write_all(b"complete\npartial").await.unwrap();
        client.shutdown().await.unwrap();
        let mut echoed = String::new();
        client.read_to_string(&mut echoed).await.unwrap();
        let summary = handle.await.unwrap();

        assert_eq!(echoed, "[port 10000] complete\n");
        assert_eq!(summary.frames, 1);
        assert!(summary.end.is_expected());
    }

    #[tokio::test]
    async fn test_line_over_limit_ends_session() {
        let (mut client, handle) = spawn_session(None);

        // The session may hang up before the last bytes are written.
        let _ = client.write_all(&vec![b'x'; MAX_LINE_LEN + 10]).await;
        let summary = handle.await.unwrap();

        assert!(matches!(
            summary.end,
            SessionEnd::LineTooLong { max: MAX_LINE_LEN }
        ));
        assert!(!summary.end.is_expected());
        assert_eq!(summary.frames, 0);
    }

    #[tokio::test]
    async fn test_idle_timeout_ends_echo_session() {
        let (_client, handle) = spawn_session(Some(Duration::from_millis(50)));

        let summary = handle.await.unwrap();

        assert!(matches!(summary.end, SessionEnd::IdleTimeout(_)));
    }

    #[tokio::test]
    async fn test_write_failure_ends_echo_session() {
        // Arrange – one line in, the echo write fails.
        let mut stream = tokio_test::io::Builder::new()
            .read(b"ping\n")
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            ))
            .build();

        // Act
        let summary = echo_lines_session(&mut stream, TAG, None).await;

        // Assert
        assert!(matches!(summary.end, SessionEnd::SendFailed(FrameError::Io(_))));
        assert_eq!(summary.frames, 0);
    }
}
