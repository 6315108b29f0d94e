//! Command session loop
//!
//! One session per bound stream (serial port or accepted TCP client). The
//! loop polls the stream with a short timeout so cancellation stays
//! responsive, feeds complete request lines through the shared interpreter,
//! and writes each response followed by the line terminator.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::events::{EmulatorEvent, EventBus};
use crate::protocol::{CommandInterpreter, LINE_TERMINATOR, READ_POLL_TIMEOUT_MS};

/// Why a session loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Cancellation token fired
    Cancelled,
    /// Peer closed the stream
    PeerClosed,
    /// Read or write failed
    IoError,
}

/// Drive one request/response session until the peer leaves or we shut down
pub async fn run_session<S>(
    mut stream: S,
    peer: &str,
    interpreter: Arc<CommandInterpreter>,
    events: EventBus,
    cancel: CancellationToken,
) -> SessionEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let poll = Duration::from_millis(READ_POLL_TIMEOUT_MS);
    let mut buf = [0u8; 256];
    let mut pending = String::new();

    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Cancelled,
            read = timeout(poll, stream.read(&mut buf)) => read,
        };

        let n = match read {
            Err(_) => continue, // poll timeout, check cancellation again
            Ok(Ok(0)) => {
                events.log(format!("{peer}: peer closed session"));
                return SessionEnd::PeerClosed;
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                tracing::warn!("{peer}: read failed: {e}");
                return SessionEnd::IoError;
            }
        };

        pending.push_str(&String::from_utf8_lossy(&buf[..n]));

        // Commands are terminated by CR (some clients send CRLF or LF)
        while let Some(pos) = pending.find(['\r', '\n']) {
            let line: String = pending.drain(..=pos).collect();
            let request = line.trim_matches(|c: char| c.is_control() || c == ' ');
            if request.is_empty() {
                continue;
            }

            let response = interpreter.process(request).await;
            let wire = format!("{response}{LINE_TERMINATOR}");
            if let Err(e) = stream.write_all(wire.as_bytes()).await {
                tracing::warn!("{peer}: write failed: {e}");
                return SessionEnd::IoError;
            }

            events.emit(EmulatorEvent::CommandProcessed {
                request: request.to_string(),
                response,
            });
        }
    }
}
