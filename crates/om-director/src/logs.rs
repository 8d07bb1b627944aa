//! Two-channel installation log streaming.
//!
//! A producer owns a [`LogSender`] and the consumer a [`LogStream`]. Lines
//! arrive in producer order; the error channel carries at most one value
//! and is closed together with the line channel when the producer is
//! dropped. Consumers drain `lines` before reading `errors`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DirectorError;
use crate::gateway::DirectorGateway;
use crate::types::InstallationStatus;

/// Default pause between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const LINE_BUFFER: usize = 256;

/// Producer half
#[derive(Debug)]
pub struct LogSender {
    lines: mpsc::Sender<String>,
    errors: mpsc::Sender<DirectorError>,
}

/// Consumer half
#[derive(Debug)]
pub struct LogStream {
    pub lines: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<DirectorError>,
}

/// Create a connected sender/stream pair.
pub fn log_channel() -> (LogSender, LogStream) {
    let (lines_tx, lines_rx) = mpsc::channel(LINE_BUFFER);
    let (errors_tx, errors_rx) = mpsc::channel(1);
    (
        LogSender {
            lines: lines_tx,
            errors: errors_tx,
        },
        LogStream {
            lines: lines_rx,
            errors: errors_rx,
        },
    )
}

impl LogSender {
    /// Returns false once the consumer has gone away.
    pub async fn line(&self, line: String) -> bool {
        self.lines.send(line).await.is_ok()
    }

    /// Report the terminal error and close both channels.
    pub fn fail(self, error: DirectorError) {
        let _ = self.errors.try_send(error);
    }
}

/// Tracks how much of a growing log has been emitted.
#[derive(Debug, Default, Clone)]
pub struct LogCursor {
    offset: usize,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Complete lines past the cursor.
    pub fn advance(&mut self, logs: &str) -> Vec<String> {
        let unseen = self.unseen(logs);
        let Some(end) = unseen.rfind('\n') else {
            return Vec::new();
        };
        let lines = unseen[..end].split('\n').map(str::to_string).collect();
        self.offset += end + 1;
        lines
    }

    /// Everything past the cursor, including a trailing partial line.
    pub fn finish(&mut self, logs: &str) -> Vec<String> {
        let mut lines = self.advance(logs);
        let rest = self.unseen(logs);
        if !rest.is_empty() {
            lines.push(rest.to_string());
            self.offset = logs.len();
        }
        lines
    }

    fn unseen<'a>(&mut self, logs: &'a str) -> &'a str {
        match logs.get(self.offset..) {
            Some(rest) => rest,
            None => {
                tracing::debug!(offset = self.offset, len = logs.len(), "log shrank, restarting cursor");
                self.offset = 0;
                logs
            }
        }
    }
}

/// Poll an installation until it finishes, feeding a new log stream.
///
/// The producer task stops when the installation ends, when the consumer
/// drops the stream, or when `cancel` fires.
pub fn poll_installation<G>(
    gateway: Arc<G>,
    id: u64,
    interval: Duration,
    cancel: CancellationToken,
) -> LogStream
where
    G: DirectorGateway + ?Sized + 'static,
{
    let (sender, stream) = log_channel();
    tokio::spawn(async move {
        let mut cursor = LogCursor::new();
        loop {
            let step = async {
                let current = gateway
                    .get_installation(id)
                    .await
                    .map_err(|e| e.context("installation failed to get status"))?;
                let logs = gateway
                    .get_installation_logs(id)
                    .await
                    .map_err(|e| e.context("installation failed to get logs"))?;
                Ok::<_, DirectorError>((current.status, logs))
            };
            let (status, logs) = tokio::select! {
                _ = cancel.cancelled() => return,
                result = step => match result {
                    Ok(polled) => polled,
                    Err(err) => return sender.fail(err),
                },
            };

            let lines = if status.is_terminal() {
                cursor.finish(&logs)
            } else {
                cursor.advance(&logs)
            };
            for line in lines {
                if !sender.line(line).await {
                    return;
                }
            }

            match status {
                InstallationStatus::Succeeded => return,
                InstallationStatus::Failed => return sender.fail(DirectorError::InstallationFailed { id }),
                _ => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    });
    stream
}
