//! Client for HAProxy's UNIX control socket.
//!
//! # Responsibilities
//! - Send one text command per connection
//! - Accumulate the response until the peer closes or the deadline passes
//!
//! # Design Decisions
//! - A fresh connection per call, no pooling and no retries
//! - Hitting the deadline is not an error: whatever arrived is returned
//! - The stream is dropped (closed) on every exit path

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::time::{timeout_at, Instant};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum StatsSocketError {
    #[error("no `stats socket` directive in the global section")]
    NotConfigured,

    #[error("could not connect to stats socket [{path}]: {source}")]
    Connect {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("could not send [{command}] to stats socket: {source}")]
    Send {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("error while reading response to [{command}]: {source}")]
    Receive {
        command: String,
        #[source]
        source: io::Error,
    },
}

/// Talks to HAProxy through its `stats socket`.
#[derive(Debug, Clone)]
pub struct StatsSocketClient {
    socket_path: PathBuf,
}

impl StatsSocketClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send `command` (plus `extra`, if any) and collect the response for up
    /// to `timeout`.
    pub async fn execute(
        &self,
        command: &str,
        extra: &str,
        timeout: Duration,
    ) -> Result<String, StatsSocketError> {
        let wire = wire_command(command, extra);
        let deadline = Instant::now() + timeout;

        let connect = timeout_at(deadline, UnixStream::connect(&self.socket_path))
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))
            });
        let mut stream = connect.map_err(|source| {
            tracing::error!(
                path = %self.socket_path.display(),
                error = %source,
                "Stats socket connection failed"
            );
            StatsSocketError::Connect {
                path: self.socket_path.display().to_string(),
                source,
            }
        })?;

        stream.write_all(wire.as_bytes()).await.map_err(|source| {
            tracing::error!(command = %wire.trim_end(), error = %source, "Stats socket send failed");
            StatsSocketError::Send {
                command: wire.trim_end().to_string(),
                source,
            }
        })?;

        let mut response = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match timeout_at(deadline, stream.read(&mut chunk)).await {
                Err(_) => {
                    tracing::debug!(
                        command = %wire.trim_end(),
                        received = response.len(),
                        "Stats socket deadline reached, returning partial response"
                    );
                    break;
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => response.extend_from_slice(&chunk[..n]),
                Ok(Err(source)) => {
                    tracing::error!(command = %wire.trim_end(), error = %source, "Stats socket receive failed");
                    return Err(StatsSocketError::Receive {
                        command: wire.trim_end().to_string(),
                        source,
                    });
                }
            }
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }
}

/// `"<command>[ <extra>]\n"`
pub fn wire_command(command: &str, extra: &str) -> String {
    if extra.is_empty() {
        format!("{}\n", command)
    } else {
        format!("{} {}\n", command, extra)
    }
}
