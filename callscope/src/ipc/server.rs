//! Listens on the local socket agents connect to.
//!
//! A stale socket file left by a previous run is removed before binding.
//! Each connection gets its own [`FrameDecoder`]; decoded envelopes from all
//! connections are funnelled into one channel in per-connection order.
//! Malformed frames are logged and skipped.

use crate::domain::IpcError;
use callscope_common::{FrameDecoder, IpcEnvelope};
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Pause after a failed accept (e.g. EMFILE) before trying again
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

pub struct IpcServer {
    path: PathBuf,
    inbound: mpsc::UnboundedReceiver<IpcEnvelope>,
    accept_task: JoinHandle<()>,
}

impl IpcServer {
    /// Bind the socket and start accepting. Must be called inside a tokio
    /// runtime.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self, IpcError> {
        let path = path.into();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path).map_err(|source| IpcError::Bind {
            path: path.clone(),
            source,
        })?;
        info!("IPC server listening on {}", path.display());

        let (tx, inbound) = mpsc::unbounded_channel();
        let accept_task = tokio::spawn(accept_loop(listener, tx));
        Ok(Self {
            path,
            inbound,
            accept_task,
        })
    }

    /// Next envelope from any connected agent
    pub async fn recv(&mut self) -> Option<IpcEnvelope> {
        self.inbound.recv().await
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop accepting, drop every connection and remove the socket file
    pub async fn close(self) {
        self.accept_task.abort();
        let _ = self.accept_task.await;
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Socket {} not removed: {e}", self.path.display());
        }
        info!("IPC server closed");
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), IpcError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed stale socket {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(IpcError::RemoveStale {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn accept_loop(listener: UnixListener, tx: mpsc::UnboundedSender<IpcEnvelope>) {
    // Dropping the set (when this task is aborted) aborts every reader
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("Agent connected");
                    connections.spawn(read_connection(stream, tx.clone()));
                }
                Err(e) => accept_failed(&e).await,
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn accept_failed(e: &io::Error) {
    warn!("IPC accept failed: {e}");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn read_connection(mut stream: UnixStream, tx: mpsc::UnboundedSender<IpcEnvelope>) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("IPC read failed: {e}");
                break;
            }
        };
        for frame in decoder.push(&buf[..n]) {
            match frame {
                Ok(envelope) => {
                    if tx.send(envelope).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Dropping IPC frame: {e}"),
            }
        }
    }
    if decoder.pending_len() > 0 {
        debug!("Agent disconnected with {} bytes of partial frame", decoder.pending_len());
    } else {
        debug!("Agent disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_accept_error_backs_off() {
        let started = Instant::now();
        accept_failed(&io::Error::from_raw_os_error(libc::EMFILE)).await;
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }
}
