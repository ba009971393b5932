//! Client role of the framed IPC transport.
//!
//! A background task owns the socket. It connects, retries on failure with
//! a fixed interval, and gives up after a bounded number of consecutive
//! failed attempts. Delivery is at-most-once: envelopes handed over while
//! disconnected are dropped, and frames in flight when a connection breaks
//! are lost.
//!
//! ```text
//!   connect ──ok──▶ serve ──eof/error──┐
//!      ▲  │                            │
//!      │  └─err─▶ attempts+1 ──max──▶ stop
//!      └──── sleep(retry_interval) ◀───┘
//! ```

use callscope_common::{encode_frame, FrameDecoder, IpcEnvelope};
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct IpcClientConfig {
    pub path: PathBuf,
    pub retry_interval: Duration,
    /// Consecutive failed connects before the client stops for good
    pub max_attempts: u32,
}

impl Default for IpcClientConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(callscope_common::env::DEFAULT_IPC_SOCKET_PATH),
            retry_interval: Duration::from_secs(1),
            max_attempts: 10,
        }
    }
}

pub struct IpcClient {
    outbound: mpsc::UnboundedSender<IpcEnvelope>,
    inbound: mpsc::UnboundedReceiver<IpcEnvelope>,
    connected: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Why a served connection ended
enum Served {
    /// The owning client was dropped or closed
    Closed,
    /// EOF or an I/O error on the socket
    Lost,
}

impl IpcClient {
    /// Start connecting in the background. Must be called inside a tokio
    /// runtime.
    #[must_use]
    pub fn connect(config: IpcClientConfig) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(run(config, outbound_rx, inbound_tx, Arc::clone(&connected)));
        Self {
            outbound,
            inbound,
            connected,
            task,
        }
    }

    /// Queue an envelope for the current connection.
    ///
    /// Returns `false` and drops the envelope while disconnected or once
    /// the client has stopped (attempts exhausted or closed).
    pub fn send(&self, envelope: IpcEnvelope) -> bool {
        self.is_connected() && self.outbound.send(envelope).is_ok()
    }

    /// Next envelope received from the server
    pub async fn recv(&mut self) -> Option<IpcEnvelope> {
        self.inbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<IpcEnvelope> {
        self.inbound.try_recv().ok()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// False once the background task has stopped
    #[must_use]
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Drop pending sends, shut the socket down and wait for the task
    pub async fn close(self) {
        let Self { outbound, task, .. } = self;
        drop(outbound);
        if let Err(e) = task.await {
            debug!("IPC client task ended abnormally: {e}");
        }
    }
}

async fn run(
    config: IpcClientConfig,
    mut outbound: mpsc::UnboundedReceiver<IpcEnvelope>,
    inbound: mpsc::UnboundedSender<IpcEnvelope>,
    connected: Arc<AtomicBool>,
) {
    let mut attempts = 0u32;
    loop {
        match UnixStream::connect(&config.path).await {
            Ok(stream) => {
                attempts = 0;
                connected.store(true, Ordering::Relaxed);
                info!("Connected to proxy at {}", config.path.display());
                let served = serve(stream, &mut outbound, &inbound).await;
                connected.store(false, Ordering::Relaxed);
                if matches!(served, Served::Closed) {
                    return;
                }
                warn!("Lost connection to proxy at {}", config.path.display());
            }
            Err(e) => {
                attempts += 1;
                debug!(
                    "IPC connect to {} failed ({attempts}/{}): {e}",
                    config.path.display(),
                    config.max_attempts
                );
                if attempts >= config.max_attempts {
                    warn!(
                        "Giving up on proxy at {} after {attempts} attempts",
                        config.path.display()
                    );
                    return;
                }
            }
        }

        if !wait_dropping(config.retry_interval, &mut outbound).await {
            return;
        }
    }
}

/// Sleep for the retry interval, discarding anything sent meanwhile.
/// Returns `false` if the owner went away.
async fn wait_dropping(
    interval: Duration,
    outbound: &mut mpsc::UnboundedReceiver<IpcEnvelope>,
) -> bool {
    let sleep = tokio::time::sleep(interval);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            msg = outbound.recv() => match msg {
                Some(envelope) => debug!("Not connected, dropping '{}'", envelope.kind),
                None => return false,
            },
        }
    }
}

async fn serve(
    stream: UnixStream,
    outbound: &mut mpsc::UnboundedReceiver<IpcEnvelope>,
    inbound: &mpsc::UnboundedSender<IpcEnvelope>,
) -> Served {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(envelope) = msg else {
                    let _ = writer.shutdown().await;
                    return Served::Closed;
                };
                match encode_frame(&envelope) {
                    Ok(bytes) => {
                        if let Err(e) = writer.write_all(&bytes).await {
                            warn!("IPC write failed: {e}");
                            return Served::Lost;
                        }
                    }
                    Err(e) => warn!("Dropping unencodable '{}': {e}", envelope.kind),
                }
            }
            read = reader.read(&mut buf) => match read {
                Ok(0) => return Served::Lost,
                Ok(n) => {
                    for frame in decoder.push(&buf[..n]) {
                        match frame {
                            Ok(envelope) => {
                                let _ = inbound.send(envelope);
                            }
                            Err(e) => warn!("{e}"),
                        }
                    }
                }
                Err(e) => {
                    warn!("IPC read failed: {e}");
                    return Served::Lost;
                }
            },
        }
    }
}
