//! Bridge task: owns the native debugger TCP connection and the
//! [`Inspector`] state, fed by observer commands.
//!
//! ```text
//!  observers ──Command──► ┌──────────────┐ ──Content-Length frames──► native
//!                         │ bridge task  │                            debugger
//!  observers ◄─notify──── └──────────────┘ ◄───responses / events─── (TCP)
//! ```

use super::domains::{Effect, Inspector};
use super::session::{SessionState, DEFAULT_HIGH_WATER};
use super::debugger::DEFAULT_CONNECT_DELAY;
use super::transport::{encode_request, NativeDecoder, NativeMessage};
use crate::domain::{BridgeError, Pid};
use crate::server::InboundMessage;
use log::{debug, info, warn};
use serde_json::Value;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub debugger_addr: SocketAddr,
    /// Process to signal before the first connection
    pub debuggee_pid: Option<Pid>,
    pub connect_delay: Duration,
    pub high_water: usize,
}

impl BridgeConfig {
    #[must_use]
    pub fn new(debugger_addr: SocketAddr, debuggee_pid: Option<Pid>) -> Self {
        Self {
            debugger_addr,
            debuggee_pid,
            connect_delay: DEFAULT_CONNECT_DELAY,
            high_water: DEFAULT_HIGH_WATER,
        }
    }
}

/// Activates the native debugger inside the debuggee
pub trait DebuggeeSignal: Send {
    fn signal(&self, pid: Pid) -> io::Result<()>;
}

/// `SIGUSR1`, the conventional "start debugger" signal
pub struct Sigusr1;

impl DebuggeeSignal for Sigusr1 {
    #[allow(unsafe_code)]
    fn signal(&self, pid: Pid) -> io::Result<()> {
        let raw = libc::pid_t::try_from(pid.0)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, format!("{pid} out of range")))?;
        // SAFETY: kill(2) takes plain integers and has no memory-safety
        // preconditions; failure is reported through errno.
        let rc = unsafe { libc::kill(raw, libc::SIGUSR1) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

enum Command {
    Inbound(InboundMessage),
    Disable,
}

pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// Start the bridge task. Observer-bound messages go to `notifications`.
    pub fn spawn(
        config: BridgeConfig,
        signal: Box<dyn DebuggeeSignal>,
        notifications: mpsc::UnboundedSender<Value>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disabled);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = BridgeTask {
            inspector: Inspector::new(config.high_water, config.connect_delay),
            config,
            signal,
            notifications,
            state: state_tx,
            connection: None,
            connect_at: None,
        };
        let task = tokio::spawn(task.run(commands_rx, shutdown_rx));

        Self {
            commands: commands_tx,
            state: state_rx,
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// Forward an observer message for the debugger namespaces
    pub fn command(&self, message: InboundMessage) {
        if self.commands.send(Command::Inbound(message)).is_err() {
            debug!("Bridge task gone, dropping command");
        }
    }

    /// Detach from the native debugger (last observer left)
    pub fn disable(&self) {
        if self.commands.send(Command::Disable).is_err() {
            debug!("Bridge task gone, dropping disable");
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `state`
    pub async fn wait_for(&mut self, state: SessionState) -> bool {
        self.state.wait_for(|current| *current == state).await.is_ok()
    }

    /// Detach and stop the task
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(e) = self.task.await {
            warn!("Bridge task ended abnormally: {e}");
        }
    }
}

struct NativeConnection {
    stream: TcpStream,
    decoder: NativeDecoder,
    buf: Vec<u8>,
}

impl NativeConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            decoder: NativeDecoder::new(),
            buf: vec![0; 8192],
        }
    }
}

type NativeRead = io::Result<Option<Vec<Result<NativeMessage, BridgeError>>>>;

/// Next batch of messages; `Ok(None)` when the peer closed. Pends forever
/// without a connection.
async fn read_native(connection: &mut Option<NativeConnection>) -> NativeRead {
    let Some(conn) = connection else {
        return std::future::pending().await;
    };
    let n = conn.stream.read(&mut conn.buf).await?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(conn.decoder.push(&conn.buf[..n])))
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

struct BridgeTask {
    config: BridgeConfig,
    signal: Box<dyn DebuggeeSignal>,
    inspector: Inspector,
    notifications: mpsc::UnboundedSender<Value>,
    state: watch::Sender<SessionState>,
    connection: Option<NativeConnection>,
    connect_at: Option<Instant>,
}

impl BridgeTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Inbound(message)) => self.inspector.dispatch(&message),
                    Some(Command::Disable) => self.inspector.disable(),
                    None => break,
                },
                () = sleep_until_opt(self.connect_at) => {
                    self.connect_at = None;
                    self.connect().await;
                }
                read = read_native(&mut self.connection) => match read {
                    Ok(Some(messages)) => {
                        for message in messages {
                            match message {
                                Ok(message) => self.inspector.on_native(message),
                                Err(e) => warn!("Dropping native message: {e}"),
                            }
                        }
                    }
                    Ok(None) => {
                        info!("Native debugger closed the connection");
                        self.connection = None;
                        self.inspector.connection_closed();
                    }
                    Err(e) => {
                        warn!("Native debugger connection error: {e}");
                        self.connection = None;
                        self.inspector.connection_closed();
                    }
                },
                _ = &mut shutdown => break,
            }
            self.apply_effects().await;
        }

        self.inspector.disable();
        self.apply_effects().await;
        debug!("Bridge task stopped");
    }

    async fn connect(&mut self) {
        info!("Connecting to native debugger on {}", self.config.debugger_addr);
        match TcpStream::connect(self.config.debugger_addr).await {
            Ok(stream) => {
                self.connection = Some(NativeConnection::new(stream));
                self.inspector.connected();
            }
            Err(e) => {
                warn!("Cannot connect to native debugger on {}: {e}", self.config.debugger_addr);
                self.inspector.connection_closed();
            }
        }
    }

    async fn apply_effects(&mut self) {
        loop {
            self.write_unsent().await;
            let effects = self.inspector.take_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                match effect {
                    Effect::Notify(message) => {
                        if self.notifications.send(message).is_err() {
                            debug!("Notification receiver gone");
                        }
                    }
                    Effect::Signal => self.signal_debuggee(),
                    Effect::Connect { delay } => self.connect_at = Some(Instant::now() + delay),
                    Effect::Close => self.close().await,
                }
            }
        }
        self.state.send_replace(self.inspector.state());
    }

    fn signal_debuggee(&self) {
        let Some(pid) = self.config.debuggee_pid else {
            warn!("No debuggee pid configured, connecting without signal");
            return;
        };
        info!("Sending debug signal to {pid}");
        if let Err(e) = self.signal.signal(pid) {
            warn!("Failed to signal {pid}: {e}");
        }
    }

    async fn write_unsent(&mut self) {
        let requests = self.inspector.take_unsent();
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        for request in requests {
            let bytes = match encode_request(&request) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Cannot encode native request {}: {e}", request.command);
                    continue;
                }
            };
            if let Err(e) = conn.stream.write_all(&bytes).await {
                warn!("Native debugger write failed: {e}");
                self.connection = None;
                self.inspector.connection_closed();
                return;
            }
        }
    }

    async fn close(&mut self) {
        self.write_unsent().await;
        self.connect_at = None;
        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.stream.shutdown().await {
                debug!("Native debugger shutdown: {e}");
            }
        }
        self.inspector.connection_closed();
    }
}
