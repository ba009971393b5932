//! The proxy event loop.
//!
//! ```text
//!  agents ──IPC──► Aggregator ──tick──► Telemetry.update ──┐
//!                                                          ├──► observers (ws)
//!  native debugger ◄──► BridgeHandle ──notifications──────┤
//!                           ▲                              │
//!  observers ──ws──► route ─┴── Telemetry.getCode ─────────┘
//! ```
//!
//! Everything runs on one task; the aggregator is never shared.

use super::archive::{Archive, DirectoryArchive, NullArchive};
use super::source::{self, GET_CODE};
use crate::aggregation::{Aggregator, AggregatorConfig};
use crate::domain::Pid;
use crate::inspector::{BridgeConfig, BridgeHandle, Sigusr1};
use crate::ipc::IpcServer;
use crate::labels::{LabelSource, NoLabels, SourceLabels};
use crate::server::{BroadcastServer, InboundMessage, Namespace, ServerEvent};
use anyhow::{Context, Result};
use callscope_common::{env, IpcEnvelope, TraceFrame, TRACER_FRAME};
use log::{debug, info, warn};
use serde_json::Value;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(2);
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Observer websocket address; `None` runs without observers
    pub frontend_addr: Option<SocketAddr>,
    pub ipc_socket_path: PathBuf,
    pub hostname: String,
    pub max_age: u32,
    pub use_context: bool,
    pub debugger_port: u16,
    /// The traced process; the proxy exits when it disappears
    pub debuggee_pid: Option<Pid>,
    pub enable_debugger: bool,
    pub archive_dir: Option<PathBuf>,
    pub broadcast_interval: Duration,
    /// Base directory for relative source paths
    pub source_root: Option<PathBuf>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            frontend_addr: Some(SocketAddr::from((Ipv4Addr::UNSPECIFIED, env::DEFAULT_FRONTEND_PORT))),
            ipc_socket_path: PathBuf::from(env::DEFAULT_IPC_SOCKET_PATH),
            hostname: String::new(),
            max_age: env::DEFAULT_MAX_AGE,
            use_context: true,
            debugger_port: env::DEFAULT_DEBUGGER_PORT,
            debuggee_pid: None,
            enable_debugger: true,
            archive_dir: None,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            source_root: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGTERM, Ctrl-C or the caller's shutdown future
    Shutdown,
    /// The traced process is gone
    DebuggeeExited,
}

/// `{"method":"Telemetry.update","result":<snapshot>}` without
/// re-serializing the snapshot
#[must_use]
pub fn telemetry_update(snapshot_json: &str) -> String {
    format!(r#"{{"method":"Telemetry.update","result":{snapshot_json}}}"#)
}

pub struct Proxy {
    config: ProxyConfig,
    aggregator: Aggregator,
    ipc: IpcServer,
    server: BroadcastServer,
    server_events: mpsc::UnboundedReceiver<ServerEvent>,
    bridge: Option<BridgeHandle>,
    outbound_tx: mpsc::UnboundedSender<Value>,
    outbound: mpsc::UnboundedReceiver<Value>,
    archive: Box<dyn Archive>,
}

impl Proxy {
    /// Bind the IPC socket and the observer server, start the bridge
    pub async fn start(config: ProxyConfig) -> Result<Self> {
        info!("callscope proxy starting");
        let ipc = IpcServer::bind(&config.ipc_socket_path)?;

        let (events_tx, server_events) = mpsc::unbounded_channel();
        let server = match config.frontend_addr {
            Some(addr) => BroadcastServer::bind(addr, events_tx).await?,
            None => {
                info!("No observer port configured, broadcasts disabled");
                BroadcastServer::disabled()
            }
        };

        let archive: Box<dyn Archive> = match &config.archive_dir {
            Some(dir) => Box::new(
                DirectoryArchive::new(dir)
                    .with_context(|| format!("Failed to create archive dir {}", dir.display()))?,
            ),
            None => Box::new(NullArchive),
        };

        let labels: Box<dyn LabelSource> = if config.use_context {
            Box::new(SourceLabels::new(config.source_root.clone()))
        } else {
            Box::new(NoLabels)
        };
        let aggregator = Aggregator::new(
            AggregatorConfig {
                max_age: config.max_age,
                use_context: config.use_context,
                hostname: config.hostname.clone(),
            },
            labels,
        );

        let (outbound_tx, outbound) = mpsc::unbounded_channel();
        let bridge = if config.enable_debugger {
            info!("Enabling debugger bridge on port {}", config.debugger_port);
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, config.debugger_port));
            Some(BridgeHandle::spawn(
                BridgeConfig::new(addr, config.debuggee_pid),
                Box::new(Sigusr1),
                outbound_tx.clone(),
            ))
        } else {
            None
        };

        Ok(Self {
            config,
            aggregator,
            ipc,
            server,
            server_events,
            bridge,
            outbound_tx,
            outbound,
            archive,
        })
    }

    /// Bound observer address (resolves port 0)
    #[must_use]
    pub fn frontend_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    /// Run until `shutdown` resolves or the debuggee exits, then clean up
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<ExitReason> {
        let interval = self.config.broadcast_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
        let debuggee = self.config.debuggee_pid;
        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                _ = ticker.tick() => self.publish(),
                Some(envelope) = self.ipc.recv() => self.on_ipc(&envelope),
                Some(event) = self.server_events.recv() => self.on_server_event(event),
                Some(message) = self.outbound.recv() => {
                    self.server.broadcast(&message.to_string());
                }
                _ = liveness.tick(), if debuggee.is_some() => {
                    if let Some(pid) = debuggee.filter(|pid| !pid.is_alive()) {
                        info!("Debuggee {pid} exited, shutting down");
                        break ExitReason::DebuggeeExited;
                    }
                }
                () = &mut shutdown => break ExitReason::Shutdown,
            }
        };

        drop(ticker);
        self.close().await;
        Ok(reason)
    }

    fn publish(&mut self) {
        let snapshot = self.aggregator.tick();
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                warn!("Cannot serialize snapshot: {e}");
                return;
            }
        };
        let delivered = self.server.broadcast(&telemetry_update(&json));
        debug!(
            "Published {} nodes, {} links to {delivered} observers",
            snapshot.nodes.len(),
            snapshot.links.len()
        );
        if let Err(e) = self.archive.archive(&json) {
            warn!("Archive failed: {e}");
        }
    }

    fn on_ipc(&mut self, envelope: &IpcEnvelope) {
        if envelope.kind != TRACER_FRAME {
            debug!("Ignoring IPC message '{}'", envelope.kind);
            return;
        }
        match envelope.payload::<TraceFrame>() {
            Ok(frame) => self.aggregator.ingest_frame(frame),
            Err(e) => warn!("Malformed trace frame: {e}"),
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Message { observer, message } => {
                debug!("{observer}: {}", message.method);
                self.on_observer_message(message);
            }
            ServerEvent::NoConnections => {
                if let Some(bridge) = &self.bridge {
                    info!("Last observer left, detaching debugger");
                    bridge.disable();
                }
            }
        }
    }

    fn on_observer_message(&mut self, message: InboundMessage) {
        let (namespace, _) = message.route();
        match namespace {
            Namespace::Telemetry if message.method == GET_CODE => self.get_code(&message),
            Namespace::Telemetry => debug!("Ignoring {}", message.method),
            _ => match &self.bridge {
                Some(bridge) => bridge.command(message),
                None => debug!("Debugger disabled, ignoring {}", message.method),
            },
        }
    }

    fn get_code(&self, message: &InboundMessage) {
        let name = message.param_str("name").unwrap_or_default();
        let path = source::resolve(name, self.config.source_root.as_deref());
        let outbound = self.outbound_tx.clone();
        tokio::spawn(async move {
            let response = source::get_code_response(source::read_code(&path).await);
            let _ = outbound.send(response);
        });
    }

    async fn close(self) {
        let Self { ipc, server, bridge, .. } = self;
        ipc.close().await;
        server.close().await;
        if let Some(bridge) = bridge {
            bridge.shutdown().await;
        }
        info!("callscope proxy stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_update_wraps_snapshot() {
        let update = telemetry_update(r#"{"nodes":[]}"#);
        let parsed: Value = serde_json::from_str(&update).unwrap();
        assert_eq!(parsed["method"], "Telemetry.update");
        assert_eq!(parsed["result"]["nodes"], serde_json::json!([]));
    }

    #[test]
    fn test_default_config() {
        let config = ProxyConfig::default();
        assert_eq!(config.frontend_addr.unwrap().port(), 6788);
        assert_eq!(config.broadcast_interval, Duration::from_secs(2));
        assert!(config.enable_debugger);
    }
}
