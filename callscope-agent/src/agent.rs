//! The agent facade: one per traced process.
//!
//! ```text
//!  app threads                    "callscope-agent" thread (current_thread rt)
//!  ───────────                    ───────────────────────────────────────────
//!  Intercepted::call              loop select! {
//!    └─ TracerHooks::after          100ms   → drain channel into CallTree
//!         └─ try_send ──bounded──▶  frame   → take frame, send Tracer.frame
//!                                   proxy exited → on_exit (restart)
//!                                   shutdown → break }
//!                                 Supervisor::shutdown (kill proxy, close IPC)
//! ```

use crate::config::AgentConfig;
use crate::domain::AgentError;
use crate::interception::{CallSite, Intercepted, Interceptor, Target};
use crate::supervisor::Supervisor;
use crate::tracer::{CallTree, TracerHooks, TRACE_CHANNEL_CAPACITY};
use callscope_common::{CallTrace, IpcEnvelope, TRACER_FRAME};
use crossbeam_channel::{bounded, Receiver};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

pub struct Agent {
    interceptor: Arc<Interceptor>,
    recording: Arc<AtomicBool>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Agent {
    /// Build the interceptor and start the agent thread (which spawns and
    /// supervises the proxy when `spawn_proxy` is set).
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        let recording = Arc::new(AtomicBool::new(true));
        let (trace_tx, trace_rx) = bounded(TRACE_CHANNEL_CAPACITY);

        let interceptor = if config.enable_tracer {
            let hooks = TracerHooks::new(trace_tx, Arc::clone(&recording));
            Interceptor::new(Arc::new(hooks), config.module_filter())
        } else {
            Interceptor::disabled()
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(AgentError::RuntimeInit)?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("callscope-agent".to_string())
            .spawn(move || runtime.block_on(run_loop(config, trace_rx, shutdown_rx)))
            .map_err(AgentError::ThreadSpawn)?;

        Ok(Self {
            interceptor: Arc::new(interceptor),
            recording,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Resume recording traces
    pub fn start(&self) {
        self.recording.store(true, Ordering::Relaxed);
    }

    /// Pause recording; wrapped calls keep running untraced
    pub fn stop(&self) {
        self.recording.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn interceptor(&self) -> Arc<Interceptor> {
        Arc::clone(&self.interceptor)
    }

    pub fn intercept<A: 'static, R: 'static>(
        &self,
        target: Target<A, R>,
        site: CallSite,
    ) -> Intercepted<A, R> {
        self.interceptor.intercept(target, site)
    }

    /// Stop the agent thread, the proxy and the IPC connection
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Agent thread panicked");
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_loop(
    config: AgentConfig,
    traces: Receiver<CallTrace>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut supervisor = Supervisor::new(config.launch_config(), config.ipc_client_config());
    if config.spawn_proxy {
        if let Err(e) = supervisor.ensure_running() {
            warn!("{e}");
        }
    }
    supervisor.connect_ipc();

    let mut tree = CallTree::new();
    let mut drain = tokio::time::interval(DRAIN_INTERVAL);
    let mut flush = tokio::time::interval(config.frame_interval);

    loop {
        tokio::select! {
            _ = drain.tick() => {
                tree.drain(&traces);
                supervisor.poll_inbound();
            }
            _ = flush.tick() => {
                tree.drain(&traces);
                if let Some(frame) = tree.take_frame() {
                    send_frame(&supervisor, &frame);
                }
            }
            status = supervisor.wait() => {
                let code = status.and_then(|s| s.code());
                if let Err(e) = supervisor.on_exit(code) {
                    warn!("{e}");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("Agent stopping after {} traces", tree.traces_seen());
    supervisor.shutdown().await;
}

fn send_frame(supervisor: &Supervisor, frame: &callscope_common::TraceFrame) {
    match IpcEnvelope::new(TRACER_FRAME, frame) {
        Ok(envelope) => {
            if !supervisor.send(envelope) {
                debug!("No proxy connection, frame dropped");
            }
        }
        Err(e) => warn!("Failed to encode frame: {e}"),
    }
}
