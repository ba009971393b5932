//! Proxy process supervision.
//!
//! The [`Supervisor`] owns the proxy child and the IPC client used to talk
//! to it, and tears both down together. Recovery is a single policy: with
//! `force_restart` an exited proxy is respawned immediately, every time.

use crate::domain::SupervisorError;
use crate::ipc::{IpcClient, IpcClientConfig};
use callscope_common::IpcEnvelope;
use log::{debug, info, warn};
use std::fs::File;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// Log file names under `logs_path`
pub const STDOUT_LOG: &str = "callscope.log";
pub const STDERR_LOG: &str = "callscope_err.log";

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added to the inherited environment of the child
    pub env: Vec<(String, String)>,
    pub logs_path: Option<PathBuf>,
    pub force_restart: bool,
}

pub struct Supervisor {
    launch: LaunchConfig,
    ipc_config: IpcClientConfig,
    child: Option<Child>,
    ipc: Option<IpcClient>,
    spawns: u64,
}

impl Supervisor {
    #[must_use]
    pub fn new(launch: LaunchConfig, ipc_config: IpcClientConfig) -> Self {
        Self {
            launch,
            ipc_config,
            child: None,
            ipc: None,
            spawns: 0,
        }
    }

    /// Spawn the proxy unless it is already running
    pub fn ensure_running(&mut self) -> Result<(), SupervisorError> {
        if self.child.is_some() {
            return Ok(());
        }

        let (stdout, stderr) = self.output_streams()?;
        let child = Command::new(&self.launch.program)
            .args(&self.launch.args)
            .envs(self.launch.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SupervisorError::SpawnFailed {
                program: self.launch.program.display().to_string(),
                source,
            })?;

        self.spawns += 1;
        info!(
            "Started proxy {} (pid {})",
            self.launch.program.display(),
            child.id().unwrap_or_default()
        );
        self.child = Some(child);
        Ok(())
    }

    fn output_streams(&self) -> Result<(Stdio, Stdio), SupervisorError> {
        let Some(dir) = &self.launch.logs_path else {
            return Ok((Stdio::null(), Stdio::null()));
        };
        let open = |name: &str| {
            let path = dir.join(name);
            File::create(&path)
                .map(Stdio::from)
                .map_err(|source| SupervisorError::LogFile { path, source })
        };
        Ok((open(STDOUT_LOG)?, open(STDERR_LOG)?))
    }

    /// Resolve when the proxy exits; pending forever while none is running.
    ///
    /// Cancel-safe, so it can sit in a `select!` loop.
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            return std::future::pending().await;
        };
        let status = match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Failed to wait on proxy: {e}");
                None
            }
        };
        self.child = None;
        status
    }

    /// React to a proxy exit. Returns `true` if it was respawned.
    pub fn on_exit(&mut self, code: Option<i32>) -> Result<bool, SupervisorError> {
        self.child = None;
        info!("Proxy exited (code {code:?})");
        if !self.launch.force_restart {
            return Ok(false);
        }

        self.ensure_running()?;
        // A client that exhausted its attempts while the proxy was down
        // would otherwise never reconnect
        if self.ipc.as_ref().is_some_and(|ipc| !ipc.is_alive()) {
            debug!("Reconnecting IPC after proxy restart");
            self.connect_ipc();
        }
        Ok(true)
    }

    /// Open (or replace) the IPC client. Requires a tokio runtime.
    pub fn connect_ipc(&mut self) {
        self.ipc = Some(IpcClient::connect(self.ipc_config.clone()));
    }

    /// Send to the proxy; a no-op without a live connection
    pub fn send(&self, envelope: IpcEnvelope) -> bool {
        self.ipc.as_ref().is_some_and(|ipc| ipc.send(envelope))
    }

    /// Drain and log anything the proxy sent back
    pub fn poll_inbound(&mut self) {
        if let Some(ipc) = self.ipc.as_mut() {
            while let Some(envelope) = ipc.try_recv() {
                debug!("Proxy message '{}' ignored", envelope.kind);
            }
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Processes spawned so far, restarts included
    #[must_use]
    pub fn spawns(&self) -> u64 {
        self.spawns
    }

    /// Stop the proxy and close the IPC connection
    pub async fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                debug!("Proxy kill failed: {e}");
            }
        }
        if let Some(ipc) = self.ipc.take() {
            ipc.close().await;
        }
    }
}
