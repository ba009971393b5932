//! CLI argument definitions.
//!
//! Every option can also come from the `CALLSCOPE_*` environment variable
//! the agent sets when it spawns the proxy.

use crate::domain::Pid;
use crate::proxy::ProxyConfig;
use anyhow::{Context, Result};
use callscope_common::env;
use clap::{ArgAction, Parser};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "callscope",
    about = "Aggregate call traces from instrumented processes and stream them to observers",
    after_help = "\
EXAMPLES:
    callscope                                   Defaults (ws://0.0.0.0:6788/)
    callscope --frontend-port 0                 No observer server
    callscope --debuggee-pid 1234 --max-age 30  Exit with 1234, keep idle nodes longer"
)]
pub struct Args {
    /// Observer websocket port (0 disables the server)
    #[arg(long, env = env::FRONTEND_PORT, default_value_t = env::DEFAULT_FRONTEND_PORT)]
    pub frontend_port: u16,

    /// Local socket agents connect to
    #[arg(long, env = env::IPC_SOCKET_PATH, default_value = env::DEFAULT_IPC_SOCKET_PATH)]
    pub ipc_socket_path: PathBuf,

    /// Host name reported in snapshots
    #[arg(long, env = env::HOSTNAME, default_value = "")]
    pub hostname: String,

    /// Idle broadcast ticks before a node or link is dropped
    #[arg(long, env = env::MAX_AGE, default_value_t = env::DEFAULT_MAX_AGE)]
    pub max_age: u32,

    /// Label anonymous functions from their source context
    #[arg(long, env = env::USE_CONTEXT, default_value_t = true, action = ArgAction::Set)]
    pub use_context: bool,

    /// Native debugger port on localhost
    #[arg(long, env = env::DEBUGGER_PORT, default_value_t = env::DEFAULT_DEBUGGER_PORT)]
    pub debugger_port: u16,

    /// Traced process ("null" when unknown)
    #[arg(long, env = env::DEBUGGEE_PID)]
    pub debuggee_pid: Option<String>,

    /// Serve the debugger namespaces
    #[arg(long, env = env::ENABLE_DEBUGGER, default_value_t = true, action = ArgAction::Set)]
    pub enable_debugger: bool,

    /// Write every snapshot to this directory ("null" disables)
    #[arg(long, env = env::ARCHIVE_DIR)]
    pub archive_dir: Option<String>,

    /// Snapshot broadcast interval
    #[arg(long, default_value_t = 2000)]
    pub broadcast_interval_ms: u64,

    /// Base directory for relative source paths
    #[arg(long)]
    pub source_root: Option<PathBuf>,
}

fn set(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !env::is_unset(v))
}

impl Args {
    pub fn debuggee_pid(&self) -> Result<Option<Pid>> {
        set(self.debuggee_pid.as_ref())
            .map(|raw| {
                raw.trim()
                    .parse()
                    .map(Pid)
                    .with_context(|| format!("invalid debuggee pid '{raw}'"))
            })
            .transpose()
    }

    #[must_use]
    pub fn archive_dir(&self) -> Option<PathBuf> {
        set(self.archive_dir.as_ref()).map(PathBuf::from)
    }

    pub fn proxy_config(&self) -> Result<ProxyConfig> {
        let frontend_addr = (self.frontend_port != 0)
            .then(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.frontend_port)));
        if self.broadcast_interval_ms == 0 {
            anyhow::bail!("invalid --broadcast-interval-ms: must be greater than 0");
        }

        Ok(ProxyConfig {
            frontend_addr,
            ipc_socket_path: self.ipc_socket_path.clone(),
            hostname: self.hostname.clone(),
            max_age: self.max_age,
            use_context: self.use_context,
            debugger_port: self.debugger_port,
            debuggee_pid: self.debuggee_pid()?,
            enable_debugger: self.enable_debugger,
            archive_dir: self.archive_dir(),
            broadcast_interval: Duration::from_millis(self.broadcast_interval_ms),
            source_root: self.source_root.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("callscope").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_unset_markers_map_to_none() {
        let args = parse(&["--debuggee-pid", "null", "--archive-dir", "undefined"]);
        assert_eq!(args.debuggee_pid().unwrap(), None);
        assert_eq!(args.archive_dir(), None);
    }

    #[test]
    fn test_explicit_values() {
        let args = parse(&[
            "--frontend-port",
            "0",
            "--debuggee-pid",
            "4321",
            "--use-context",
            "false",
            "--archive-dir",
            "/tmp/snaps",
        ]);
        let config = args.proxy_config().unwrap();
        assert_eq!(config.frontend_addr, None);
        assert_eq!(config.debuggee_pid, Some(Pid(4321)));
        assert!(!config.use_context);
        assert_eq!(config.archive_dir, Some(PathBuf::from("/tmp/snaps")));
    }

    #[test]
    fn test_bad_pid_is_reported() {
        let args = parse(&["--debuggee-pid", "abc"]);
        assert!(args.proxy_config().is_err());
    }
}
