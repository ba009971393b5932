//! Agent configuration.
//!
//! Everything the proxy needs is written into its environment at spawn
//! (see [`AgentConfig::proxy_env`]); nothing is passed through argv.

use crate::interception::ModuleFilter;
use crate::ipc::IpcClientConfig;
use crate::supervisor::LaunchConfig;
use callscope_common::env;
use std::ffi::CStr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Observer listen port of the proxy
    pub frontend_port: u16,
    /// Respawn the proxy whenever it exits
    pub force_restart: bool,
    pub ipc_socket_path: PathBuf,
    pub hostname: String,
    /// Broadcast cycles an idle graph entry survives
    pub max_age: u32,
    /// Replace anonymous node names with context labels
    pub use_context: bool,
    /// Directory for the proxy's stdout/stderr logs
    pub logs_path: Option<PathBuf>,
    pub enable_tracer: bool,
    pub whitelisted_modules: Option<Vec<String>>,
    pub blacklisted_modules: Vec<String>,
    pub enable_debugger: bool,
    pub debugger_port: u16,
    pub debuggee_pid: u32,
    /// Spawn and supervise the proxy from this process
    pub spawn_proxy: bool,
    pub proxy_program: PathBuf,
    pub proxy_args: Vec<String>,
    /// How often the call tree is shipped to the proxy
    pub frame_interval: Duration,
    pub archive_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            frontend_port: env::DEFAULT_FRONTEND_PORT,
            force_restart: true,
            ipc_socket_path: PathBuf::from(env::DEFAULT_IPC_SOCKET_PATH),
            hostname: hostname(),
            max_age: env::DEFAULT_MAX_AGE,
            use_context: true,
            logs_path: None,
            enable_tracer: true,
            whitelisted_modules: None,
            blacklisted_modules: ModuleFilter::default_blacklist(),
            enable_debugger: true,
            debugger_port: env::DEFAULT_DEBUGGER_PORT,
            debuggee_pid: std::process::id(),
            spawn_proxy: true,
            proxy_program: PathBuf::from("callscope"),
            proxy_args: Vec::new(),
            frame_interval: Duration::from_secs(1),
            archive_dir: None,
        }
    }
}

impl AgentConfig {
    /// Variables written into the proxy's environment
    #[must_use]
    pub fn proxy_env(&self) -> Vec<(String, String)> {
        let archive_dir = self
            .archive_dir
            .as_ref()
            .map_or_else(|| "null".to_string(), |dir| dir.display().to_string());

        [
            (env::FRONTEND_PORT, self.frontend_port.to_string()),
            (env::IPC_SOCKET_PATH, self.ipc_socket_path.display().to_string()),
            (env::HOSTNAME, self.hostname.clone()),
            (env::MAX_AGE, self.max_age.to_string()),
            (env::USE_CONTEXT, self.use_context.to_string()),
            (env::DEBUGGER_PORT, self.debugger_port.to_string()),
            (env::DEBUGGEE_PID, self.debuggee_pid.to_string()),
            (env::ENABLE_DEBUGGER, self.enable_debugger.to_string()),
            (env::ARCHIVE_DIR, archive_dir),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    #[must_use]
    pub fn module_filter(&self) -> ModuleFilter {
        ModuleFilter {
            whitelist: self.whitelisted_modules.clone(),
            blacklist: self.blacklisted_modules.clone(),
        }
    }

    #[must_use]
    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            program: self.proxy_program.clone(),
            args: self.proxy_args.clone(),
            env: self.proxy_env(),
            logs_path: self.logs_path.clone(),
            force_restart: self.force_restart,
        }
    }

    #[must_use]
    pub fn ipc_client_config(&self) -> IpcClientConfig {
        IpcClientConfig {
            path: self.ipc_socket_path.clone(),
            ..IpcClientConfig::default()
        }
    }
}

/// Host name from `gethostname(2)`, empty if unavailable
#[must_use]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success
    #[allow(unsafe_code)]
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return String::new();
    }
    CStr::from_bytes_until_nul(&buf)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
