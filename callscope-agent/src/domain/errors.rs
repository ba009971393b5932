//! Structured error types for the agent
//!
//! None of these ever reach a traced call; they surface only from agent
//! construction and supervisor operations.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn proxy '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open proxy log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to start agent runtime: {0}")]
    RuntimeInit(#[source] std::io::Error),

    #[error("Failed to spawn agent thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
