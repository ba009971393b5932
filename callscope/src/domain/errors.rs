//! Structured error types for the proxy
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to remove stale socket {path}: {source}")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to bind IPC socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind observer server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("debugger is not enabled")]
    NotEnabled,

    #[error("native debugger protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranslateError {
    #[error("unsupported object type '{0}'")]
    UnsupportedType(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("no ref for handle {0}")]
    MissingRef(u64),
}

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        assert_eq!(BridgeError::NotEnabled.to_string(), "debugger is not enabled");
        let err = BridgeError::from(TranslateError::UnsupportedType("symbol".into()));
        assert_eq!(err.to_string(), "unsupported object type 'symbol'");
    }

    #[test]
    fn test_ipc_error_names_path() {
        let err = IpcError::Bind {
            path: PathBuf::from("/tmp/x.sock"),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to bind IPC socket /tmp/x.sock"));
    }
}
