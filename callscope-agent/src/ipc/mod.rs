//! Framed IPC transport, client role (traced process → proxy)

pub mod client;

pub use client::{IpcClient, IpcClientConfig};
