//! Server role of the framed IPC transport

pub mod server;

pub use server::IpcServer;
