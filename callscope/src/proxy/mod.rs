//! Proxy process: ties the IPC server, aggregator, observer server and
//! debugger bridge together

pub mod archive;
pub mod hub;
pub mod source;

pub use archive::{Archive, DirectoryArchive, NullArchive};
pub use hub::{telemetry_update, ExitReason, Proxy, ProxyConfig, DEFAULT_BROADCAST_INTERVAL};
