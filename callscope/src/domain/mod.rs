//! Domain types and error enums for the proxy

pub mod errors;
pub mod types;

pub use errors::{BridgeError, IpcError, LabelError, ServerError, TranslateError};
pub use types::{ObserverId, Pid, SeqId};
