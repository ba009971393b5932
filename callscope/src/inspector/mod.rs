//! Debugger bridge: observer debugger namespaces ⇄ native debug protocol

pub mod bridge;
pub mod debugger;
pub mod domains;
pub mod session;
pub mod translate;
pub mod transport;

pub use bridge::{BridgeConfig, BridgeHandle, DebuggeeSignal, Sigusr1};
pub use domains::{Effect, Inspector};
pub use session::{NativeSession, SessionState};
