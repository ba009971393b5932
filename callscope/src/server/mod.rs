//! Observer-facing side of the proxy: the websocket broadcast server and
//! the routing of inbound observer messages.

pub mod observers;
pub mod router;
pub mod websocket;

pub use observers::ObserverRegistry;
pub use router::{InboundMessage, Namespace};
pub use websocket::{BroadcastServer, ServerEvent};
