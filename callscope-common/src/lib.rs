//! # Shared Data Structures (traced process ↔ proxy)
//!
//! Types and constants shared between the agent linked into the traced
//! process and the out-of-process proxy. Everything here crosses the IPC
//! socket as JSON, so field names are part of the wire format.
//!
//! ## Key Types
//!
//! - [`CallTrace`] - One intercepted invocation
//! - [`TraceFrame`] - Call graph fragment (nodes + links) folded from traces
//! - [`IpcEnvelope`] - `{type, data}` unit carried over the socket
//! - [`FrameDecoder`] - Null-terminated frame reassembly
//!
//! ## Wire Format
//!
//! ```text
//! {"type":"Tracer.frame","data":{"nodes":{...},"links":{...}}}\0
//! ```

pub mod codec;
pub mod env;
pub mod envelope;
pub mod frame;
pub mod trace;

pub use codec::{encode_frame, FrameDecoder, FrameError, FRAME_TERMINATOR};
pub use envelope::{IpcEnvelope, TRACER_FRAME};
pub use frame::{fold_nest_level, link_key, FrameLink, FrameNode, TraceFrame};
pub use trace::{node_key, CallTrace, LinkType, SiteId, TraceOrigin, ANONYMOUS};
