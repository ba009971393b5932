//! # callscope - Call Graph Proxy
//!
//! Out-of-process half of callscope. Instrumented processes (see the
//! `callscope-agent` crate) ship call-graph fragments over a local socket;
//! the proxy merges them into a windowed graph and streams a snapshot to
//! every connected observer on a fixed interval. It can also bridge the
//! observers' debugger namespaces to the traced process's native debugger.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │              Traced process (callscope-agent)                │
//! │   wrap(target, call_site!()) ─► per-frame call tree          │
//! └──────────────────────────┬───────────────────────────────────┘
//!                            │ {"type":"Tracer.frame",...}\0
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     callscope (this crate)                   │
//! │                                                              │
//! │  ┌────────────┐   ┌──────────────┐   ┌──────────────────┐    │
//! │  │ IpcServer  │──▶│  Aggregator  │──▶│ BroadcastServer  │──▶ observers
//! │  └────────────┘   └──────┬───────┘   └────────▲─────────┘    │
//! │                          │                    │              │
//! │                   ┌──────▼───────┐   ┌────────┴─────────┐    │
//! │                   │ SourceLabels │   │  BridgeHandle    │◀──▶ native
//! │                   │   (syn)      │   │  (Inspector)     │    debugger
//! │                   └──────────────┘   └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`ipc`]: Local socket server, null-terminated JSON frames
//! - [`aggregation`]: Windowed call graph with aging, host metrics, snapshots
//! - [`labels`]: Names for anonymous closures from their source context
//! - [`server`]: Websocket observer server and `Namespace.verb` routing
//! - [`inspector`]: Debugger bridge (native session, translation, dispatch)
//! - [`proxy`]: The event loop tying the above together, snapshot archive
//! - [`cli`]: Command-line arguments (mirrors the agent's environment)
//! - [`domain`]: Newtypes and error enums
//!
//! ## Aging
//!
//! Each broadcast tick exports the current window and then resets every
//! counter. Entries idle for a tick grow one older; at `max_age` they are
//! evicted. The tick that evicts an entry still includes it in its snapshot.

pub mod aggregation;
pub mod cli;
pub mod domain;
pub mod inspector;
pub mod ipc;
pub mod labels;
pub mod proxy;
pub mod server;
