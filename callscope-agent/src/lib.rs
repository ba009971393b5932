//! # callscope-agent - In-Process Call Tracer
//!
//! Linked into the application being traced. Wrapped callables record one
//! [`CallTrace`](callscope_common::CallTrace) per invocation; a background
//! thread folds them into a call tree and ships it to the out-of-process
//! proxy over a Unix socket, spawning and restarting that proxy as needed.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────── traced process ───────────────────────────┐
//! │                                                                        │
//! │  app code ──▶ Intercepted::call ──▶ TracerHooks ──bounded chan──┐      │
//! │                  (interception)        (tracer)                 ▼      │
//! │                                              ┌──────────────────────┐  │
//! │                                              │ agent thread         │  │
//! │                                              │  CallTree ─▶ IpcClient ─┼──▶ proxy
//! │                                              │  Supervisor (spawn,  │  │
//! │                                              │   restart proxy)     │  │
//! │                                              └──────────────────────┘  │
//! └────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`interception`]: wrappers, wrapper table, per-thread call context,
//!   call-site classification, heap accounting
//! - [`tracer`]: hooks feeding the hand-off channel, call tree
//! - [`ipc`]: framed socket client with fixed-interval retry
//! - [`supervisor`]: proxy spawn/restart, owner of the IPC client
//! - [`agent`]: the [`Agent`] facade tying it together
//!
//! Tracing never fails the traced call: hook errors, transport errors and
//! proxy crashes are logged through the `log` facade and absorbed. The
//! agent installs no logger of its own.

pub mod agent;
pub mod config;
pub mod domain;
pub mod interception;
pub mod ipc;
pub mod supervisor;
pub mod tracer;

pub use agent::Agent;
pub use config::AgentConfig;
pub use interception::heap::TrackingAllocator;
pub use interception::{CallSite, Intercepted, Interceptor, Target};
