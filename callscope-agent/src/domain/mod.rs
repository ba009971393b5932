//! Domain errors for the agent

pub mod errors;

pub use errors::{AgentError, SupervisorError};
