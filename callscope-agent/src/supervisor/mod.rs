//! Spawn/restart half of process supervision

pub mod launcher;

pub use launcher::{LaunchConfig, Supervisor};
