//! # Tracer
//!
//! The hooks the agent installs on every wrapper, and the call tree the
//! agent loop folds their output into.
//!
//! Instrumented threads never touch the call tree: [`TracerHooks`] hands
//! each completed trace to a bounded channel with `try_send`, dropping it
//! when the agent loop falls behind.

pub mod calltree;

pub use calltree::CallTree;

use crate::interception::{CallOutcome, TraceHooks};
use callscope_common::CallTrace;
use crossbeam_channel::{Sender, TrySendError};
use log::debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Capacity of the trace hand-off channel
pub const TRACE_CHANNEL_CAPACITY: usize = 1000;

pub struct TracerHooks {
    tx: Sender<CallTrace>,
    recording: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl TracerHooks {
    #[must_use]
    pub fn new(tx: Sender<CallTrace>, recording: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            recording,
            dropped: AtomicU64::new(0),
        }
    }

    /// Traces lost because the channel was full
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl TraceHooks for TracerHooks {
    fn after(&self, trace: &CallTrace, _outcome: CallOutcome<'_>) -> anyhow::Result<()> {
        if !self.recording.load(Ordering::Relaxed) {
            return Ok(());
        }
        match self.tx.try_send(trace.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    debug!("Trace channel full, {dropped} traces dropped so far");
                }
            }
            // Agent loop is gone; nothing left to deliver to
            Err(TrySendError::Disconnected(_)) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callscope_common::SiteId;
    use crossbeam_channel::bounded;

    fn trace() -> CallTrace {
        CallTrace {
            process_id: 1,
            site: SiteId::from("a:1"),
            function_name: "a".into(),
            line: 1,
            start_time: 0,
            exec_duration: 0,
            heap_delta: 0,
            nest_level: 1,
            child_duration: 0,
            called_by: None,
            callback_of: None,
        }
    }

    #[test]
    fn test_stopped_tracer_sends_nothing() {
        let (tx, rx) = bounded(4);
        let hooks = TracerHooks::new(tx, Arc::new(AtomicBool::new(false)));
        hooks.after(&trace(), CallOutcome::Returned(&())).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_channel_drops() {
        let (tx, rx) = bounded(1);
        let hooks = TracerHooks::new(tx, Arc::new(AtomicBool::new(true)));
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        hooks.after(&trace(), CallOutcome::Returned(&())).unwrap();
        hooks.after(&trace(), CallOutcome::Panicked(&*payload)).unwrap();
        assert_eq!(hooks.dropped(), 1);
        assert_eq!(rx.len(), 1);
    }
}
