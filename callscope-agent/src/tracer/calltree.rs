//! In-process call tree: folds completed traces into the frame shipped to
//! the proxy on every flush.

use callscope_common::{CallTrace, TraceFrame};
use crossbeam_channel::Receiver;

#[derive(Debug, Default)]
pub struct CallTree {
    frame: TraceFrame,
    traces_seen: u64,
}

impl CallTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trace: &CallTrace) {
        self.frame.record(trace);
        self.traces_seen += 1;
    }

    /// Fold every trace waiting in the channel; returns how many were folded
    pub fn drain(&mut self, rx: &Receiver<CallTrace>) -> usize {
        let mut count = 0;
        while let Ok(trace) = rx.try_recv() {
            self.record(&trace);
            count += 1;
        }
        count
    }

    /// Hand over the current frame and start an empty one.
    ///
    /// Returns `None` when nothing was recorded since the last take.
    pub fn take_frame(&mut self) -> Option<TraceFrame> {
        if self.frame.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.frame))
    }

    /// Traces folded over the tree's lifetime
    #[must_use]
    pub fn traces_seen(&self) -> u64 {
        self.traces_seen
    }
}
