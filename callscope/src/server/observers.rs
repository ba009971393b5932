//! The set of connected observers.
//!
//! Each observer is a bounded outbox channel drained by its connection
//! task. Broadcasting pushes the same payload into every outbox
//! independently; a closed outbox is logged and skipped. An observer whose
//! outbox is full has stopped reading: its outbox is dropped, which ends
//! its connection task.
//!
//! A stalled observer stays in the connection count until its task calls
//! [`ObserverRegistry::remove`], so the transition to zero is reported
//! exactly once.

use crate::domain::ObserverId;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Messages queued per observer before it counts as stalled
pub const OUTBOX_CAPACITY: usize = 64;

pub type Outbox = mpsc::Receiver<Arc<str>>;

#[derive(Debug, Default)]
pub struct ObserverRegistry {
    next_id: u64,
    observers: BTreeMap<ObserverId, mpsc::Sender<Arc<str>>>,
    /// Outbox dropped, connection task not finished yet
    stalled: BTreeSet<ObserverId>,
}

impl ObserverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self) -> (ObserverId, Outbox) {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.observers.insert(id, tx);
        debug!("{id} connected ({} total)", self.observers.len());
        (id, rx)
    }

    /// Remove an observer; returns true when this removal emptied the set
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let removed = self.observers.remove(&id).is_some() | self.stalled.remove(&id);
        if !removed {
            return false;
        }
        debug!("{id} disconnected ({} left)", self.observers.len());
        self.observers.is_empty() && self.stalled.is_empty()
    }

    /// Queue `message` for every observer; returns how many accepted it
    pub fn broadcast(&mut self, message: &str) -> usize {
        let payload: Arc<str> = Arc::from(message);
        let mut delivered = 0;
        let mut stalled = Vec::new();
        for (id, outbox) in &self.observers {
            match outbox.try_send(Arc::clone(&payload)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Send to {id} failed: {OUTBOX_CAPACITY} messages unread, disconnecting");
                    stalled.push(*id);
                }
                Err(TrySendError::Closed(_)) => warn!("Send to {id} failed: connection gone"),
            }
        }
        for id in stalled {
            self.observers.remove(&id);
            self.stalled.insert(id);
        }
        delivered
    }

    /// Drop every outbox, which ends every connection task
    pub fn clear(&mut self) {
        self.observers.clear();
        self.stalled.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_observer_does_not_block_others() {
        let mut registry = ObserverRegistry::new();
        let (_, mut first) = registry.register();
        let (_, failed) = registry.register();
        let (_, mut third) = registry.register();
        drop(failed);

        assert_eq!(registry.broadcast("hello"), 2);
        assert_eq!(&*first.try_recv().unwrap(), "hello");
        assert_eq!(&*third.try_recv().unwrap(), "hello");
    }

    #[test]
    fn test_remove_reports_transition_to_empty() {
        let mut registry = ObserverRegistry::new();
        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();

        assert!(!registry.remove(a));
        assert!(registry.remove(b));
        // Unknown ids never report a transition
        assert!(!registry.remove(b));
    }

    #[test]
    fn test_stalled_observer_is_disconnected() {
        let mut registry = ObserverRegistry::new();
        let (reader, mut reading) = registry.register();
        let (idle, mut not_reading) = registry.register();

        for n in 0..OUTBOX_CAPACITY {
            assert_eq!(registry.broadcast(&format!("update {n}")), 2);
            assert_eq!(&*reading.try_recv().unwrap(), format!("update {n}"));
        }
        // The idle outbox is full: only the reader gets this one
        assert_eq!(registry.broadcast("overflow"), 1);
        assert_eq!(&*reading.try_recv().unwrap(), "overflow");
        assert_eq!(registry.len(), 1);

        // Queued messages drain, then the outbox reports closed
        for _ in 0..OUTBOX_CAPACITY {
            assert!(not_reading.try_recv().is_ok());
        }
        assert!(matches!(
            not_reading.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        // Zero is reported once, after both tasks have finished
        assert!(!registry.remove(reader));
        assert!(registry.remove(idle));
        assert!(!registry.remove(idle));
    }

    #[test]
    fn test_stalled_observer_leaving_last_reports_empty() {
        let mut registry = ObserverRegistry::new();
        let (reader, _reading) = registry.register();
        let (idle, _not_reading) = registry.register();
        for _ in 0..=OUTBOX_CAPACITY {
            registry.broadcast("update");
        }

        assert!(!registry.remove(reader));
        assert!(registry.remove(idle));
    }
}
