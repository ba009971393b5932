//! Native debug session state: Disabled → Enabling → Enabled → Disabled.
//!
//! Pure bookkeeping with no I/O. The bridge task feeds it connection
//! events and writes whatever [`NativeSession::take_unsent`] hands back.
//!
//! Requests sit in the pending table from submission until their response
//! arrives or the connection drops. A drop discards every pending entry
//! without completing it. Crossing the high-water mark only logs; nothing
//! is ever rejected for size.

use super::transport::{NativeMessage, NativeRequest};
use crate::domain::{BridgeError, SeqId};
use log::{debug, warn};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_HIGH_WATER: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disabled,
    /// Activation sent, transport connection not yet complete
    Enabling,
    Enabled,
}

/// What the caller must do after [`NativeSession::enable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableStep {
    /// Already enabled
    Ready,
    /// A connection attempt is already under way
    InProgress,
    /// Open the transport; `signal` is set the first time in the session's
    /// lifetime, when the debuggee must be activated first
    Connect { signal: bool },
}

struct Pending<C> {
    request: NativeRequest,
    continuation: C,
    sent: bool,
}

/// Outcome of a matched response: the body on success, the failure message
/// otherwise
pub type Completion = Result<NativeMessage, String>;

pub struct NativeSession<C> {
    state: SessionState,
    next_seq: u64,
    pending: BTreeMap<u64, Pending<C>>,
    signalled: bool,
    high_water: usize,
}

impl<C> Default for NativeSession<C> {
    fn default() -> Self {
        Self::new(DEFAULT_HIGH_WATER)
    }
}

impl<C> NativeSession<C> {
    #[must_use]
    pub fn new(high_water: usize) -> Self {
        Self {
            state: SessionState::Disabled,
            next_seq: 1,
            pending: BTreeMap::new(),
            signalled: false,
            high_water,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Sequence number the next request will get
    #[must_use]
    pub fn next_seq(&self) -> SeqId {
        SeqId(self.next_seq)
    }

    pub fn enable(&mut self) -> EnableStep {
        match self.state {
            SessionState::Enabled => EnableStep::Ready,
            SessionState::Enabling => EnableStep::InProgress,
            SessionState::Disabled => {
                self.reset();
                self.state = SessionState::Enabling;
                let signal = !self.signalled;
                self.signalled = true;
                EnableStep::Connect { signal }
            }
        }
    }

    /// The transport connection completed
    pub fn connected(&mut self) {
        self.state = SessionState::Enabled;
    }

    /// The transport closed or failed; pending requests are discarded.
    ///
    /// Returns how many were dropped.
    pub fn closed(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            debug!("Discarding {dropped} pending native requests");
        }
        self.state = SessionState::Disabled;
        self.reset();
        dropped
    }

    fn reset(&mut self) {
        self.next_seq = 1;
        self.pending.clear();
    }

    /// Queue a request. Rejected only while Disabled.
    pub fn submit(
        &mut self,
        command: &str,
        arguments: Value,
        continuation: C,
    ) -> Result<SeqId, BridgeError> {
        if self.state == SessionState::Disabled {
            return Err(BridgeError::NotEnabled);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            seq,
            Pending {
                request: NativeRequest::new(seq, command, arguments),
                continuation,
                sent: false,
            },
        );
        if self.pending.len() > self.high_water {
            warn!(
                "Native request queue over high-water mark: {} pending, next {}",
                self.pending.len(),
                SeqId(self.next_seq)
            );
        }
        Ok(SeqId(seq))
    }

    /// Requests not yet written, in sequence order, marked as sent.
    ///
    /// Empty unless Enabled.
    pub fn take_unsent(&mut self) -> Vec<NativeRequest> {
        if self.state != SessionState::Enabled {
            return Vec::new();
        }
        self.pending
            .values_mut()
            .filter(|p| !p.sent)
            .map(|p| {
                p.sent = true;
                p.request.clone()
            })
            .collect()
    }

    /// Match a response to its pending request and remove it.
    ///
    /// Responses without `request_seq`, or naming a sequence that is not
    /// pending, are logged and dropped.
    pub fn complete(&mut self, response: NativeMessage) -> Option<(C, Completion)> {
        let Some(seq) = response.request_seq else {
            debug!("Native response without request_seq: {:?}", response.command);
            return None;
        };
        let Some(pending) = self.pending.remove(&seq) else {
            warn!("Native response for unknown {}: {:?}", SeqId(seq), response.command);
            return None;
        };

        let outcome = if response.success {
            Ok(response)
        } else {
            Err(response
                .message
                .unwrap_or_else(|| format!("{} failed", pending.request.command)))
        };
        Some((pending.continuation, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(seq: Option<u64>, success: bool) -> NativeMessage {
        NativeMessage {
            kind: "response".to_string(),
            request_seq: seq,
            command: Some("scripts".to_string()),
            success,
            message: (!success).then(|| "boom".to_string()),
            event: None,
            body: json!([]),
            refs: Vec::new(),
            running: None,
        }
    }

    #[test]
    fn test_submit_rejected_while_disabled() {
        let mut session: NativeSession<&str> = NativeSession::default();
        assert!(matches!(
            session.submit("scripts", Value::Null, "x"),
            Err(BridgeError::NotEnabled)
        ));
    }

    #[test]
    fn test_queued_before_connect_flushed_once_in_order() {
        let mut session = NativeSession::default();
        assert_eq!(session.enable(), EnableStep::Connect { signal: true });
        assert_eq!(session.state(), SessionState::Enabling);

        session.submit("setbreakpoint", Value::Null, "a").unwrap();
        session.submit("scripts", Value::Null, "b").unwrap();
        assert!(session.take_unsent().is_empty());

        session.connected();
        let sent: Vec<_> = session.take_unsent().into_iter().map(|r| (r.seq, r.command)).collect();
        assert_eq!(sent, vec![(1, "setbreakpoint".to_string()), (2, "scripts".to_string())]);
        assert!(session.take_unsent().is_empty());
    }

    #[test]
    fn test_unknown_sequence_leaves_pending_untouched() {
        let mut session = NativeSession::default();
        session.enable();
        session.connected();
        session.submit("scripts", Value::Null, "a").unwrap();

        assert!(session.complete(response(Some(99), true)).is_none());
        assert!(session.complete(response(None, true)).is_none());
        assert_eq!(session.pending_len(), 1);

        let (continuation, outcome) = session.complete(response(Some(1), false)).unwrap();
        assert_eq!(continuation, "a");
        assert_eq!(outcome.unwrap_err(), "boom");
        assert_eq!(session.pending_len(), 0);
    }

    #[test]
    fn test_close_discards_and_reenable_restarts_sequence() {
        let mut session = NativeSession::default();
        session.enable();
        session.connected();
        session.submit("a", Value::Null, ()).unwrap();
        session.submit("b", Value::Null, ()).unwrap();
        assert_eq!(session.next_seq(), SeqId(3));

        assert_eq!(session.closed(), 2);
        assert_eq!(session.state(), SessionState::Disabled);

        // Activation signal is sent only once per session lifetime
        assert_eq!(session.enable(), EnableStep::Connect { signal: false });
        assert_eq!(session.next_seq(), SeqId(1));
        assert_eq!(session.enable(), EnableStep::InProgress);
    }

    #[test]
    fn test_high_water_only_warns() {
        let mut session = NativeSession::new(2);
        session.enable();
        for _ in 0..5 {
            session.submit("scripts", Value::Null, ()).unwrap();
        }
        assert_eq!(session.pending_len(), 5);
    }
}
