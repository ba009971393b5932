//! Call graph fragments: nodes keyed by `"<pid>:<siteId>"`, links keyed by
//! `"<source>-<target>-<type>"`.
//!
//! The same merge rules are applied twice: once inside the traced process
//! when traces are folded into a frame, and again in the proxy when frames
//! are folded into the aggregate.

use crate::trace::{node_key, CallTrace, LinkType, SiteId, TraceOrigin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregated statistics for one call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameNode {
    /// Node key (`"<pid>:<siteId>"`)
    pub name: String,
    pub id: SiteId,
    pub pid: u32,
    /// Display label; starts as the function name
    pub fun_name: String,
    pub line: u32,
    pub num_calls: u64,
    pub duration: u64,
    pub mem_delta: i64,
    pub nest_level: u32,
    pub child_duration: u64,
}

impl FrameNode {
    /// Node for the first trace seen at a site
    #[must_use]
    pub fn from_trace(trace: &CallTrace) -> Self {
        Self {
            name: trace.node_key(),
            id: trace.site.clone(),
            pid: trace.process_id,
            fun_name: trace.function_name.clone(),
            line: trace.line,
            num_calls: 1,
            duration: trace.exec_duration,
            mem_delta: trace.heap_delta,
            nest_level: trace.nest_level,
            child_duration: trace.child_duration,
        }
    }

    /// Fold another node for the same key into this one.
    ///
    /// `nest_level` is averaged with the pre-merge call counts as weights,
    /// truncated on every merge.
    pub fn absorb(&mut self, other: &FrameNode) {
        self.nest_level =
            fold_nest_level(self.nest_level, self.num_calls, other.nest_level, other.num_calls);
        self.num_calls += other.num_calls;
        self.duration += other.duration;
        self.mem_delta += other.mem_delta;
        self.child_duration += other.child_duration;
    }

    /// Zero the per-window counters, keeping identity and label
    pub fn reset_counters(&mut self) {
        self.num_calls = 0;
        self.duration = 0;
        self.mem_delta = 0;
        self.nest_level = 0;
        self.child_duration = 0;
    }
}

/// Edge between two call sites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLink {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub link_type: LinkType,
    pub num_calls: u64,
    /// Sum of (call start - origin start), microseconds
    pub total_delay: u64,
}

impl FrameLink {
    #[must_use]
    pub fn key(&self) -> String {
        link_key(&self.source, &self.target, self.link_type)
    }

    pub fn absorb(&mut self, other: &FrameLink) {
        self.num_calls += other.num_calls;
        self.total_delay += other.total_delay;
    }

    pub fn reset_counters(&mut self) {
        self.num_calls = 0;
        self.total_delay = 0;
    }
}

/// Link key: `"<source>-<target>-<type>"`
#[must_use]
pub fn link_key(source: &str, target: &str, link_type: LinkType) -> String {
    format!("{source}-{target}-{}", link_type.as_str())
}

/// Call-count-weighted running average, truncated to an integer.
///
/// With no prior calls the incoming level is taken as-is.
#[must_use]
pub fn fold_nest_level(old: u32, old_count: u64, incoming: u32, incoming_count: u64) -> u32 {
    let total = old_count + incoming_count;
    if total == 0 {
        return incoming;
    }
    let weighted = u64::from(old) * old_count + u64::from(incoming) * incoming_count;
    u32::try_from(weighted / total).unwrap_or(u32::MAX)
}

/// Nodes and links accumulated over one interval
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub nodes: BTreeMap<String, FrameNode>,
    pub links: BTreeMap<String, FrameLink>,
}

impl TraceFrame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// Fold one completed trace: update its node, then the `call` and
    /// `callback` links pointing at it.
    pub fn record(&mut self, trace: &CallTrace) {
        let incoming = FrameNode::from_trace(trace);
        self.nodes
            .entry(incoming.name.clone())
            .and_modify(|node| node.absorb(&incoming))
            .or_insert(incoming);

        let target = trace.node_key();
        if let Some(origin) = &trace.called_by {
            self.record_link(origin, &target, LinkType::Call, trace.start_time);
        }
        if let Some(origin) = &trace.callback_of {
            self.record_link(origin, &target, LinkType::Callback, trace.start_time);
        }
    }

    fn record_link(&mut self, origin: &TraceOrigin, target: &str, link_type: LinkType, start: u64) {
        let link = FrameLink {
            source: node_key(origin.process_id, &origin.site),
            target: target.to_string(),
            link_type,
            num_calls: 1,
            total_delay: start.saturating_sub(origin.start_time),
        };
        self.links
            .entry(link.key())
            .and_modify(|existing| existing.absorb(&link))
            .or_insert(link);
    }

    /// Fold a whole frame into this one
    pub fn merge(&mut self, other: TraceFrame) {
        for (key, node) in other.nodes {
            match self.nodes.get_mut(&key) {
                Some(existing) => existing.absorb(&node),
                None => {
                    self.nodes.insert(key, node);
                }
            }
        }
        for (key, link) in other.links {
            match self.links.get_mut(&key) {
                Some(existing) => existing.absorb(&link),
                None => {
                    self.links.insert(key, link);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(site: &str, duration: u64, heap: i64, nest: u32) -> CallTrace {
        CallTrace {
            process_id: 7,
            site: SiteId::from(site),
            function_name: "handler".to_string(),
            line: 10,
            start_time: 1_000,
            exec_duration: duration,
            heap_delta: heap,
            nest_level: nest,
            child_duration: 0,
            called_by: None,
            callback_of: None,
        }
    }

    #[test]
    fn test_record_sums_counters() {
        let mut frame = TraceFrame::new();
        frame.record(&trace("m.js:10", 5, 100, 1));
        frame.record(&trace("m.js:10", 7, 50, 1));

        let node = &frame.nodes["7:m.js:10"];
        assert_eq!(node.num_calls, 2);
        assert_eq!(node.duration, 12);
        assert_eq!(node.mem_delta, 150);
    }

    #[test]
    fn test_nest_level_truncates_each_merge() {
        // (1*1 + 2*1) / 2 = 1.5 -> 1, then (1*2 + 2*1) / 3 = 1.33 -> 1
        let mut frame = TraceFrame::new();
        frame.record(&trace("a:1", 1, 0, 1));
        frame.record(&trace("a:1", 1, 0, 2));
        assert_eq!(frame.nodes["7:a:1"].nest_level, 1);
        frame.record(&trace("a:1", 1, 0, 2));
        assert_eq!(frame.nodes["7:a:1"].nest_level, 1);
    }

    #[test]
    fn test_fold_nest_level_empty_side() {
        assert_eq!(fold_nest_level(0, 0, 4, 3), 4);
        assert_eq!(fold_nest_level(3, 2, 0, 0), 3);
    }

    #[test]
    fn test_call_and_callback_links() {
        let mut frame = TraceFrame::new();
        let mut t = trace("b:2", 1, 0, 2);
        t.start_time = 1_500;
        t.called_by = Some(TraceOrigin {
            process_id: 7,
            site: SiteId::from("a:1"),
            start_time: 1_000,
        });
        t.callback_of = Some(TraceOrigin {
            process_id: 7,
            site: SiteId::from("c:3"),
            start_time: 200,
        });
        frame.record(&t);
        frame.record(&t);

        let call = &frame.links["7:a:1-7:b:2-call"];
        assert_eq!(call.num_calls, 2);
        assert_eq!(call.total_delay, 1_000);

        let callback = &frame.links["7:c:3-7:b:2-callback"];
        assert_eq!(callback.link_type, LinkType::Callback);
        assert_eq!(callback.total_delay, 2_600);
    }

    #[test]
    fn test_merge_frames() {
        let mut left = TraceFrame::new();
        left.record(&trace("a:1", 3, 10, 0));
        let mut right = TraceFrame::new();
        right.record(&trace("a:1", 4, -5, 0));
        right.record(&trace("b:1", 1, 0, 0));

        left.merge(right);
        assert_eq!(left.nodes.len(), 2);
        assert_eq!(left.nodes["7:a:1"].duration, 7);
        assert_eq!(left.nodes["7:a:1"].mem_delta, 5);
    }

    #[test]
    fn test_link_serializes_type_field() {
        let link = FrameLink {
            source: "1:a".into(),
            target: "1:b".into(),
            link_type: LinkType::Call,
            num_calls: 1,
            total_delay: 0,
        };
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json["type"], "call");
    }
}
