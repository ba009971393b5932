//! Window-based call graph aggregation.
//!
//! ```text
//!   ingest / ingest_frame          tick()
//!   ─────────────────────          ──────────────────────────────────────
//!   add counters,                  1. snapshot current totals
//!   age = 0, mark active           2. active entries: zero counters, age = 0
//!                                     idle entries:   age += 1, evict once
//!                                                     age reaches max_age
//! ```
//!
//! Counters in a snapshot therefore cover exactly one window. Entry identity
//! and label survive until the entry has been idle for `max_age` ticks.
//!
//! When `use_context` is set, nodes still named `anonymous` are relabelled
//! from the [`LabelSource`] on every merge, so a label that resolves later
//! replaces the placeholder without touching accumulated counters.

use super::host_metrics::HostMetrics;
use super::snapshot::{GraphLink, GraphNode, Snapshot};
use crate::labels::LabelSource;
use callscope_common::{env, CallTrace, FrameNode, TraceFrame, ANONYMOUS};
use std::collections::btree_map::{BTreeMap, Entry};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Idle ticks after which an entry is evicted
    pub max_age: u32,
    /// Relabel anonymous nodes from source context
    pub use_context: bool,
    pub hostname: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            max_age: env::DEFAULT_MAX_AGE,
            use_context: true,
            hostname: String::new(),
        }
    }
}

/// Per-window bookkeeping shared by nodes and links
trait Windowed {
    fn absorb(&mut self, incoming: &Self);
    fn reset_counters(&mut self);
    fn age_mut(&mut self) -> &mut u32;
}

impl Windowed for GraphNode {
    fn absorb(&mut self, incoming: &Self) {
        self.node.fun_name.clone_from(&incoming.node.fun_name);
        self.node.absorb(&incoming.node);
    }

    fn reset_counters(&mut self) {
        self.node.reset_counters();
    }

    fn age_mut(&mut self) -> &mut u32 {
        &mut self.age
    }
}

impl Windowed for GraphLink {
    fn absorb(&mut self, incoming: &Self) {
        self.link.absorb(&incoming.link);
    }

    fn reset_counters(&mut self) {
        self.link.reset_counters();
    }

    fn age_mut(&mut self) -> &mut u32 {
        &mut self.age
    }
}

struct Tracked<T> {
    item: T,
    /// Received activity in the current window
    active: bool,
}

fn fold<T: Windowed>(map: &mut BTreeMap<String, Tracked<T>>, key: String, incoming: T) {
    match map.entry(key) {
        Entry::Occupied(mut occupied) => {
            let tracked = occupied.get_mut();
            tracked.item.absorb(&incoming);
            *tracked.item.age_mut() = 0;
            tracked.active = true;
        }
        Entry::Vacant(vacant) => {
            vacant.insert(Tracked {
                item: incoming,
                active: true,
            });
        }
    }
}

fn age_out<T: Windowed>(map: &mut BTreeMap<String, Tracked<T>>, max_age: u32) {
    map.retain(|_, tracked| {
        if tracked.active {
            tracked.active = false;
            tracked.item.reset_counters();
            *tracked.item.age_mut() = 0;
            true
        } else {
            let age = tracked.item.age_mut();
            *age += 1;
            *age < max_age
        }
    });
}

pub struct Aggregator {
    config: AggregatorConfig,
    labels: Box<dyn LabelSource>,
    nodes: BTreeMap<String, Tracked<GraphNode>>,
    links: BTreeMap<String, Tracked<GraphLink>>,
}

impl Aggregator {
    #[must_use]
    pub fn new(config: AggregatorConfig, labels: Box<dyn LabelSource>) -> Self {
        Self {
            config,
            labels,
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Fold a single trace
    pub fn ingest(&mut self, trace: &CallTrace) {
        let mut frame = TraceFrame::new();
        frame.record(trace);
        self.ingest_frame(frame);
    }

    /// Fold a frame shipped by an agent
    pub fn ingest_frame(&mut self, frame: TraceFrame) {
        for (key, mut node) in frame.nodes {
            if self.config.use_context {
                self.relabel(&mut node);
            }
            fold(&mut self.nodes, key, GraphNode { node, age: 0 });
        }
        for (key, link) in frame.links {
            fold(&mut self.links, key, GraphLink { link, age: 0 });
        }
    }

    fn relabel(&mut self, node: &mut FrameNode) {
        if node.fun_name != ANONYMOUS {
            return;
        }
        let file = node.id.file();
        self.labels.prepare(file);
        if let Some(label) = self.labels.resolve(file, node.line) {
            node.fun_name = label;
        }
    }

    /// Export the current window, then reset counters and age entries
    pub fn tick(&mut self) -> Snapshot {
        let snapshot = Snapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: now_millis(),
            host_metrics: HostMetrics::sample(&self.config.hostname),
            nodes: self.nodes.values().map(|t| t.item.clone()).collect(),
            links: self.links.values().map(|t| t.item.clone()).collect(),
        };

        age_out(&mut self.nodes, self.config.max_age);
        age_out(&mut self.links, self.config.max_age);
        snapshot
    }

    #[must_use]
    pub fn node(&self, key: &str) -> Option<&GraphNode> {
        self.nodes.get(key).map(|t| &t.item)
    }

    #[must_use]
    pub fn link(&self, key: &str) -> Option<&GraphLink> {
        self.links.get(key).map(|t| &t.item)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
