//! The periodic export sent to observers as `Telemetry.update`

use super::host_metrics::HostMetrics;
use callscope_common::{FrameLink, FrameNode};
use serde::{Deserialize, Serialize};

/// Graph node as exported: the merged counters plus its idle age
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    #[serde(flatten)]
    pub node: FrameNode,
    /// Consecutive ticks without new calls
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphLink {
    #[serde(flatten)]
    pub link: FrameLink,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Proxy version
    pub version: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub host_metrics: HostMetrics,
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphLink>,
}

impl Snapshot {
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.node.name == name)
    }

    #[must_use]
    pub fn link(&self, key: &str) -> Option<&GraphLink> {
        self.links.iter().find(|l| l.link.key() == key)
    }
}
