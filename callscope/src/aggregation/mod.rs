//! Call graph aggregation in the proxy: frames from every traced process
//! are folded into one graph, exported as a [`Snapshot`] on each broadcast
//! tick, then reset and aged.

pub mod aggregator;
pub mod host_metrics;
pub mod snapshot;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use host_metrics::HostMetrics;
pub use snapshot::{GraphLink, GraphNode, Snapshot};
