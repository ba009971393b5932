//! Per-call trace records produced by the interception wrapper.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Function name recorded for callables that have no name of their own.
///
/// Nodes carrying this name are candidates for label resolution.
pub const ANONYMOUS: &str = "anonymous";

/// Stable identity of one static call site: `"<file>:<position>"`.
///
/// The file component is everything before the first `:`; the position part
/// is opaque (usually `line:column`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Build a site id from a source location
    pub fn new(file: &str, line: u32, column: u32) -> Self {
        Self(format!("{file}:{line}:{column}"))
    }

    /// Source file component of the id
    #[must_use]
    pub fn file(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Kind of edge between two call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    /// Synchronous call from a caller that was still on the stack
    Call,
    /// Deferred invocation of a callable created inside another call
    Callback,
}

impl LinkType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LinkType::Call => "call",
            LinkType::Callback => "callback",
        }
    }
}

/// The call a trace originates from (its caller, or the call that created
/// the callback being invoked).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceOrigin {
    pub process_id: u32,
    pub site: SiteId,
    /// Wall-clock start of the originating call, microseconds since epoch
    pub start_time: u64,
}

/// One intercepted invocation.
///
/// Built by the wrapper, immutable once the call completes, then folded
/// into a [`crate::TraceFrame`] and discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTrace {
    pub process_id: u32,
    pub site: SiteId,
    pub function_name: String,
    /// Source line of the wrapped callable (used for label lookup)
    pub line: u32,
    /// Wall-clock start, microseconds since epoch
    pub start_time: u64,
    /// Execution time in microseconds
    pub exec_duration: u64,
    /// Change in heap bytes in use across the call
    pub heap_delta: i64,
    /// Number of intercepted calls active on this thread at invocation
    pub nest_level: u32,
    /// Exec time spent in direct intercepted children, microseconds
    pub child_duration: u64,
    pub called_by: Option<TraceOrigin>,
    pub callback_of: Option<TraceOrigin>,
}

impl CallTrace {
    /// Aggregation key of the node this trace folds into
    #[must_use]
    pub fn node_key(&self) -> String {
        node_key(self.process_id, &self.site)
    }
}

/// Node key: `"<pid>:<siteId>"`
#[must_use]
pub fn node_key(process_id: u32, site: &SiteId) -> String {
    format!("{process_id}:{site}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_id_file_component() {
        let site = SiteId::new("src/routes.rs", 12, 4);
        assert_eq!(site.as_str(), "src/routes.rs:12:4");
        assert_eq!(site.file(), "src/routes.rs");
    }

    #[test]
    fn test_link_type_wire_name() {
        let json = serde_json::to_string(&LinkType::Callback).unwrap();
        assert_eq!(json, "\"callback\"");
        assert_eq!(LinkType::Call.as_str(), "call");
    }

    #[test]
    fn test_node_key_includes_pid() {
        assert_eq!(node_key(42, &SiteId::from("m.js:10")), "42:m.js:10");
    }
}
