//! Inbound observer messages and their `Namespace.verb` routing

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{"method": "<Namespace>.<Verb>", "params": {...}, "id": n}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// Closed set of protocol namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Namespace {
    /// Call graph telemetry (`Telemetry.update`, `Telemetry.getCode`)
    Telemetry,
    Debugger,
    /// Served by the Debugger handler set
    Runtime,
    Console,
    Css,
    Network,
    Page,
    Inspector,
    Profiler,
    Unknown(String),
}

impl Namespace {
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "Telemetry" => Self::Telemetry,
            "Debugger" => Self::Debugger,
            "Runtime" => Self::Runtime,
            "Console" => Self::Console,
            "CSS" => Self::Css,
            "Network" => Self::Network,
            "Page" => Self::Page,
            "Inspector" => Self::Inspector,
            "Profiler" => Self::Profiler,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl InboundMessage {
    /// Split `method` on the first `.`; a method without one has an empty verb
    #[must_use]
    pub fn route(&self) -> (Namespace, &str) {
        let (namespace, verb) = self.method.split_once('.').unwrap_or((self.method.as_str(), ""));
        (Namespace::parse(namespace), verb)
    }

    /// String parameter by name
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(method: &str) -> InboundMessage {
        InboundMessage {
            method: method.to_string(),
            params: Value::Null,
            id: Some(1),
        }
    }

    #[test]
    fn test_route_splits_on_first_dot() {
        let msg = message("Debugger.setBreakpointByUrl");
        assert_eq!(msg.route(), (Namespace::Debugger, "setBreakpointByUrl"));

        let msg = message("Page.a.b");
        assert_eq!(msg.route(), (Namespace::Page, "a.b"));

        let msg = message("Timeline");
        assert_eq!(msg.route(), (Namespace::Unknown("Timeline".into()), ""));
    }

    #[test]
    fn test_parse_inbound() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"method":"Telemetry.getCode","params":{"name":"a.rs"}}"#)
                .unwrap();
        assert_eq!(msg.route().0, Namespace::Telemetry);
        assert_eq!(msg.param_str("name"), Some("a.rs"));
        assert_eq!(msg.id, None);
    }
}
