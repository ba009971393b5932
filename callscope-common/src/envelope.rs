//! The `{type, data}` unit exchanged over the local socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message type carrying a [`crate::TraceFrame`] from the agent to the proxy
pub const TRACER_FRAME: &str = "Tracer.frame";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl IpcEnvelope {
    /// Wrap a serializable payload
    pub fn new<T: Serialize>(kind: &str, data: &T) -> serde_json::Result<Self> {
        Ok(Self {
            kind: kind.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Decode the payload into a concrete type
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TraceFrame;

    #[test]
    fn test_envelope_field_names() {
        let env = IpcEnvelope::new(TRACER_FRAME, &TraceFrame::new()).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"type":"Tracer.frame","data":{"nodes":{},"links":{}}}"#);
    }

    #[test]
    fn test_missing_data_is_null() {
        let env: IpcEnvelope = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(env.kind, "ping");
        assert!(env.data.is_null());
    }
}
