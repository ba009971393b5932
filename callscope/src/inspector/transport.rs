//! Native debug transport framing: `Content-Length: <n>\r\n\r\n<json>`.
//!
//! Incoming messages may carry extra headers (the connect banner has only
//! headers and an empty body); only `Content-Length` is interpreted and
//! empty bodies are skipped.

use crate::domain::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const HEADER_END: &[u8] = b"\r\n\r\n";
const CONTENT_LENGTH: &str = "content-length";

/// `{seq, type: "request", command, arguments}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeRequest {
    pub seq: u64,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub command: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub arguments: Value,
}

impl NativeRequest {
    #[must_use]
    pub fn new(seq: u64, command: &str, arguments: Value) -> Self {
        Self {
            seq,
            kind: "request",
            command: command.to_string(),
            arguments,
        }
    }
}

/// A response (`type: "response"`, correlated by `request_seq`) or an
/// event (`type: "event"`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NativeMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_seq: Option<u64>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub refs: Vec<Value>,
    #[serde(default)]
    pub running: Option<bool>,
}

pub fn encode_request(request: &NativeRequest) -> Result<Vec<u8>, BridgeError> {
    let body = serde_json::to_string(request)?;
    Ok(format!("Content-Length: {}\r\n\r\n{body}", body.len()).into_bytes())
}

/// Reassembles native messages across read boundaries
#[derive(Debug, Default)]
pub struct NativeDecoder {
    buf: Vec<u8>,
}

impl NativeDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<NativeMessage, BridgeError>> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        while let Some(header_len) = find(&self.buf, HEADER_END) {
            let length = content_length(&String::from_utf8_lossy(&self.buf[..header_len]));
            let Some(length) = length else {
                let headers = String::from_utf8_lossy(&self.buf[..header_len]).into_owned();
                self.buf.drain(..header_len + HEADER_END.len());
                messages.push(Err(BridgeError::Protocol(format!(
                    "message without Content-Length: {headers:?}"
                ))));
                continue;
            };

            let start = header_len + HEADER_END.len();
            if self.buf.len() < start + length {
                break;
            }
            let frame: Vec<u8> = self.buf.drain(..start + length).skip(start).collect();
            if frame.is_empty() {
                continue;
            }
            messages.push(serde_json::from_slice(&frame).map_err(BridgeError::from));
        }
        messages
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn content_length(headers: &str) -> Option<usize> {
    headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
