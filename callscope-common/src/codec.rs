//! Null-terminated JSON frame codec.
//!
//! ```text
//!   read #1: {"type":"a","data":1}\0{"type":"b","da
//!   read #2: ta":2}\0
//!            └── frame "b" emitted only once its terminator arrives
//! ```
//!
//! serde_json escapes control characters inside strings, so a literal `0x00`
//! never appears inside an encoded envelope.

use crate::envelope::IpcEnvelope;
use thiserror::Error;

/// Sentinel closing every frame
pub const FRAME_TERMINATOR: u8 = 0;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize an envelope and append the terminator
pub fn encode_frame(envelope: &IpcEnvelope) -> Result<Vec<u8>, FrameError> {
    let mut buf = serde_json::to_vec(envelope)?;
    buf.push(FRAME_TERMINATOR);
    Ok(buf)
}

/// Reassembles frames from arbitrary read boundaries.
///
/// Bytes after the last terminator are held until a later read completes
/// them. Empty frames (two adjacent terminators) are skipped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read; returns every frame completed by it, in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<IpcEnvelope, FrameError>> {
        self.pending.extend_from_slice(bytes);

        let Some(last) = self.pending.iter().rposition(|&b| b == FRAME_TERMINATOR) else {
            return Vec::new();
        };

        let tail = self.pending.split_off(last + 1);
        let complete = std::mem::replace(&mut self.pending, tail);

        complete
            .split(|&b| b == FRAME_TERMINATOR)
            .filter(|raw| !raw.is_empty())
            .map(|raw| serde_json::from_slice(raw).map_err(FrameError::from))
            .collect()
    }

    /// Bytes buffered while waiting for a terminator
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(kind: &str, data: serde_json::Value) -> IpcEnvelope {
        IpcEnvelope {
            kind: kind.to_string(),
            data,
        }
    }

    #[test]
    fn test_split_across_reads() {
        let bytes = encode_frame(&envelope("a", json!({"x": 1}))).unwrap();
        let (head, tail) = bytes.split_at(7);

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.pending_len(), 7);

        let frames = decoder.push(tail);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].as_ref().unwrap().data["x"], 1);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_many_frames_in_one_read_keep_order() {
        let mut bytes = Vec::new();
        for i in 0..3 {
            bytes.extend(encode_frame(&envelope("n", json!(i))).unwrap());
        }
        bytes.extend_from_slice(br#"{"type":"partial""#);

        let mut decoder = FrameDecoder::new();
        let values: Vec<_> = decoder
            .push(&bytes)
            .into_iter()
            .map(|f| f.unwrap().data)
            .collect();
        assert_eq!(values, vec![json!(0), json!(1), json!(2)]);
        assert!(decoder.pending_len() > 0);
    }

    #[test]
    fn test_empty_frames_skipped() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"\0\0{\"type\":\"t\",\"data\":null}\0\0");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_malformed_frame_does_not_poison_stream() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(b"not json\0{\"type\":\"ok\"}\0");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_err());
        assert_eq!(frames[1].as_ref().unwrap().kind, "ok");
    }

    #[test]
    fn test_embedded_nul_in_string_is_escaped() {
        let bytes = encode_frame(&envelope("s", json!("a\u{0}b"))).unwrap();
        assert_eq!(bytes.iter().filter(|&&b| b == 0).count(), 1);

        let mut decoder = FrameDecoder::new();
        let frames = decoder.push(&bytes);
        assert_eq!(frames[0].as_ref().unwrap().data, json!("a\u{0}b"));
    }
}
