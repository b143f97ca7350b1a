//! Incremental decoder for OpenAI-style `data:` event streams.
//!
//! Network chunks can split a line anywhere, including inside a multi-byte
//! UTF-8 sequence, so the decoder buffers raw bytes and only decodes a line
//! once its terminating `\n` has arrived.

use serde_json::{json, Value};
use tracing::warn;

/// Sentinel payload that ends an upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest line held back waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One decoded upstream event.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamFrame {
    /// A JSON payload, kept verbatim for forwarding.
    Chunk {
        raw: String,
        /// `choices[0].delta.content`, when present.
        delta: Option<String>,
    },
    Done,
}

/// Line-buffering decoder state.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Skipping the tail of an oversized line up to its newline.
    discarding: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return every complete frame it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<UpstreamFrame> {
        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(offset) => {
                    self.discarding = false;
                    chunk = &chunk[offset + 1..];
                }
                None => return Vec::new(),
            }
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(frame) = decode_line(&self.buf[start..end]) {
                frames.push(frame);
            }
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_LINE_BYTES {
            warn!(bytes = self.buf.len(), "Dropping oversized upstream line");
            self.buf = Vec::new();
            self.discarding = true;
        }
        frames
    }

    /// Decode whatever is left once the body has ended without a final newline.
    pub fn finish(&mut self) -> Vec<UpstreamFrame> {
        let rest = std::mem::take(&mut self.buf);
        if std::mem::take(&mut self.discarding) {
            return Vec::new();
        }
        decode_line(&rest).into_iter().collect()
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(line: &[u8]) -> Option<UpstreamFrame> {
    let text = String::from_utf8_lossy(line);
    let text: &str = text.as_ref();
    let line = text.strip_suffix('\r').unwrap_or(text);
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_SENTINEL {
        return Some(UpstreamFrame::Done);
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let delta = value["choices"][0]["delta"]["content"]
                .as_str()
                .map(str::to_string);
            Some(UpstreamFrame::Chunk {
                raw: payload.to_string(),
                delta,
            })
        }
        Err(e) => {
            warn!(error = %e, payload = %truncate(payload, 120), "Dropping malformed upstream frame");
            None
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Frame `payload` as one server-sent event.
pub fn encode_data(payload: &str) -> String {
    format!("data: {}\n\n", payload)
}

/// A completion-chunk payload carrying `text` as its delta.
pub fn delta_payload(text: &str) -> String {
    json!({ "choices": [{ "delta": { "content": text } }] }).to_string()
}
