//! SSE parsing for streaming model responses.
//!
//! The accumulator receives raw body chunks and maintains a byte-level
//! line buffer: chunks never align with line boundaries, so the last
//! partial line is carried into the next push. Two payload shapes share
//! the `data:` framing — the DashScope envelope (`output.text` is the
//! incremental delta, `output.finish_reason == "stop"` ends the stream)
//! and the OpenAI delta shape (`choices[0].delta.content`, terminated by
//! the `[DONE]` literal or stream end). That shape sniff lives here and
//! nowhere else.

use serde_json::Value;

use crate::{DistillError, Result};

/// Streaming line parser and text accumulator.
///
/// Each delta is handed to the caller's callback *before* being appended,
/// preserving strict in-order delivery; once a terminal marker is seen no
/// further callbacks fire.
pub struct SseAccumulator {
    buffer: Vec<u8>,
    full: String,
}

impl Default for SseAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self { buffer: Vec::new(), full: String::new() }
    }

    /// Feeds one body chunk. Returns the accumulated full text when a
    /// terminal marker (`[DONE]` or a vendor stop sentinel) was consumed.
    pub fn push_bytes<F: FnMut(&str)>(&mut self, bytes: &[u8], on_chunk: &mut F) -> Option<String> {
        self.buffer.extend_from_slice(bytes);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(full) = self.handle_line(line.trim(), on_chunk) {
                return Some(full);
            }
        }
        None
    }

    /// The stream ended without an explicit terminal marker. Non-empty
    /// accumulated text resolves gracefully; an empty stream is an error.
    pub fn finish(mut self) -> Result<String> {
        // A final unterminated line may still hold a data payload.
        if !self.buffer.is_empty() {
            let tail: Vec<u8> = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&tail).trim().to_string();
            let mut sink = |_: &str| {};
            if let Some(full) = self.handle_line(&line, &mut sink) {
                return Ok(full);
            }
        }
        if self.full.is_empty() { Err(DistillError::EmptyStream) } else { Ok(self.full) }
    }

    fn handle_line<F: FnMut(&str)>(&mut self, line: &str, on_chunk: &mut F) -> Option<String> {
        if line.is_empty() {
            return None;
        }
        // Non-data SSE fields (id:, event:, comments) carry no payload.
        let Some(data) = line.strip_prefix("data:") else {
            return None;
        };
        let data = data.trim();

        if data == "[DONE]" {
            return Some(std::mem::take(&mut self.full));
        }

        let parsed: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => {
                let preview: String = data.chars().take(100).collect();
                tracing::warn!(error = %err, %preview, "skipping malformed stream line");
                return None;
            }
        };

        // DashScope envelope first, OpenAI delta shape as the fallback.
        if let Some(output) = parsed.get("output") {
            if output.get("finish_reason").and_then(Value::as_str) == Some("stop") {
                return Some(std::mem::take(&mut self.full));
            }
            if let Some(delta) = output.get("text").and_then(Value::as_str)
                && !delta.is_empty()
            {
                on_chunk(delta);
                self.full.push_str(delta);
            }
            return None;
        }

        if let Some(delta) = parsed
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("delta"))
            .and_then(|d| d.get("content"))
            .and_then(Value::as_str)
            && !delta.is_empty()
        {
            on_chunk(delta);
            self.full.push_str(delta);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut SseAccumulator, chunks: &mut Vec<String>, input: &str) -> Option<String> {
        let mut on_chunk = |delta: &str| chunks.push(delta.to_string());
        acc.push_bytes(input.as_bytes(), &mut on_chunk)
    }

    #[test]
    fn test_openai_chunks_concatenate_in_order() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        assert!(feed(&mut acc, &mut chunks, "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n").is_none());
        assert!(feed(&mut acc, &mut chunks, "data: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n\n").is_none());
        let full = feed(&mut acc, &mut chunks, "data: [DONE]\n").unwrap();

        assert_eq!(full, "Hello world");
        assert_eq!(chunks.concat(), full);
        assert_eq!(chunks, vec!["Hello", " world"]);
    }

    #[test]
    fn test_partial_lines_buffer_across_chunks() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"split\"}}]}\n";
        let (first, second) = line.split_at(20);
        assert!(feed(&mut acc, &mut chunks, first).is_none());
        assert!(chunks.is_empty(), "no callback until the line completes");
        assert!(feed(&mut acc, &mut chunks, second).is_none());
        assert_eq!(chunks, vec!["split"]);
    }

    #[test]
    fn test_vendor_stop_sentinel_terminates() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        assert!(feed(&mut acc, &mut chunks, "data: {\"output\":{\"text\":\"你好\",\"finish_reason\":null}}\n").is_none());
        let full =
            feed(&mut acc, &mut chunks, "data: {\"output\":{\"text\":\"\",\"finish_reason\":\"stop\"}}\n").unwrap();

        assert_eq!(full, "你好");
        assert_eq!(chunks, vec!["你好"]);
    }

    #[test]
    fn test_malformed_line_skipped_not_fatal() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        assert!(feed(&mut acc, &mut chunks, "data: {broken json\n").is_none());
        assert!(feed(&mut acc, &mut chunks, "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n").is_none());
        let full = feed(&mut acc, &mut chunks, "data: [DONE]\n").unwrap();
        assert_eq!(full, "ok");
    }

    #[test]
    fn test_metadata_lines_ignored() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        assert!(feed(&mut acc, &mut chunks, "id: 42\nevent: message\n: keepalive\n").is_none());
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_end_without_marker_resolves_with_text() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();
        feed(&mut acc, &mut chunks, "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n");

        assert_eq!(acc.finish().unwrap(), "partial");
    }

    #[test]
    fn test_end_with_empty_accumulator_errors() {
        let acc = SseAccumulator::new();
        assert!(matches!(acc.finish(), Err(DistillError::EmptyStream)));
    }

    #[test]
    fn test_multibyte_delta_split_mid_character() {
        let mut acc = SseAccumulator::new();
        let mut chunks = Vec::new();

        let line = "data: {\"output\":{\"text\":\"内容\"}}\n".as_bytes();
        // Split inside the UTF-8 bytes of 内.
        let split = line.iter().position(|&b| b > 0x7F).unwrap() + 1;
        let mut on_chunk = |delta: &str| chunks.push(delta.to_string());
        assert!(acc.push_bytes(&line[..split], &mut on_chunk).is_none());
        assert!(acc.push_bytes(&line[split..], &mut on_chunk).is_none());

        assert_eq!(chunks, vec!["内容"]);
    }
}
