//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks. Complete lines are decoded as they
//! appear and each dispatched event yields its `data:` lines joined by `\n`.
//! Comments and the `event`, `id` and `retry` fields are dropped.

/// Turns raw body chunks into event payload strings.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk. Returns every event completed by it, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(frame) = self.feed_line(&String::from_utf8_lossy(&line)) {
                frames.push(frame);
            }
        }
        frames
    }

    /// End of body: an unterminated trailing event is still delivered.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let mut frame = None;
        if !rest.is_empty() {
            let line = String::from_utf8_lossy(&rest);
            frame = self.feed_line(line.trim_end_matches('\r'));
        }
        frame.or_else(|| self.dispatch())
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        // Bare JSON lines (newline-delimited streams) count as one event each.
        if line.starts_with('{') && self.data.is_empty() {
            return Some(line.to_string());
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let frame = self.data.join("\n");
        self.data.clear();
        Some(frame)
    }
}
