//! Newline framing for the executable's output stream
//!
//! Output arrives in arbitrary chunks; a JSON record may be split across
//! reads or several records may share one read. The framer buffers the
//! unterminated tail until its newline arrives. A tail that grows past the
//! line limit is dropped up to its newline and reported as oversized.

/// Longest line buffered. Final statuses listing many failed transfers are the largest records.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// One framed unit of the output stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A line longer than the limit; its bytes were discarded
    Oversized { length: usize, limit: usize },
}

/// Splits a byte stream into complete, non-blank lines
#[derive(Debug)]
pub struct LineFramer {
    buffer: Vec<u8>,
    max_line: usize,
    /// Bytes dropped so far from the current oversized line
    discarding: Option<usize>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self {
            buffer: Vec::new(),
            max_line: MAX_LINE_BYTES,
            discarding: None,
        }
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(mut self, max_line: usize) -> Self {
        self.max_line = max_line;
        self
    }

    /// Feed a chunk and return every frame it completed, in stream order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let head = &rest[..pos];
            if let Some(dropped) = self.discarding.take() {
                frames.push(self.oversized(dropped + head.len()));
            } else if self.buffer.len() + head.len() > self.max_line {
                frames.push(self.oversized(self.buffer.len() + head.len()));
                self.buffer.clear();
            } else {
                self.buffer.extend_from_slice(head);
                if let Some(line) = decode(&self.buffer) {
                    frames.push(Frame::Line(line));
                }
                self.buffer.clear();
            }
            rest = &rest[pos + 1..];
        }

        if let Some(dropped) = self.discarding.as_mut() {
            *dropped += rest.len();
        } else if self.buffer.len() + rest.len() > self.max_line {
            self.discarding = Some(self.buffer.len() + rest.len());
            self.buffer = Vec::new();
        } else {
            self.buffer.extend_from_slice(rest);
        }

        frames
    }

    /// Flush the unterminated remainder at end of stream
    pub fn finish(&mut self) -> Option<Frame> {
        if let Some(dropped) = self.discarding.take() {
            return Some(self.oversized(dropped));
        }
        let rest = std::mem::take(&mut self.buffer);
        decode(&rest).map(Frame::Line)
    }

    /// Bytes buffered but not yet terminated
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn oversized(&self, length: usize) -> Frame {
        Frame::Oversized {
            length,
            limit: self.max_line,
        }
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = String::from_utf8_lossy(raw);
    if line.trim().is_empty() {
        None
    } else {
        Some(line.into_owned())
    }
}
