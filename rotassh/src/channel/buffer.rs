//! Expect buffer with forward-only consumption.
//!
//! Incoming shell output is appended at the back; every successful match
//! splits the consumed prefix off the front, so a later search can never see
//! text that an earlier match already used.

use bytes::{Bytes, BytesMut};

use super::patterns::{PromptMatcher, Span};

/// Buffer for accumulating shell output and searching it for prompts.
pub struct PatternBuffer {
    /// Unconsumed output.
    buffer: BytesMut,

    /// Escape-sequence filter, if ANSI stripping is enabled.
    ansi: Option<AnsiStripper>,
}

impl PatternBuffer {
    /// Create a new buffer.
    ///
    /// # Arguments
    ///
    /// * `strip_ansi` - Remove ANSI escape sequences (colors, cursor
    ///   movement) from incoming data before it is searched.
    pub fn new(strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            ansi: strip_ansi.then(AnsiStripper::new),
        }
    }

    /// Append newly received data.
    pub fn extend(&mut self, data: &[u8]) {
        match self.ansi.as_mut() {
            Some(stripper) => {
                let cleaned = stripper.strip(data);
                self.buffer.extend_from_slice(&cleaned);
            }
            None => self.buffer.extend_from_slice(data),
        }
    }

    /// Search the unconsumed data for a pattern.
    pub fn search<M: PromptMatcher + ?Sized>(&self, matcher: &M) -> Option<Span> {
        matcher.find_span(&self.buffer)
    }

    /// Split off and return the first `len` bytes.
    ///
    /// `len` is clamped to the buffer length.
    pub fn consume(&mut self, len: usize) -> Bytes {
        let len = len.min(self.buffer.len());
        self.buffer.split_to(len).freeze()
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    /// Get a reference to the unconsumed contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the unconsumed contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the unconsumed length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Removes terminal escape sequences, keeping printable text and line control.
///
/// The parser state survives between calls, so a sequence split across two
/// reads is still removed.
struct AnsiStripper {
    parser: vte::Parser,
}

impl AnsiStripper {
    fn new() -> Self {
        Self {
            parser: vte::Parser::new(),
        }
    }

    fn strip(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        let mut collector = Collector { out: &mut out };
        self.parser.advance(&mut collector, data);
        out
    }
}

struct Collector<'a> {
    out: &'a mut Vec<u8>,
}

impl vte::Perform for Collector<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }
}
