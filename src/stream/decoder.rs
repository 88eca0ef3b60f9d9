/// Incremental decoder from a raw upstream byte stream to parsed
/// [`StreamChunk`] frames.
///
/// The transport may split the stream at any byte offset, including inside a
/// multi-byte UTF-8 codepoint or in the middle of a line; the decoder carries
/// both kinds of partial state across chunks so the yielded frame sequence is
/// independent of chunking.
use memchr::memchr_iter;

use super::{StreamChunk, DONE_SENTINEL};

pub struct FrameDecoder {
    buffer: String,
    read_offset: usize,
    utf8_remainder: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
            utf8_remainder: Vec::new(),
        }
    }

    /// Feed one raw byte chunk and return any complete frames parsed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        self.feed_into(chunk, &mut out);
        out
    }

    /// Feed one raw byte chunk and append complete frames into a
    /// caller-provided buffer.
    pub fn feed_into(&mut self, chunk: &[u8], out: &mut Vec<StreamChunk>) {
        self.decode_utf8(chunk);
        self.drain_lines(out);
    }

    /// Append decoded text to the line buffer, stashing a trailing partial
    /// codepoint for the next chunk. Invalid (non-partial) byte sequences are
    /// skipped so a corrupt chunk cannot wedge the stream.
    fn decode_utf8(&mut self, chunk: &[u8]) {
        let owned;
        let mut bytes: &[u8] = if self.utf8_remainder.is_empty() {
            chunk
        } else {
            self.utf8_remainder.extend_from_slice(chunk);
            owned = std::mem::take(&mut self.utf8_remainder);
            &owned
        };

        loop {
            match std::str::from_utf8(bytes) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    // Safety: valid_up_to is guaranteed to be a valid UTF-8 boundary.
                    let text = unsafe { std::str::from_utf8_unchecked(&bytes[..valid_up_to]) };
                    self.buffer.push_str(text);
                    match err.error_len() {
                        Some(skip) => {
                            bytes = &bytes[valid_up_to + skip..];
                        }
                        None => {
                            self.utf8_remainder
                                .extend_from_slice(&bytes[valid_up_to..]);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self, out: &mut Vec<StreamChunk>) {
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let mut line = &self.buffer[processed_up_to..line_end];
            if let Some(stripped) = line.strip_suffix('\r') {
                line = stripped;
            }
            process_line(line, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle one complete line:
/// - lines without the `data:` prefix are discarded
/// - the `[DONE]` sentinel is discarded
/// - anything else is parsed as JSON; a malformed line is logged and skipped,
///   never aborting the stream
fn process_line(line: &str, out: &mut Vec<StreamChunk>) {
    let Some(payload) = line.strip_prefix("data:") else {
        return;
    };
    let payload = payload.strip_prefix(' ').unwrap_or(payload);
    let payload = payload.trim();
    if payload.is_empty() || payload == DONE_SENTINEL {
        return;
    }
    match serde_json::from_str::<StreamChunk>(payload) {
        Ok(frame) => out.push(frame),
        Err(err) => {
            tracing::warn!(error = %err, line = payload, "skipping malformed upstream frame");
        }
    }
}
