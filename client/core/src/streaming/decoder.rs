//! Incremental event-stream decoder
//!
//! Turns arbitrarily split body chunks into complete event blocks. Two kinds
//! of state survive between calls:
//!
//! - the undecoded tail of a UTF-8 sequence split across chunks, and
//! - decoded text after the last `"\n\n"` delimiter.
//!
//! Feeding a body one byte at a time yields exactly the blocks that feeding it
//! in one piece does.

/// Separates events on the wire
pub const EVENT_DELIMITER: &str = "\n\n";

/// Prefix of a payload-bearing block
pub const DATA_PREFIX: &str = "data: ";

/// Stateful splitter of a byte stream into event blocks
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of an incomplete UTF-8 sequence at the end of the last chunk
    utf8_tail: Vec<u8>,
    /// Decoded text not yet terminated by a delimiter
    buffer: String,
    /// Prefix of `buffer` already searched for a delimiter
    scanned: usize,
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; returns every block completed by them, in order
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.decode(bytes);

        let mut blocks = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(found) = self.buffer[from..].find(EVENT_DELIMITER) {
            let end = from + found;
            blocks.push(self.buffer[start..end].to_string());
            start = end + EVENT_DELIMITER.len();
            from = start;
        }
        if start > 0 {
            self.buffer.drain(..start);
        }

        // A delimiter may straddle this chunk and the next
        let mut scanned = self.buffer.len().saturating_sub(EVENT_DELIMITER.len() - 1);
        while !self.buffer.is_char_boundary(scanned) {
            scanned -= 1;
        }
        self.scanned = scanned;

        blocks
    }

    /// Flush at end of stream
    ///
    /// An incomplete UTF-8 sequence becomes U+FFFD. Returns the trailing
    /// fragment if it holds anything besides whitespace.
    pub fn finish(&mut self) -> Option<String> {
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            self.buffer.push(char::REPLACEMENT_CHARACTER);
        }
        self.scanned = 0;
        let rest = std::mem::take(&mut self.buffer);
        (!rest.trim().is_empty()).then_some(rest)
    }

    /// Drop all buffered state
    pub fn reset(&mut self) {
        self.utf8_tail.clear();
        self.buffer.clear();
        self.scanned = 0;
    }

    /// Bytes held back waiting for more input
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.utf8_tail.len() + self.buffer.len()
    }

    fn decode(&mut self, bytes: &[u8]) {
        let mut pending = std::mem::take(&mut self.utf8_tail);
        pending.extend_from_slice(bytes);

        let mut rest = pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    return;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    self.buffer
                        .push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + len..];
                        }
                        None => {
                            // Sequence continues in the next chunk
                            self.utf8_tail = rest[valid..].to_vec();
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Payload of a block, if it is a `data: ` block
///
/// Leading and trailing whitespace of the block is ignored.
#[must_use]
pub fn data_payload(block: &str) -> Option<&str> {
    block.trim().strip_prefix(DATA_PREFIX)
}
