//! Line framing for byte-stream transports.
//!
//! Raw transports hand over arbitrary chunks; the receive loop wants one
//! logical line at a time. `LineBuffer` accumulates chunks and cuts them
//! on `\n`, dropping a preceding `\r`.

use std::fmt;

use bytes::BytesMut;

/// Accumulates raw bytes and yields complete lines.
///
/// Framing always runs on the raw bytes. ANSI escape sequences, when
/// stripping is enabled, are removed from each complete line, so a
/// sequence split across socket reads is still removed and a malformed
/// one can only garble its own line.
pub struct LineBuffer {
    /// Bytes received but not yet returned as a line.
    buffer: BytesMut,

    /// Whether to strip ANSI escape codes from returned lines.
    strip_ansi: bool,
}

impl LineBuffer {
    /// Create a buffer that passes bytes through unchanged.
    pub fn new() -> Self {
        Self::with_ansi_stripping(false)
    }

    /// Create a buffer, optionally stripping ANSI escape codes.
    pub fn with_ansi_stripping(strip_ansi: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            strip_ansi,
        }
    }

    /// Append newly received data.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn next_line(&mut self) -> Option<String> {
        let pos = memchr::memchr(b'\n', &self.buffer)?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }

        if self.strip_ansi {
            let cleaned = strip_ansi_escapes::strip(&line);
            return Some(String::from_utf8_lossy(&cleaned).into_owned());
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Bytes of the incomplete trailing line, as received.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LineBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineBuffer")
            .field("buffered", &self.buffer.len())
            .field("strip_ansi", &self.strip_ansi)
            .finish()
    }
}
