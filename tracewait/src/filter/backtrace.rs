//! Bounded back-trace of recent lines for block-mode filters.

use std::collections::VecDeque;

/// Default number of lines a block-mode filter remembers.
pub const DEFAULT_BACKTRACE_CAPACITY: usize = 500;

/// Separator used when a block is joined for matching.
pub const BLOCK_SEPARATOR: &str = "\r\n";

/// Fixed-capacity ring of raw lines.
///
/// Once full, each append silently evicts the oldest line.
#[derive(Debug, Clone)]
pub struct BackTrace {
    lines: VecDeque<String>,
    capacity: usize,
}

impl BackTrace {
    /// Create an empty back-trace holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append a line, evicting the oldest one when full.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Join the buffered lines with `\r\n`.
    pub fn joined(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                out.push_str(BLOCK_SEPARATOR);
            }
            out.push_str(line);
        }
        out
    }

    /// Iterate over buffered lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Drop all buffered lines.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Get the number of buffered lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Check if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of lines kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BackTrace {
    fn default() -> Self {
        Self::new(DEFAULT_BACKTRACE_CAPACITY)
    }
}
