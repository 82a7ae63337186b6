//! Pattern filters evaluated against every received line.
//!
//! A filter is registered in a [`FilterRegistry`], sees each line the
//! receive loop dispatches, and reports hits through its own bounded
//! queue. Filters come in two flavours:
//!
//! - [`FilterMode::Simple`]: the match pattern is tested against each line.
//! - [`FilterMode::Block`]: lines passing a line filter accumulate in a
//!   [`BackTrace`]; when a line matches the end-of-block pattern, the match
//!   pattern is tested against the accumulated block and the block is reset.

mod backtrace;
pub mod patterns;
mod registry;
mod subscription;

pub use backtrace::{BLOCK_SEPARATOR, BackTrace, DEFAULT_BACKTRACE_CAPACITY};
pub use registry::FilterRegistry;
pub use subscription::Subscription;

use std::fmt;
use std::ops::Range;
use std::time::SystemTime;

use regex::Regex;

use crate::error::FilterError;
use patterns::{MATCH_ALL, compile_block_pattern, compile_line_pattern};

/// Opaque filter identifier. Never reused within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterHandle(u64);

impl FilterHandle {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FilterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a filter consumes lines.
#[derive(Debug, Clone)]
pub enum FilterMode {
    /// Test the match pattern against every line.
    Simple,

    /// Accumulate lines and match against the whole block.
    Block {
        /// A line matching this closes the block.
        end_of_block: Regex,

        /// Only lines matching this are added to the block.
        line_filter: Regex,
    },
}

/// Compiled description of what a filter looks for.
#[derive(Debug, Clone)]
pub struct FilterSpec {
    pattern: Regex,
    mode: FilterMode,
}

impl FilterSpec {
    /// Filter single lines against `pattern`.
    pub fn simple(pattern: &str) -> Result<Self, FilterError> {
        Ok(Self {
            pattern: compile_block_pattern(pattern)?,
            mode: FilterMode::Simple,
        })
    }

    /// Filter blocks of lines.
    ///
    /// Lines matching `line_filter` are collected until one matches
    /// `end_of_block`; `pattern` is then tested against the collected lines
    /// joined with `\r\n`.
    pub fn block(pattern: &str, end_of_block: &str, line_filter: &str) -> Result<Self, FilterError> {
        Ok(Self {
            pattern: compile_block_pattern(pattern)?,
            mode: FilterMode::Block {
                end_of_block: compile_block_pattern(end_of_block)?,
                line_filter: compile_line_pattern(line_filter)?,
            },
        })
    }

    /// Block filter that keeps every line.
    pub fn block_until(pattern: &str, end_of_block: &str) -> Result<Self, FilterError> {
        Self::block(pattern, end_of_block, MATCH_ALL)
    }

    /// Simple filter from an already compiled regex.
    pub fn from_regex(pattern: Regex) -> Self {
        Self {
            pattern,
            mode: FilterMode::Simple,
        }
    }

    /// Get the match pattern.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Get the mode.
    pub fn mode(&self) -> &FilterMode {
        &self.mode
    }

    /// Check if this is a block filter.
    pub fn is_block(&self) -> bool {
        matches!(self.mode, FilterMode::Block { .. })
    }
}

/// Owned result of a successful pattern match.
///
/// Keeps the text the pattern was tested against (the line, or the joined
/// block) together with the capture group offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceMatch {
    haystack: String,
    groups: Vec<Option<Range<usize>>>,
    names: Vec<(String, usize)>,
}

impl TraceMatch {
    /// Run `pattern` over `haystack` and capture the first match.
    pub fn capture(pattern: &Regex, haystack: &str) -> Option<Self> {
        let caps = pattern.captures(haystack)?;
        let groups = caps.iter().map(|m| m.map(|m| m.range())).collect();
        let names = pattern
            .capture_names()
            .enumerate()
            .filter_map(|(i, name)| name.map(|n| (n.to_string(), i)))
            .collect();

        Some(Self {
            haystack: haystack.to_string(),
            groups,
            names,
        })
    }

    /// The matched text (group 0).
    pub fn as_str(&self) -> &str {
        self.get(0).unwrap_or_default()
    }

    /// Byte range of the whole match within the haystack.
    pub fn range(&self) -> Range<usize> {
        self.groups
            .first()
            .cloned()
            .flatten()
            .unwrap_or_default()
    }

    /// Text of capture group `index`, if it participated.
    pub fn get(&self, index: usize) -> Option<&str> {
        let range = self.groups.get(index)?.clone()?;
        self.haystack.get(range)
    }

    /// Text of a named capture group, if it participated.
    pub fn name(&self, name: &str) -> Option<&str> {
        let (_, index) = self.names.iter().find(|(n, _)| n == name)?;
        self.get(*index)
    }

    /// Number of capture groups, including group 0.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Always false: a match has at least group 0.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The full text the pattern was tested against.
    pub fn haystack(&self) -> &str {
        &self.haystack
    }
}

impl fmt::Display for TraceMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resolution of a filter, as delivered through its queue.
#[derive(Debug, Clone)]
pub struct FilterEvent {
    /// When the receive loop resolved the filter.
    pub timestamp: SystemTime,

    /// The match, or `None` when a block closed without matching.
    pub matched: Option<TraceMatch>,
}

impl FilterEvent {
    pub(crate) fn new(matched: Option<TraceMatch>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            matched,
        }
    }
}
