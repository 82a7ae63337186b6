//! Pattern compilation for trace filters.
//!
//! Match and end-of-block patterns run in multi-line, dot-matches-newline
//! mode so they behave sensibly against a joined block. Line filters are
//! compiled plainly since they only ever see a single line.

use regex::{Regex, RegexBuilder};

/// Line filter used when a block filter should keep every line.
pub const MATCH_ALL: &str = ".*";

/// Compile a match or end-of-block pattern.
///
/// `^`/`$` anchor at line boundaries (`\r\n` counts as one) and `.`
/// crosses the joins of a block.
pub fn compile_block_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .crlf(true)
        .dot_matches_new_line(true)
        .build()
}

/// Compile a per-line filter pattern.
pub fn compile_line_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_pattern_spans_lines() {
        let pattern = compile_block_pattern(r"A.B").unwrap();
        assert!(pattern.is_match("A\nB"));

        let pattern = compile_block_pattern(r"^B$").unwrap();
        assert!(pattern.is_match("A\nB\nC"));
        assert!(pattern.is_match("A\r\nB\r\nC"));
    }

    #[test]
    fn test_line_pattern_is_plain() {
        let pattern = compile_line_pattern(r"A.B").unwrap();
        assert!(!pattern.is_match("A\nB"));
        assert!(pattern.is_match("AxB"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(compile_block_pattern(r"value=(\d+").is_err());
    }
}
