//! Post-processing: deterministic cleanup of generated Markdown.
//!
//! The HTML walker emits paragraph breaks generously and never looks back at
//! what it already wrote. These passes normalise the result without touching
//! content. Every pass except invisible-character removal leaves fenced code
//! blocks alone.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so every later rule sees `\n` only.
//! Heading spacing runs before blank-line collapsing because it inserts
//! blank lines the collapse pass then deduplicates.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+\S").unwrap());

/// Apply all cleanup rules.
///
/// 1. Normalise line endings (CRLF, CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 3. Trim trailing whitespace per line
/// 4. Surround heading lines with blank lines
/// 5. Collapse runs of blank lines to one
/// 6. Trim the whole document
pub fn clean_markdown(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = normalise_heading_spacing(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

pub fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

pub fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    let mut in_fence = false;
    input
        .split('\n')
        .map(|line| {
            if is_fence(line) {
                in_fence = !in_fence;
                line.trim_end()
            } else if in_fence {
                line
            } else {
                line.trim_end()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Normalise heading spacing ────────────────────────────────────────

fn normalise_heading_spacing(input: &str) -> String {
    let lines: Vec<&str> = input.split('\n').collect();
    let mut result: Vec<&str> = Vec::with_capacity(lines.len() + 16);
    let mut in_fence = false;

    for (i, line) in lines.iter().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        let is_heading = !in_fence && RE_HEADING.is_match(line);
        if is_heading && result.last().is_some_and(|l| !l.trim().is_empty()) {
            result.push("");
        }
        result.push(line);
        if is_heading && lines.get(i + 1).is_some_and(|next| !next.trim().is_empty()) {
            result.push("");
        }
    }
    result.join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

fn collapse_blank_lines(input: &str) -> String {
    let mut result: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut previous_blank = false;

    for line in input.split('\n') {
        if is_fence(line) {
            in_fence = !in_fence;
        }
        let blank = line.trim().is_empty();
        if blank && previous_blank && !in_fence {
            continue;
        }
        previous_blank = blank && !in_fence;
        result.push(line);
    }
    result.join("\n")
}

/// Opening or closing code fence.
fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_trailing_whitespace_kept_in_fences() {
        let input = "```\ncode   \n```";
        assert_eq!(trim_trailing_whitespace(input), input);
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_collapse_skips_fences() {
        let input = "```\na\n\n\n\nb\n```";
        assert_eq!(collapse_blank_lines(input), input);
    }

    #[test]
    fn test_heading_spacing() {
        assert_eq!(
            normalise_heading_spacing("some text\n# Heading\nmore text"),
            "some text\n\n# Heading\n\nmore text"
        );
    }

    #[test]
    fn test_heading_spacing_ignores_fenced_comments() {
        let input = "```\n# not a heading\nx = 1\n```";
        assert_eq!(normalise_heading_spacing(input), input);
    }

    #[test]
    fn test_hash_without_space_is_not_a_heading() {
        assert_eq!(normalise_heading_spacing("a\n#tag\nb"), "a\n#tag\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_clean_markdown_full_pipeline() {
        let input = "\n\n# Title\r\nSome text   \n\n\n\n\n\n## Section\nbody\n\n";
        assert_eq!(
            clean_markdown(input),
            "# Title\n\nSome text\n\n## Section\n\nbody"
        );
    }
}
