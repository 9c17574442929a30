//! Plain text → Markdown by line heuristics.
//!
//! Each line is inspected with one line of context on either side. The
//! checks run in a fixed order and the first match decides the output:
//!
//! 1. blank line → blank line
//! 2. followed by an `=`/`-` underline at least 70% as long → `#`/`##` heading
//! 3. a bare `=`/`-` run → dropped
//! 4. numbered or bullet list item → passed through
//! 5. short ALL-CAPS line without terminal punctuation → `##` title-cased
//! 6. indented by 4 spaces or a tab → fenced code block
//! 7. contains a URL → self-links
//! 8. contains an email address → `mailto:` links
//! 9. anything else → trimmed
//!
//! Indented all-caps lines therefore become headings, not code.

use super::encoding::{decode_first, decode_lossy, TEXT_ENCODINGS};
use super::{with_metadata, ConversionInput, ConvertOptions, Converter, FileType};
use crate::error::Doc2MdError;
use crate::metadata::MetadataBlock;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_EQ_UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^=+$").unwrap());
static RE_DASH_UNDERLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-+$").unwrap());
static RE_RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[=-]+$").unwrap());
static RE_NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\.\s+").unwrap());
static RE_BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*+]\s+").unwrap());
static RE_MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+").unwrap());
static RE_TERMINAL_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]$").unwrap());
static RE_URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(https?://[^\s]+)").unwrap());
static RE_EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Z|a-z]{2,}\b").unwrap()
});
static RE_EMAIL_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^(From|To|Subject|Date):").unwrap());
static RE_CODE_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(function|class|def|import|#include)").unwrap());

/// Plain-text converter. Never fails on encoding.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextConverter;

impl Converter for TextConverter {
    fn name(&self) -> &'static str {
        "text"
    }

    fn file_type(&self) -> FileType {
        FileType::Txt
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["txt", "text"]
    }

    fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<String, Doc2MdError> {
        let content = match decode_first(&input.bytes, TEXT_ENCODINGS) {
            Some((enc, text)) => {
                debug!("{}: decoded as {}", input.filename, enc.label());
                text
            }
            None => decode_lossy(&input.bytes),
        };

        let metadata = opts
            .include_metadata
            .then(|| text_metadata(&input.filename, &content).render());
        Ok(with_metadata(metadata, convert_text(&content)))
    }
}

fn text_metadata(filename: &str, content: &str) -> MetadataBlock {
    let block = MetadataBlock::new()
        .text("title", filename)
        .text("source_format", FileType::Txt.source_tag())
        .number("lines", content.split('\n').count() as i64)
        .number("words", content.split_whitespace().count() as i64)
        .number("characters", content.chars().count() as i64);
    block.text_opt("structure", detect_structure(content).map(|s| s.label()))
}

// ── Structure classification ─────────────────────────────────────────────

/// Best-effort classification of the whole text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextStructure {
    MarkdownLike,
    NumberedList,
    BulletList,
    EmailLike,
    CodeLike,
}

impl TextStructure {
    pub fn label(self) -> &'static str {
        match self {
            TextStructure::MarkdownLike => "markdown-like",
            TextStructure::NumberedList => "numbered-list",
            TextStructure::BulletList => "bullet-list",
            TextStructure::EmailLike => "email-like",
            TextStructure::CodeLike => "code-like",
        }
    }
}

/// First matching rule wins; `None` when nothing matches.
pub fn detect_structure(content: &str) -> Option<TextStructure> {
    let count = |re: &Regex| content.split('\n').filter(|l| re.is_match(l.trim())).count();

    if count(&RE_MD_HEADING) > 0 {
        Some(TextStructure::MarkdownLike)
    } else if count(&RE_NUMBERED) > 2 {
        Some(TextStructure::NumberedList)
    } else if count(&RE_BULLET) > 2 {
        Some(TextStructure::BulletList)
    } else if RE_EMAIL_HEADER.is_match(content) {
        Some(TextStructure::EmailLike)
    } else if RE_CODE_KEYWORD.is_match(content) {
        Some(TextStructure::CodeLike)
    } else {
        None
    }
}

// ── Line rewriting ───────────────────────────────────────────────────────

/// Apply the line heuristics to already-decoded text.
pub fn convert_text(content: &str) -> String {
    let normalised = content.replace("\r\n", "\n").replace('\r', "\n");
    let lines: Vec<&str> = normalised.split('\n').collect();
    lines
        .iter()
        .enumerate()
        .filter_map(|(i, _)| process_line(i, &lines))
        .collect::<Vec<_>>()
        .join("\n")
}

fn process_line(index: usize, lines: &[&str]) -> Option<String> {
    let line = lines[index];
    let stripped = line.trim();

    if stripped.is_empty() {
        return Some(String::new());
    }

    if let Some(next) = lines.get(index + 1).map(|l| l.trim()) {
        let long_enough =
            next.chars().count() as f64 >= stripped.chars().count() as f64 * 0.7;
        if RE_EQ_UNDERLINE.is_match(next) && long_enough {
            return Some(format!("# {stripped}"));
        }
        if RE_DASH_UNDERLINE.is_match(next) && long_enough {
            return Some(format!("## {stripped}"));
        }
    }

    if RE_RULE.is_match(stripped) {
        return None;
    }

    if RE_NUMBERED.is_match(stripped) || RE_BULLET.is_match(stripped) {
        return Some(stripped.to_string());
    }

    if is_upper(stripped)
        && stripped.chars().count() < 80
        && stripped.split_whitespace().count() <= 10
        && !RE_TERMINAL_PUNCT.is_match(stripped)
    {
        return Some(format!("## {}", title_case(stripped)));
    }

    if is_indented(line) {
        let prev_indented = index > 0 && is_indented(lines[index - 1]);
        let next_indented = lines.get(index + 1).is_some_and(|l| is_indented(l));
        return Some(match (prev_indented, next_indented) {
            (false, false) => format!("```\n{line}\n```"),
            (false, true) => format!("```\n{line}"),
            (true, false) => format!("{line}\n```"),
            (true, true) => line.to_string(),
        });
    }

    if RE_URL.is_match(stripped) {
        return Some(RE_URL.replace_all(stripped, "[$1]($1)").into_owned());
    }

    if RE_EMAIL.is_match(stripped) {
        return Some(RE_EMAIL.replace_all(stripped, "[$0](mailto:$0)").into_owned());
    }

    Some(stripped.to_string())
}

fn is_indented(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

/// At least one cased character and no lowercase ones.
fn is_upper(s: &str) -> bool {
    s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}

/// Upper-case the first cased character of each run, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        let cased = c.is_uppercase() || c.is_lowercase();
        if cased {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}
