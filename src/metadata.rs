//! The `---` delimited metadata block prefixed to converted documents.
//!
//! The block is a tiny YAML subset: `key: "text"`, `key: 42`, and
//! `key:` followed by `  - "item"` lines. Every text value is quoted and
//! escaped so the block can be read back losslessly with [`MetadataBlock::parse`].

use std::fmt;

/// A single metadata value.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MetaValue {
    Text(String),
    Number(i64),
    List(Vec<String>),
}

/// Ordered key/value metadata, rendered between two `---` lines.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetadataBlock {
    entries: Vec<(String, MetaValue)>,
}

impl MetadataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a quoted text entry.
    pub fn text(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_string(), MetaValue::Text(value.into())));
        self
    }

    /// Append a text entry only when `value` is present and non-blank.
    pub fn text_opt(self, key: &str, value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if !v.is_empty() => self.text(key, v),
            _ => self,
        }
    }

    /// Append a bare numeric entry.
    pub fn number(mut self, key: &str, value: i64) -> Self {
        self.entries.push((key.to_string(), MetaValue::Number(value)));
        self
    }

    /// Append a list entry.
    pub fn list(mut self, key: &str, items: Vec<String>) -> Self {
        self.entries.push((key.to_string(), MetaValue::List(items)));
        self
    }

    /// Append a list entry only when it has at least one item.
    pub fn list_nonempty(self, key: &str, items: &[String]) -> Self {
        if items.is_empty() {
            self
        } else {
            self.list(key, items.to_vec())
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn entries(&self) -> &[(String, MetaValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the block including both delimiters, without a trailing newline.
    pub fn render(&self) -> String {
        let mut out = String::from("---\n");
        for (key, value) in &self.entries {
            match value {
                MetaValue::Text(s) => {
                    out.push_str(&format!("{key}: \"{}\"\n", escape(s)));
                }
                MetaValue::Number(n) => {
                    out.push_str(&format!("{key}: {n}\n"));
                }
                MetaValue::List(items) if items.is_empty() => {
                    out.push_str(&format!("{key}: []\n"));
                }
                MetaValue::List(items) => {
                    out.push_str(&format!("{key}:\n"));
                    for item in items {
                        out.push_str(&format!("  - \"{}\"\n", escape(item)));
                    }
                }
            }
        }
        out.push_str("---");
        out
    }

    /// Read back a block produced by [`MetadataBlock::render`].
    ///
    /// Returns the block and the remainder of the document after the closing
    /// delimiter, or `None` when `input` does not start with a closed block.
    pub fn parse(input: &str) -> Option<(MetadataBlock, &str)> {
        let body = input.strip_prefix("---\n")?;
        let (block_end, rest_start) = if let Some(pos) = body.find("\n---\n") {
            (pos, pos + 5)
        } else if body.ends_with("\n---") {
            (body.len() - 4, body.len())
        } else if let Some(rest) = body.strip_prefix("---") {
            // Empty block.
            return Some((MetadataBlock::new(), rest.strip_prefix('\n').unwrap_or(rest)));
        } else {
            return None;
        };

        let mut block = MetadataBlock::new();
        let mut pending_list: Option<(String, Vec<String>)> = None;

        for line in body[..block_end].lines() {
            if let Some(item) = line.strip_prefix("  - ") {
                let (_, items) = pending_list.as_mut()?;
                items.push(unquote(item));
                continue;
            }
            if let Some((key, items)) = pending_list.take() {
                block = block.list(&key, items);
            }
            let (key, raw) = line.split_once(':')?;
            let raw = raw.trim();
            if raw.is_empty() {
                pending_list = Some((key.to_string(), Vec::new()));
            } else if raw == "[]" {
                block = block.list(key, Vec::new());
            } else if raw.starts_with('"') {
                block = block.text(key, unquote(raw));
            } else if let Ok(n) = raw.parse::<i64>() {
                block = block.number(key, n);
            } else {
                block = block.text(key, raw);
            }
        }
        if let Some((key, items)) = pending_list.take() {
            block = block.list(&key, items);
        }

        Some((block, &body[rest_start..]))
    }
}

impl fmt::Display for MetadataBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

fn unquote(raw: &str) -> String {
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
