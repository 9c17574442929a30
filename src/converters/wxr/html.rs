//! HTML fragment → Markdown, as a pure walk over an `html5ever` DOM.
//!
//! Only the element set WordPress bodies actually use is mapped; any other
//! element contributes its children's text. Image sources go through an
//! [`ImageResolver`] so the caller decides whether they are localised.

use crate::pipeline::postprocess::clean_markdown;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// Maps an `<img src>` to the URL written into Markdown.
pub trait ImageResolver {
    fn resolve(&mut self, src: &str) -> String;
}

/// Leaves every image URL as written.
pub struct KeepOriginal;

impl ImageResolver for KeepOriginal {
    fn resolve(&mut self, src: &str) -> String {
        src.to_string()
    }
}

const BLOCK_CONTAINERS: &[&str] = &[
    "div", "section", "article", "figure", "figcaption", "header", "footer", "aside", "main",
    "nav", "table", "tr",
];
const SKIPPED: &[&str] = &["script", "style", "noscript", "template", "title"];

/// Convert an HTML fragment to cleaned-up Markdown.
pub fn html_to_markdown(html: &str, images: &mut dyn ImageResolver) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let dom = parse_document(RcDom::default(), Default::default()).one(html);
    let mut walker = Walker {
        images,
        list_depth: 0,
    };
    let mut out = String::new();
    walker.walk(&dom.document, &mut out);
    clean_markdown(&out)
}

struct Walker<'r> {
    images: &'r mut dyn ImageResolver,
    list_depth: usize,
}

impl Walker<'_> {
    fn walk(&mut self, node: &Handle, out: &mut String) {
        match &node.data {
            NodeData::Document => self.walk_children(node, out),
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => self.element(node, out),
            _ => {}
        }
    }

    fn walk_children(&mut self, node: &Handle, out: &mut String) {
        for child in node.children.borrow().iter() {
            self.walk(child, out);
        }
    }

    /// Children rendered into a fresh buffer.
    fn inline(&mut self, node: &Handle) -> String {
        let mut buf = String::new();
        self.walk_children(node, &mut buf);
        buf
    }

    fn element(&mut self, node: &Handle, out: &mut String) {
        let Some(tag) = tag_name(node) else {
            return;
        };
        match tag.as_str() {
            t if SKIPPED.contains(&t) => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(tag.as_bytes()[1] - b'0');
                let text = single_line(&self.inline(node));
                if !text.is_empty() {
                    block_break(out);
                    out.push_str(&format!("{} {}\n\n", "#".repeat(level), text));
                }
            }
            "p" => {
                let text = self.inline(node);
                let text = text.trim();
                if !text.is_empty() {
                    block_break(out);
                    out.push_str(text);
                    out.push_str("\n\n");
                }
            }
            "a" => {
                let text = self.inline(node);
                let text = text.trim();
                match attr(node, "href").filter(|h| !h.trim().is_empty()) {
                    Some(href) if !text.is_empty() => out.push_str(&format!("[{text}]({href})")),
                    _ => out.push_str(text),
                }
            }
            "img" => {
                if let Some(src) = attr(node, "src").filter(|s| !s.trim().is_empty()) {
                    let alt = attr(node, "alt").unwrap_or_else(|| "Image".to_string());
                    let url = self.images.resolve(src.trim());
                    out.push_str(&format!("![{alt}]({url})\n\n"));
                }
            }
            "ul" | "ol" => self.list(node, tag == "ol", out),
            "pre" => {
                block_break(out);
                out.push_str(&format!("```\n{}\n```\n\n", plain_text(node)));
            }
            "code" => out.push_str(&format!("`{}`", plain_text(node))),
            "strong" | "b" => wrap(out, &self.inline(node), "**"),
            "em" | "i" => wrap(out, &self.inline(node), "*"),
            "blockquote" => {
                let inner = self.inline(node);
                let inner = inner.trim();
                if !inner.is_empty() {
                    block_break(out);
                    for line in inner.lines() {
                        out.push_str("> ");
                        out.push_str(line);
                        out.push('\n');
                    }
                    out.push('\n');
                }
            }
            "br" => out.push('\n'),
            t if BLOCK_CONTAINERS.contains(&t) => {
                block_break(out);
                self.walk_children(node, out);
                out.push_str("\n\n");
            }
            _ => self.walk_children(node, out),
        }
    }

    /// `-` or `N.` items; nested lists indent two spaces per level.
    fn list(&mut self, node: &Handle, ordered: bool, out: &mut String) {
        if self.list_depth == 0 {
            block_break(out);
        } else if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        let indent = "  ".repeat(self.list_depth);
        let start = if ordered {
            attr(node, "start")
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(1)
        } else {
            1
        };

        let items: Vec<Handle> = node
            .children
            .borrow()
            .iter()
            .filter(|c| tag_name(c).as_deref() == Some("li"))
            .cloned()
            .collect();
        for (i, li) in items.iter().enumerate() {
            let mut text = String::new();
            let mut nested = String::new();
            self.list_depth += 1;
            for child in li.children.borrow().iter() {
                match tag_name(child).as_deref() {
                    Some("ul") => self.list(child, false, &mut nested),
                    Some("ol") => self.list(child, true, &mut nested),
                    _ => self.walk(child, &mut text),
                }
            }
            self.list_depth -= 1;

            let marker = if ordered {
                format!("{}. ", start + i)
            } else {
                "- ".to_string()
            };
            out.push_str(&indent);
            out.push_str(&marker);
            out.push_str(&single_line(&text));
            out.push('\n');
            out.push_str(&nested);
        }
        if self.list_depth == 0 {
            out.push('\n');
        }
    }
}

fn tag_name(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.to_string().to_ascii_lowercase()),
        _ => None,
    }
}

fn attr(node: &Handle, key: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|a| &*a.name.local == key)
            .map(|a| a.value.to_string()),
        _ => None,
    }
}

/// Raw text of a subtree, for `pre` and `code`.
fn plain_text(node: &Handle) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out
}

fn collect_text(node: &Handle, out: &mut String) {
    match &node.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        NodeData::Element { name, .. } if &*name.local == "br" => out.push('\n'),
        _ => {
            for child in node.children.borrow().iter() {
                collect_text(child, out);
            }
        }
    }
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Start a new block unless the buffer already ends one.
fn block_break(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push_str("\n\n");
    }
}

fn wrap(out: &mut String, inner: &str, marker: &str) {
    if inner.trim().is_empty() {
        out.push_str(inner);
    } else {
        out.push_str(marker);
        out.push_str(inner);
        out.push_str(marker);
    }
}
