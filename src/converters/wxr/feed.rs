//! WXR feed parsing: pre-clean, structured parse, and a regex fallback for
//! exports that are not well-formed XML.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use roxmltree::{Document, Node, ParsingOptions};
use tracing::{debug, warn};

const WP_NS_PREFIX: &str = "http://wordpress.org/export/";
const CONTENT_NS: &str = "http://purl.org/rss/1.0/modules/content/";
const DC_NS: &str = "http://purl.org/dc/elements/1.1/";

static RE_CONTROL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());
static RE_AMPERSAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:(amp|lt|gt|quot|apos|#[0-9]+|#x[0-9a-fA-F]+);)?").unwrap()
});
static RE_CDATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

static RE_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<item>(.*?)</item>").unwrap());
static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title>(.*?)</title>").unwrap());
static RE_CONTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<content:encoded><!\[CDATA\[(.*?)\]\]></content:encoded>").unwrap()
});
static RE_POST_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<wp:post_date>(.*?)</wp:post_date>").unwrap());
static RE_CREATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<dc:creator><!\[CDATA\[(.*?)\]\]></dc:creator>").unwrap());

/// One exported post or page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub title: String,
    pub link: String,
    /// `None` when recovered by the fallback parser.
    pub post_type: Option<String>,
    pub status: Option<String>,
    pub date: String,
    pub content_html: String,
    pub excerpt_html: String,
    pub author: String,
    pub categories: Vec<String>,
    pub tags: Vec<String>,
}

/// How the posts were recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Structured,
    Fallback,
}

/// Parse every item with a non-blank body.
pub fn parse_posts(raw: &str) -> (Vec<Post>, ParseMode) {
    let cleaned = clean_xml(raw);
    match parse_structured(&cleaned) {
        Ok(posts) => (posts, ParseMode::Structured),
        Err(e) => {
            warn!("Export is not well-formed XML ({}); using fallback extraction", e);
            (parse_fallback(&cleaned), ParseMode::Fallback)
        }
    }
}

// ── Pre-clean ────────────────────────────────────────────────────────────

/// Strip control characters and escape bare `&` outside CDATA sections.
pub fn clean_xml(raw: &str) -> String {
    let stripped = RE_CONTROL.replace_all(raw, "");
    let mut out = String::with_capacity(stripped.len() + 64);
    let mut rest: &str = &stripped;
    while let Some(start) = rest.find("<![CDATA[") {
        out.push_str(&escape_ampersands(&rest[..start]));
        let section = &rest[start..];
        match section.find("]]>") {
            Some(end) => {
                out.push_str(&section[..end + 3]);
                rest = &section[end + 3..];
            }
            None => {
                out.push_str(section);
                rest = "";
            }
        }
    }
    out.push_str(&escape_ampersands(rest));
    out
}

fn escape_ampersands(s: &str) -> String {
    RE_AMPERSAND
        .replace_all(s, |caps: &Captures<'_>| {
            if caps.get(1).is_some() {
                caps[0].to_string()
            } else {
                "&amp;".to_string()
            }
        })
        .into_owned()
}

// ── Structured parse ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Ns {
    None,
    Wp,
    Excerpt,
    Content,
    Dc,
}

impl Ns {
    fn matches(self, uri: Option<&str>) -> bool {
        match (self, uri) {
            (Ns::None, None) => true,
            (Ns::Wp, Some(u)) => u.starts_with(WP_NS_PREFIX) && !u.ends_with("/excerpt/"),
            (Ns::Excerpt, Some(u)) => u.starts_with(WP_NS_PREFIX) && u.ends_with("/excerpt/"),
            (Ns::Content, Some(u)) => u == CONTENT_NS,
            (Ns::Dc, Some(u)) => u == DC_NS,
            _ => false,
        }
    }
}

fn parse_structured(xml: &str) -> Result<Vec<Post>, roxmltree::Error> {
    let opts = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, opts)?;
    let items: Vec<Node> = doc
        .descendants()
        .filter(|n| is_element(n, "item", Ns::None))
        .collect();
    debug!("Structured parse found {} items", items.len());

    Ok(items
        .iter()
        .map(extract_post)
        .filter(|p| !p.content_html.trim().is_empty())
        .collect())
}

fn extract_post(item: &Node) -> Post {
    let field = |local: &str, ns: Ns| {
        item.children()
            .find(|n| is_element(n, local, ns))
            .map(|n| node_text(&n))
    };

    let mut post = Post {
        title: field("title", Ns::None)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        link: field("link", Ns::None).unwrap_or_default(),
        post_type: Some(field("post_type", Ns::Wp).unwrap_or_else(|| "post".to_string())),
        status: Some(field("status", Ns::Wp).unwrap_or_else(|| "publish".to_string())),
        date: field("post_date", Ns::Wp).unwrap_or_default(),
        content_html: field("encoded", Ns::Content).unwrap_or_default(),
        excerpt_html: field("encoded", Ns::Excerpt).unwrap_or_default(),
        author: field("creator", Ns::Dc).unwrap_or_default(),
        ..Post::default()
    };

    for category in item.children().filter(|n| is_element(n, "category", Ns::None)) {
        let name = node_text(&category);
        match category.attribute("domain") {
            Some("category") => post.categories.push(name),
            Some("post_tag") => post.tags.push(name),
            _ => {}
        }
    }
    post
}

fn is_element(node: &Node, local: &str, ns: Ns) -> bool {
    node.is_element() && node.tag_name().name() == local && ns.matches(node.tag_name().namespace())
}

/// Concatenated text and CDATA of every descendant.
fn node_text(node: &Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}

// ── Fallback ─────────────────────────────────────────────────────────────

/// Regex extraction of title, body, date and author from each `<item>`.
fn parse_fallback(content: &str) -> Vec<Post> {
    RE_ITEM
        .captures_iter(content)
        .filter_map(|caps| {
            let item = caps.get(1)?.as_str();
            let capture = |re: &Regex| re.captures(item).map(|c| c[1].to_string());
            let post = Post {
                title: capture(&*RE_TITLE)
                    .map(|t| xml_text(&t))
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                content_html: capture(&*RE_CONTENT).unwrap_or_default(),
                date: capture(&*RE_POST_DATE).map(|d| unwrap_cdata(&d)).unwrap_or_default(),
                author: capture(&*RE_CREATOR).unwrap_or_default(),
                ..Post::default()
            };
            (!post.content_html.trim().is_empty()).then_some(post)
        })
        .collect()
}

/// Unwrap CDATA sections and decode the five predefined entities.
pub fn xml_text(raw: &str) -> String {
    decode_entities(&unwrap_cdata(raw))
}

fn unwrap_cdata(raw: &str) -> String {
    RE_CDATA.replace_all(raw, "$1").into_owned()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wxr(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:wp="http://wordpress.org/export/1.2/">
<channel><title>My Site</title><link>https://blog.example</link>{items}</channel></rss>"#
        )
    }

    #[test]
    fn structured_parse_extracts_fields() {
        let xml = wxr(r#"<item>
            <title>Hello &amp; welcome</title>
            <link>https://blog.example/hello</link>
            <dc:creator><![CDATA[ada]]></dc:creator>
            <content:encoded><![CDATA[<p>Body</p>]]></content:encoded>
            <excerpt:encoded><![CDATA[Short]]></excerpt:encoded>
            <wp:post_date><![CDATA[2024-01-02 03:04:05]]></wp:post_date>
            <wp:status><![CDATA[draft]]></wp:status>
            <wp:post_type><![CDATA[page]]></wp:post_type>
            <category domain="category" nicename="news"><![CDATA[News]]></category>
            <category domain="post_tag" nicename="rust"><![CDATA[Rust]]></category>
        </item>"#);
        let (posts, mode) = parse_posts(&xml);
        assert_eq!(mode, ParseMode::Structured);
        assert_eq!(posts.len(), 1);
        let p = &posts[0];
        assert_eq!(p.title, "Hello & welcome");
        assert_eq!(p.link, "https://blog.example/hello");
        assert_eq!(p.author, "ada");
        assert_eq!(p.content_html, "<p>Body</p>");
        assert_eq!(p.excerpt_html, "Short");
        assert_eq!(p.date, "2024-01-02 03:04:05");
        assert_eq!(p.status.as_deref(), Some("draft"));
        assert_eq!(p.post_type.as_deref(), Some("page"));
        assert_eq!(p.categories, vec!["News"]);
        assert_eq!(p.tags, vec!["Rust"]);
    }

    #[test]
    fn defaults_and_empty_bodies() {
        let xml = wxr(
            r#"<item><content:encoded><![CDATA[x]]></content:encoded></item>
               <item><title>Empty</title><content:encoded><![CDATA[]]></content:encoded></item>"#,
        );
        let (posts, _) = parse_posts(&xml);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Untitled");
        assert_eq!(posts[0].post_type.as_deref(), Some("post"));
        assert_eq!(posts[0].status.as_deref(), Some("publish"));
    }

    #[test]
    fn other_export_versions_match() {
        let xml = r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:wp="http://wordpress.org/export/1.1/"><channel>
            <item><title>Old</title><wp:post_type>post</wp:post_type><content:encoded>text</content:encoded></item>
        </channel></rss>"#;
        let (posts, mode) = parse_posts(xml);
        assert_eq!(mode, ParseMode::Structured);
        assert_eq!(posts[0].post_type.as_deref(), Some("post"));
    }

    #[test]
    fn bare_ampersands_are_repaired() {
        let xml = wxr(r#"<item><title>Fish & chips</title><content:encoded><![CDATA[a & b &nbsp;]]></content:encoded></item>"#);
        let (posts, mode) = parse_posts(&xml);
        assert_eq!(mode, ParseMode::Structured);
        assert_eq!(posts[0].title, "Fish & chips");
        assert_eq!(posts[0].content_html, "a & b &nbsp;");
    }

    #[test]
    fn clean_keeps_entities_and_cdata() {
        assert_eq!(
            clean_xml("a & b &amp; &#8217; &#x2019; &lt;\u{1}<![CDATA[x & y]]>&"),
            "a &amp; b &amp; &#8217; &#x2019; &lt;<![CDATA[x & y]]>&amp;"
        );
    }

    #[test]
    fn malformed_xml_uses_fallback() {
        let xml = r#"<rss><channel><item><title><![CDATA[Broken &amp; fixed]]></title>
            <content:encoded><![CDATA[<p>Still here</p>]]></content:encoded>
            <wp:post_date>2024-05-06</wp:post_date>
            <dc:creator><![CDATA[lin]]></dc:creator>
            </item><unclosed></channel></rss>"#;
        let (posts, mode) = parse_posts(xml);
        assert_eq!(mode, ParseMode::Fallback);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].title, "Broken & fixed");
        assert_eq!(posts[0].content_html, "<p>Still here</p>");
        assert_eq!(posts[0].date, "2024-05-06");
        assert_eq!(posts[0].author, "lin");
        assert!(posts[0].post_type.is_none());
        assert!(posts[0].categories.is_empty());
    }

    #[test]
    fn xml_text_decodes() {
        assert_eq!(xml_text("<![CDATA[A]]> &lt;b&gt; &amp;amp;"), "A <b> &amp;");
    }
}
