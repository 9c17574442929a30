//! WordPress export (WXR) → Markdown.
//!
//! Conversion never fails on malformed XML: the feed is pre-cleaned, parsed
//! with `roxmltree`, and when that still fails the items are recovered with
//! regular expressions ([`feed::parse_posts`]). Each post body is HTML and goes
//! through [`html::html_to_markdown`].
//!
//! Images referenced by posts are downloaded through the [`ImageStore`] when
//! one is supplied. A URL-level cache local to one conversion makes sure no
//! URL is requested twice, whether the first attempt worked or not.

pub mod feed;
pub mod html;

use super::encoding::decode_lossy;
use super::{with_metadata, ConversionInput, ConvertOptions, Converter, FileType};
use crate::error::Doc2MdError;
use crate::images::{asset_path, decode_data_uri, ImageStore};
use crate::metadata::MetadataBlock;
use feed::{parse_posts, xml_text, Post};
use html::{html_to_markdown, ImageResolver};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

const IMAGE_PREFIX: &str = "wxr_img";
const POST_SEPARATOR: &str = "\n---\n";

static RE_SITE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<title>(.*?)</title>").unwrap());
static RE_SITE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<link>(.*?)</link>").unwrap());
static RE_POST_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<wp:post_type>(?:<!\[CDATA\[)?\s*([a-z_-]+)\s*(?:\]\]>)?</wp:post_type>").unwrap()
});

/// Syndication-export converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct WxrConverter;

impl Converter for WxrConverter {
    fn name(&self) -> &'static str {
        "wxr"
    }

    fn file_type(&self) -> FileType {
        FileType::Wxr
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["wxr", "xml"]
    }

    fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<String, Doc2MdError> {
        let filename = input.filename.as_str();
        let raw = decode_lossy(&input.bytes);
        let (posts, mode) = parse_posts(&raw);
        debug!("{}: {} posts ({:?} parse)", filename, posts.len(), mode);

        let mut images = StoreImages::new(opts.images);
        let sections: Vec<String> = posts
            .iter()
            .map(|post| render_post(post, opts.include_metadata, &mut images))
            .collect();

        let metadata = opts
            .include_metadata
            .then(|| site_metadata(&raw, filename).render());
        Ok(with_metadata(metadata, sections.join(&format!("\n{POST_SEPARATOR}\n"))))
    }
}

/// Channel-level metadata, scanned from the raw text.
fn site_metadata(raw: &str, filename: &str) -> MetadataBlock {
    let first = |re: &Regex| re.captures(raw).map(|c| xml_text(&c[1]));
    let (mut posts, mut pages) = (0i64, 0i64);
    for caps in RE_POST_TYPE.captures_iter(raw) {
        match &caps[1] {
            "post" => posts += 1,
            "page" => pages += 1,
            _ => {}
        }
    }

    MetadataBlock::new()
        .text("title", format!("WordPress Export - {filename}"))
        .text("source_format", FileType::Wxr.source_tag())
        .text(
            "export_date",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        )
        .text_opt("site_title", first(&*RE_SITE_TITLE).as_deref())
        .text_opt("site_url", first(&*RE_SITE_LINK).as_deref())
        .number("posts", posts)
        .number("pages", pages)
}

fn post_metadata(post: &Post) -> MetadataBlock {
    MetadataBlock::new()
        .text("title", post.title.as_str())
        .text_opt("date", Some(post.date.as_str()))
        .text_opt("author", Some(post.author.as_str()))
        .text_opt("type", post.post_type.as_deref())
        .text_opt("status", post.status.as_deref())
        .list_nonempty("categories", &post.categories)
        .list_nonempty("tags", &post.tags)
        .text_opt("original_url", Some(post.link.as_str()))
}

fn render_post(post: &Post, include_metadata: bool, images: &mut StoreImages<'_>) -> String {
    let mut lines = Vec::new();
    if include_metadata {
        lines.push(post_metadata(post).render());
        lines.push(String::new());
    }
    lines.push(format!("# {}", post.title.trim()));
    lines.push(String::new());

    if !post.excerpt_html.trim().is_empty() {
        let excerpt = html_to_markdown(&post.excerpt_html, images);
        if !excerpt.is_empty() {
            lines.push(format!("*{excerpt}*"));
            lines.push(String::new());
        }
    }
    lines.push(html_to_markdown(&post.content_html, images));
    lines.join("\n")
}

// ── Image resolution ─────────────────────────────────────────────────────

/// Per-conversion URL → filename cache in front of the shared store.
/// `None` entries remember URLs that could not be localised.
struct StoreImages<'a> {
    store: Option<&'a ImageStore>,
    cache: HashMap<String, Option<String>>,
}

impl<'a> StoreImages<'a> {
    fn new(store: Option<&'a ImageStore>) -> Self {
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    fn localise(store: &ImageStore, src: &str) -> Option<String> {
        let image = if let Some(rest) = src.strip_prefix("//") {
            store.fetch_remote(&format!("https://{rest}"))
        } else if src.starts_with("http://") || src.starts_with("https://") {
            store.fetch_remote(src)
        } else if src.starts_with("data:") {
            decode_data_uri(src)
        } else {
            return None;
        };
        match image {
            Some(image) => Some(store.optimize_and_save(&image.data, IMAGE_PREFIX)),
            None => {
                warn!("Could not download image {}", truncate_for_log(src));
                None
            }
        }
    }
}

impl ImageResolver for StoreImages<'_> {
    fn resolve(&mut self, src: &str) -> String {
        let Some(store) = self.store else {
            return src.to_string();
        };
        let saved = self
            .cache
            .entry(src.to_string())
            .or_insert_with(|| Self::localise(store, src));
        match saved {
            Some(filename) => asset_path(filename),
            None => src.to_string(),
        }
    }
}

fn truncate_for_log(s: &str) -> String {
    if s.chars().count() > 80 {
        format!("{}...", s.chars().take(77).collect::<String>())
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{FetchedImage, ImageSettings, RemoteFetcher};
    use crate::metadata::MetaValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves a fixed PNG for URLs containing "ok", fails otherwise.
    struct FakeFetcher {
        calls: AtomicUsize,
        png: Vec<u8>,
    }

    impl FakeFetcher {
        fn new() -> Arc<Self> {
            let img = image::RgbaImage::from_pixel(2, 2, image::Rgba([255, 0, 0, 255]));
            let mut png = Vec::new();
            image::DynamicImage::ImageRgba8(img)
                .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
                .unwrap();
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                png,
            })
        }
    }

    impl RemoteFetcher for FakeFetcher {
        fn fetch(&self, url: &str) -> Option<FetchedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            url.contains("ok").then(|| FetchedImage {
                data: self.png.clone(),
                extension: "png".into(),
            })
        }
    }

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:excerpt="http://wordpress.org/export/1.2/excerpt/" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:wp="http://wordpress.org/export/1.2/">
<channel>
  <title>Ada's Notes</title>
  <link>https://ada.example</link>
  <item>
    <title>First post</title>
    <link>https://ada.example/first</link>
    <dc:creator><![CDATA[ada]]></dc:creator>
    <content:encoded><![CDATA[<p>Hello <strong>world</strong></p><img src="https://cdn.example/ok.png" alt="Red">]]></content:encoded>
    <excerpt:encoded><![CDATA[A greeting]]></excerpt:encoded>
    <wp:post_date><![CDATA[2024-01-02 03:04:05]]></wp:post_date>
    <wp:status><![CDATA[publish]]></wp:status>
    <wp:post_type><![CDATA[post]]></wp:post_type>
    <category domain="category" nicename="intro"><![CDATA[Intro]]></category>
  </item>
  <item>
    <title>About</title>
    <content:encoded><![CDATA[<p>Same picture <img src="https://cdn.example/ok.png"> and a broken one <img src="https://cdn.example/missing.png"><img src="https://cdn.example/missing.png"></p>]]></content:encoded>
    <wp:post_type>page</wp:post_type>
  </item>
  <item>
    <title>Attachment</title>
    <content:encoded><![CDATA[]]></content:encoded>
    <wp:post_type>attachment</wp:post_type>
  </item>
</channel>
</rss>"#;

    fn convert(xml: &str, opts: ConvertOptions<'_>) -> String {
        WxrConverter
            .convert(&ConversionInput::from_bytes("blog.xml", xml), &opts)
            .unwrap()
    }

    #[test]
    fn posts_render_with_title_excerpt_and_body() {
        let out = convert(EXPORT, ConvertOptions::default());
        let sections: Vec<&str> = out.split("\n\n---\n\n").collect();
        assert_eq!(sections.len(), 2, "{out}");
        assert_eq!(
            sections[0],
            "# First post\n\n*A greeting*\n\nHello **world**\n\n![Red](https://cdn.example/ok.png)"
        );
        assert!(sections[1].starts_with("# About\n\nSame picture"));
        assert!(!out.contains("Attachment"));
    }

    #[test]
    fn images_are_fetched_once_per_url() {
        let fetcher = FakeFetcher::new();
        let store = ImageStore::new(ImageSettings::default(), fetcher.clone());
        let out = convert(EXPORT, ConvertOptions::new(false, Some(&store)));

        assert_eq!(store.len(), 1);
        let filename = store.records()[0].local_filename.clone();
        assert!(filename.starts_with("wxr_img_1_"));
        assert_eq!(out.matches(&format!("(assets/{filename})")).count(), 2);
        assert_eq!(out.matches("(https://cdn.example/missing.png)").count(), 2);
        // ok.png once, missing.png once.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn protocol_relative_and_data_uris() {
        let fetcher = FakeFetcher::new();
        let store = ImageStore::new(ImageSettings::default(), fetcher.clone());
        let data_uri = format!(
            "data:image/png;base64,{}",
            base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &fetcher.png)
        );
        let xml = format!(
            r#"<rss xmlns:content="http://purl.org/rss/1.0/modules/content/"><channel><item><title>T</title>
            <content:encoded><![CDATA[<img src="//cdn.example/ok.gif"><img src="{data_uri}"><img src="/relative.png">]]></content:encoded>
            </item></channel></rss>"#
        );
        let out = convert(&xml, ConvertOptions::new(false, Some(&store)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        // Same pixels from both sources deduplicate in the store.
        assert_eq!(store.len(), 1);
        assert_eq!(out.matches("](assets/wxr_img_1_").count(), 2);
        assert!(out.contains("![Image](/relative.png)"));
    }

    #[test]
    fn metadata_blocks() {
        let out = convert(EXPORT, ConvertOptions::new(true, None));
        let (site, rest) = MetadataBlock::parse(&out).unwrap();
        assert_eq!(
            site.get("title"),
            Some(&MetaValue::Text("WordPress Export - blog.xml".into()))
        );
        assert_eq!(site.get("source_format"), Some(&MetaValue::Text("WXR".into())));
        assert_eq!(site.get("site_title"), Some(&MetaValue::Text("Ada's Notes".into())));
        assert_eq!(site.get("site_url"), Some(&MetaValue::Text("https://ada.example".into())));
        assert_eq!(site.get("posts"), Some(&MetaValue::Number(1)));
        assert_eq!(site.get("pages"), Some(&MetaValue::Number(1)));
        assert!(site.get("export_date").is_some());

        let (post, body) = MetadataBlock::parse(rest.trim_start()).unwrap();
        assert_eq!(post.get("title"), Some(&MetaValue::Text("First post".into())));
        assert_eq!(post.get("author"), Some(&MetaValue::Text("ada".into())));
        assert_eq!(post.get("date"), Some(&MetaValue::Text("2024-01-02 03:04:05".into())));
        assert_eq!(post.get("type"), Some(&MetaValue::Text("post".into())));
        assert_eq!(post.get("categories"), Some(&MetaValue::List(vec!["Intro".into()])));
        assert!(post.get("tags").is_none());
        assert_eq!(
            post.get("original_url"),
            Some(&MetaValue::Text("https://ada.example/first".into()))
        );
        assert!(body.starts_with("\n# First post"));
    }

    #[test]
    fn malformed_export_still_converts() {
        let xml = r#"<rss><channel><item><title>Fish & Chips</title>
            <content:encoded><![CDATA[<p>Tasty</p>]]></content:encoded>
            </item><broken></channel></rss>"#;
        let out = convert(xml, ConvertOptions::default());
        assert_eq!(out, "# Fish & Chips\n\nTasty");
    }

    #[test]
    fn no_posts_yields_empty_body() {
        let out = convert("<rss><channel></channel></rss>", ConvertOptions::default());
        assert_eq!(out, "");
    }
}
