//! Word-processing packages (`.docx`) → Markdown.
//!
//! The package is opened with `zip` and each XML part parsed with
//! `roxmltree`. Body paragraphs and tables are rendered in document order.
//!
//! When an [`ImageStore`] is supplied, every image relationship of the main
//! document part is extracted, optimised and saved once before the body is
//! walked, so inline drawings resolve by relationship ID with a plain lookup.

use super::{with_metadata, ConversionInput, ConvertOptions, Converter, FileType};
use crate::error::{Doc2MdError, FormatError};
use crate::images::{asset_path, ImageStore};
use crate::metadata::MetadataBlock;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document as XmlDoc, Node};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::read::ZipArchive;
use zip::result::ZipError;

const DOCUMENT_PART: &str = "word/document.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";
const STYLES_PART: &str = "word/styles.xml";
const CORE_PART: &str = "docProps/core.xml";
const IMAGE_PREFIX: &str = "docx_img";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

static RE_HEADING_LEVEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"heading\s*([1-6])").unwrap());

/// Styled-document converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocxConverter;

impl Converter for DocxConverter {
    fn name(&self) -> &'static str {
        "docx"
    }

    fn file_type(&self) -> FileType {
        FileType::Docx
    }

    fn file_extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<String, Doc2MdError> {
        let filename = input.filename.as_str();
        let mut zip = ZipArchive::new(Cursor::new(input.bytes.as_slice()))
            .map_err(|e| Doc2MdError::format(filename, "open package", e.into()))?;

        let document_xml = read_part(&mut zip, DOCUMENT_PART)
            .map_err(|e| Doc2MdError::format(filename, "read document", e))?;
        let xml = XmlDoc::parse(strip_bom(&document_xml)).map_err(|source| {
            Doc2MdError::format(
                filename,
                "parse document",
                FormatError::MalformedXml {
                    part: DOCUMENT_PART.to_string(),
                    source,
                },
            )
        })?;

        let rels = read_relationships(&mut zip, DOCUMENT_RELS);
        let styles = read_styles(&mut zip);
        let images = match opts.images {
            Some(store) => extract_images(&mut zip, &rels, store),
            None => HashMap::new(),
        };

        let metadata = opts
            .include_metadata
            .then(|| read_core_properties(&mut zip).metadata(filename).render());

        let ctx = RenderContext {
            rels: &rels,
            styles: &styles,
            images: &images,
        };
        let mut lines = Vec::new();
        if let Some(body) = xml.descendants().find(|n| is_tag(n, "body")) {
            ctx.render_blocks(&body, &mut lines);
        }
        debug!(
            "{}: {} lines, {} images extracted",
            filename,
            lines.len(),
            images.len()
        );

        Ok(with_metadata(metadata, lines.join("\n")))
    }
}

// ── Package parts ────────────────────────────────────────────────────────

fn read_part<R: Read + Seek>(zip: &mut ZipArchive<R>, part: &str) -> Result<String, FormatError> {
    let bytes = read_part_bytes(zip, part)?;
    String::from_utf8(bytes).map_err(|e| FormatError::PartRead {
        part: part.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })
}

fn read_part_bytes<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    part: &str,
) -> Result<Vec<u8>, FormatError> {
    let mut file = zip.by_name(part).map_err(|e| match e {
        ZipError::FileNotFound => FormatError::MissingPart(part.to_string()),
        other => FormatError::InvalidPackage(other),
    })?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|source| FormatError::PartRead {
            part: part.to_string(),
            source,
        })?;
    Ok(bytes)
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{FEFF}').unwrap_or(s)
}

#[derive(Debug, Clone)]
struct Relationship {
    id: String,
    kind: String,
    target: String,
    external: bool,
}

impl Relationship {
    fn is_image(&self) -> bool {
        self.kind.ends_with("/image") || self.target.contains("image")
    }
}

#[derive(Debug, Default)]
struct Relationships(Vec<Relationship>);

impl Relationships {
    fn get(&self, id: &str) -> Option<&Relationship> {
        self.0.iter().find(|r| r.id == id)
    }

    fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.0.iter()
    }
}

fn read_relationships<R: Read + Seek>(zip: &mut ZipArchive<R>, part: &str) -> Relationships {
    let Ok(text) = read_part(zip, part) else {
        return Relationships::default();
    };
    let Ok(xml) = XmlDoc::parse(strip_bom(&text)) else {
        warn!("Ignoring malformed relationships part {}", part);
        return Relationships::default();
    };
    let rels = xml
        .descendants()
        .filter(|n| is_tag(n, "Relationship"))
        .filter_map(|rel| {
            Some(Relationship {
                id: get_attr_local(&rel, "Id")?.to_string(),
                kind: get_attr_local(&rel, "Type").unwrap_or_default().to_string(),
                target: get_attr_local(&rel, "Target")?.to_string(),
                external: get_attr_local(&rel, "TargetMode") == Some("External"),
            })
        })
        .collect();
    Relationships(rels)
}

/// Resolve a relationship target of the main part to a package path.
fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments = vec!["word"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// Save every internal image relationship; returns relationship ID → filename.
fn extract_images<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    rels: &Relationships,
    store: &ImageStore,
) -> HashMap<String, String> {
    let mut extracted = HashMap::new();
    for rel in rels.iter().filter(|r| r.is_image() && !r.external) {
        let part = resolve_target(&rel.target);
        match read_part_bytes(zip, &part) {
            Ok(bytes) => {
                let filename = store.optimize_and_save(&bytes, IMAGE_PREFIX);
                extracted.insert(rel.id.clone(), filename);
            }
            Err(e) => warn!("Could not extract image {}: {}", part, e),
        }
    }
    extracted
}

#[derive(Debug)]
struct Styles {
    names: HashMap<String, String>,
    default_name: String,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            names: HashMap::new(),
            default_name: "Normal".to_string(),
        }
    }
}

impl Styles {
    /// Style name of a paragraph; unknown IDs fall back to the ID itself.
    fn paragraph_style(&self, p: &Node) -> String {
        let id = child(p, "pPr")
            .and_then(|ppr| child(&ppr, "pStyle"))
            .and_then(|n| get_attr_local(&n, "val"));
        match id {
            Some(id) => self
                .names
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.to_string()),
            None => self.default_name.clone(),
        }
    }
}

fn read_styles<R: Read + Seek>(zip: &mut ZipArchive<R>) -> Styles {
    let Ok(text) = read_part(zip, STYLES_PART) else {
        return Styles::default();
    };
    let Ok(xml) = XmlDoc::parse(strip_bom(&text)) else {
        warn!("Ignoring malformed {}", STYLES_PART);
        return Styles::default();
    };
    let mut styles = Styles::default();
    for style in xml.descendants().filter(|n| is_tag(n, "style")) {
        if get_attr_local(&style, "type") != Some("paragraph") {
            continue;
        }
        let (Some(id), Some(name)) = (
            get_attr_local(&style, "styleId"),
            child(&style, "name").and_then(|n| get_attr_local(&n, "val")),
        ) else {
            continue;
        };
        if matches!(get_attr_local(&style, "default"), Some("1") | Some("true")) {
            styles.default_name = name.to_string();
        }
        styles.names.insert(id.to_string(), name.to_string());
    }
    styles
}

#[derive(Debug, Default)]
struct CoreProperties {
    author: Option<String>,
    created: Option<String>,
    modified: Option<String>,
    subject: Option<String>,
}

impl CoreProperties {
    fn metadata(&self, filename: &str) -> MetadataBlock {
        MetadataBlock::new()
            .text("title", filename)
            .text("source_format", FileType::Docx.source_tag())
            .text_opt("author", self.author.as_deref())
            .text_opt("created", self.created.as_deref())
            .text_opt("modified", self.modified.as_deref())
            .text_opt("subject", self.subject.as_deref())
    }
}

fn read_core_properties<R: Read + Seek>(zip: &mut ZipArchive<R>) -> CoreProperties {
    let Ok(text) = read_part(zip, CORE_PART) else {
        return CoreProperties::default();
    };
    let Ok(xml) = XmlDoc::parse(strip_bom(&text)) else {
        warn!("Ignoring malformed {}", CORE_PART);
        return CoreProperties::default();
    };
    let field = |local: &str| {
        xml.descendants()
            .find(|n| is_tag(n, local))
            .and_then(|n| n.text())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    CoreProperties {
        author: field("creator"),
        created: field("created").and_then(|s| format_timestamp(&s)),
        modified: field("modified").and_then(|s| format_timestamp(&s)),
        subject: field("subject"),
    }
}

/// W3CDTF timestamp → `YYYY-MM-DDTHH:MM:SS` in UTC.
fn format_timestamp(raw: &str) -> Option<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc().format(TIMESTAMP_FORMAT).to_string());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
        return Some(naive.format(TIMESTAMP_FORMAT).to_string());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.format(TIMESTAMP_FORMAT).to_string())
}

// ── Body rendering ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Alignment {
    Left,
    Center,
    Right,
}

struct RenderContext<'a> {
    rels: &'a Relationships,
    styles: &'a Styles,
    images: &'a HashMap<String, String>,
}

impl RenderContext<'_> {
    fn render_blocks(&self, parent: &Node, lines: &mut Vec<String>) {
        for block in parent.children().filter(Node::is_element) {
            match block.tag_name().name() {
                "p" => self.render_paragraph(&block, lines),
                "tbl" => self.render_table(&block, lines),
                // Content controls wrap ordinary blocks.
                "sdt" | "sdtContent" => self.render_blocks(&block, lines),
                _ => {}
            }
        }
    }

    fn render_paragraph(&self, p: &Node, lines: &mut Vec<String>) {
        let plain = paragraph_text(p);
        if plain.trim().is_empty() {
            lines.push(String::new());
        } else {
            let style = self.styles.paragraph_style(p).to_lowercase();
            if style.contains("heading") {
                lines.push(format!(
                    "{} {}",
                    "#".repeat(heading_level(&style)),
                    plain.trim()
                ));
            } else {
                let formatted = self.render_inlines(p);
                let text = if formatted.trim().is_empty() {
                    plain.trim().to_string()
                } else {
                    formatted
                };
                lines.push(match alignment(p) {
                    Alignment::Center => format!("<center>{text}</center>"),
                    Alignment::Right => format!("<div align='right'>{text}</div>"),
                    Alignment::Left => text,
                });
            }
        }

        for id in image_refs(p) {
            if let Some(filename) = self.images.get(id) {
                lines.push(format!("\n![Image]({})\n", asset_path(filename)));
            }
        }
    }

    fn render_inlines(&self, parent: &Node) -> String {
        let mut out = String::new();
        for node in parent.children().filter(Node::is_element) {
            match node.tag_name().name() {
                "r" => out.push_str(&render_run(&node)),
                "hyperlink" => out.push_str(&self.render_hyperlink(&node)),
                "ins" | "smartTag" | "fldSimple" => out.push_str(&self.render_inlines(&node)),
                _ => {}
            }
        }
        out
    }

    fn render_hyperlink(&self, link: &Node) -> String {
        let inner = self.render_inlines(link);
        let href = get_attr_local(link, "id")
            .and_then(|id| self.rels.get(id))
            .filter(|r| r.external)
            .map(|r| r.target.as_str());
        match href {
            Some(href) if !inner.trim().is_empty() => format!("[{inner}]({href})"),
            _ => inner,
        }
    }

    fn render_table(&self, tbl: &Node, lines: &mut Vec<String>) {
        let rows = table_grid(tbl);
        let Some((header, body)) = rows.split_first() else {
            return;
        };
        if header.iter().all(String::is_empty) {
            debug!("Skipping table with an empty header row");
            return;
        }

        if lines.last().is_some_and(|l| !l.is_empty()) {
            lines.push(String::new());
        }
        lines.push(table_row(header));
        lines.push(table_row(&vec!["---".to_string(); header.len()]));
        for row in body.iter().filter(|r| r.iter().any(|c| !c.is_empty())) {
            lines.push(table_row(row));
        }
        lines.push(String::new());
    }
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Table text laid out on the column grid.
///
/// A cell spanning `w:gridSpan` columns repeats its text in each of them and
/// a `w:vMerge` continuation repeats the text of the cell above, so every row
/// has the same width.
fn table_grid(tbl: &Node) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    for tr in children(tbl, "tr") {
        let mut row: Vec<String> = Vec::new();
        for tc in children(&tr, "tc") {
            let props = child(&tc, "tcPr");
            let span = props
                .and_then(|pr| child(&pr, "gridSpan"))
                .and_then(|g| get_attr_local(&g, "val"))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(1)
                .max(1);
            let continued = props
                .and_then(|pr| child(&pr, "vMerge"))
                .is_some_and(|m| get_attr_local(&m, "val") != Some("restart"));
            let text = if continued {
                rows.last()
                    .and_then(|above| above.get(row.len()))
                    .cloned()
                    .unwrap_or_default()
            } else {
                cell_text(&tc)
            };
            row.extend(std::iter::repeat(text).take(span));
        }
        rows.push(row);
    }

    let declared = child(tbl, "tblGrid").map_or(0, |g| children(&g, "gridCol").count());
    let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(declared);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    rows
}

/// Cell paragraphs joined by a space, pipes escaped.
fn cell_text(tc: &Node) -> String {
    let text = children(tc, "p")
        .map(|p| paragraph_text(&p).trim().to_string())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    text.replace(['\n', '\t'], " ").replace('|', "\\|")
}

fn render_run(run: &Node) -> String {
    let text = run_text(run);
    if text.trim().is_empty() {
        return text;
    }
    let props = child(run, "rPr");
    let toggle = |name: &str| {
        props
            .as_ref()
            .and_then(|rpr| child(rpr, name))
            .and_then(|n| read_on_off(&n))
            .unwrap_or(false)
    };
    let bold = toggle("b");
    let italic = toggle("i");
    let underline = props
        .as_ref()
        .and_then(|rpr| child(rpr, "u"))
        .is_some_and(|u| !matches!(get_attr_local(&u, "val"), Some("none") | Some("0") | Some("false")));

    let mut out = match (bold, italic) {
        (true, true) => format!("***{text}***"),
        (true, false) => format!("**{text}**"),
        (false, true) => format!("*{text}*"),
        (false, false) => text,
    };
    if underline {
        out = format!("<u>{out}</u>");
    }
    out
}

/// Text of a run: `w:t`, tabs and breaks.
fn run_text(run: &Node) -> String {
    let mut out = String::new();
    for c in run.children().filter(Node::is_element) {
        match c.tag_name().name() {
            "t" => out.push_str(c.text().unwrap_or_default()),
            "tab" => out.push('\t'),
            "br" | "cr" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// Unformatted paragraph text, hyperlink runs included.
fn paragraph_text(parent: &Node) -> String {
    let mut out = String::new();
    for node in parent.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "r" => out.push_str(&run_text(&node)),
            "hyperlink" | "ins" | "smartTag" | "fldSimple" => out.push_str(&paragraph_text(&node)),
            _ => {}
        }
    }
    out
}

fn heading_level(style_lower: &str) -> usize {
    RE_HEADING_LEVEL
        .captures(style_lower)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(1)
}

fn alignment(p: &Node) -> Alignment {
    let jc = child(p, "pPr")
        .and_then(|ppr| child(&ppr, "jc"))
        .and_then(|n| get_attr_local(&n, "val"));
    match jc {
        Some("center") => Alignment::Center,
        Some("right") | Some("end") => Alignment::Right,
        _ => Alignment::Left,
    }
}

/// Relationship IDs of DrawingML and VML images inside a paragraph.
fn image_refs<'a>(p: &Node<'a, 'a>) -> Vec<&'a str> {
    p.descendants()
        .filter(|n| !in_superseded_fallback(n))
        .filter_map(|n| {
            if is_tag(&n, "blip") {
                get_attr_local(&n, "embed")
            } else if is_tag(&n, "imagedata") {
                get_attr_local(&n, "id")
            } else {
                None
            }
        })
        .collect()
}

/// Inside an `mc:Fallback` whose `mc:AlternateContent` also has an
/// `mc:Choice`; the choice carries the same picture.
fn in_superseded_fallback(node: &Node) -> bool {
    node.ancestors()
        .filter(|a| is_tag(a, "Fallback"))
        .any(|fallback| {
            fallback
                .parent()
                .is_some_and(|alt| is_tag(&alt, "AlternateContent") && child(&alt, "Choice").is_some())
        })
}

// ── XML helpers ──────────────────────────────────────────────────────────

fn is_tag(node: &Node, local: &str) -> bool {
    node.is_element() && node.tag_name().name() == local
}

fn get_attr_local<'a>(node: &Node<'a, 'a>, local: &str) -> Option<&'a str> {
    node.attributes()
        .find(|a| a.name() == local)
        .map(|a| a.value())
}

fn child<'a>(node: &Node<'a, 'a>, local: &str) -> Option<Node<'a, 'a>> {
    node.children().find(|n| is_tag(n, local))
}

fn children<'a, 'b>(
    node: &Node<'a, 'a>,
    local: &'b str,
) -> impl Iterator<Item = Node<'a, 'a>> + use<'a, 'b> {
    node.children().filter(move |n| is_tag(n, local))
}

/// `w:b`-style toggle: present with no value, or any value but false/0/off.
fn read_on_off(node: &Node) -> Option<bool> {
    match get_attr_local(node, "val").map(str::to_ascii_lowercase).as_deref() {
        None => Some(true),
        Some("0") | Some("false") | Some("off") => Some(false),
        Some(_) => Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::{FetchedImage, ImageSettings, RemoteFetcher};
    use crate::metadata::MetaValue;
    use std::io::Write;
    use std::sync::Arc;
    use zip::write::SimpleFileOptions;

    struct NoNetwork;

    impl RemoteFetcher for NoNetwork {
        fn fetch(&self, _url: &str) -> Option<FetchedImage> {
            None
        }
    }

    fn document(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:v="urn:schemas-microsoft-com:vml"><w:body>{body}</w:body></w:document>"#
        )
    }

    fn package(parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn convert(bytes: Vec<u8>, opts: ConvertOptions<'_>) -> Result<String, Doc2MdError> {
        DocxConverter.convert(&ConversionInput::from_bytes("report.docx", bytes), &opts)
    }

    fn convert_body(body: &str) -> String {
        let doc = document(body);
        convert(package(&[(DOCUMENT_PART, doc.as_bytes())]), ConvertOptions::default()).unwrap()
    }

    fn png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn headings_from_style_ids() {
        let out = convert_body(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t> Intro </w:t></w:r></w:p>
               <w:p><w:pPr><w:pStyle w:val="Heading"/></w:pPr><w:r><w:t>Plain</w:t></w:r></w:p>"#,
        );
        assert_eq!(out, "## Intro\n# Plain");
    }

    #[test]
    fn heading_level_from_style_name() {
        let styles = br#"<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/></w:style>
            <w:style w:type="paragraph" w:styleId="Titre3"><w:name w:val="heading 3"/></w:style>
        </w:styles>"#;
        let doc = document(
            r#"<w:p><w:pPr><w:pStyle w:val="Titre3"/></w:pPr><w:r><w:t>Deep</w:t></w:r></w:p>"#,
        );
        let out = convert(
            package(&[(DOCUMENT_PART, doc.as_bytes()), (STYLES_PART, styles)]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out, "### Deep");
    }

    #[test]
    fn run_formatting() {
        let out = convert_body(
            r#"<w:p>
                <w:r><w:rPr><w:b/><w:i/></w:rPr><w:t>both</w:t></w:r>
                <w:r><w:t xml:space="preserve"> </w:t></w:r>
                <w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r>
                <w:r><w:rPr><w:b w:val="false"/></w:rPr><w:t xml:space="preserve"> plain </w:t></w:r>
                <w:r><w:rPr><w:i/><w:u w:val="single"/></w:rPr><w:t>under</w:t></w:r>
                <w:r><w:rPr><w:u w:val="none"/></w:rPr><w:t>!</w:t></w:r>
            </w:p>"#,
        );
        assert_eq!(out, "***both*** **bold** plain <u>*under*</u>!");
    }

    #[test]
    fn blank_paragraphs_keep_spacing() {
        let out = convert_body(
            r#"<w:p><w:r><w:t>a</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>b</w:t></w:r></w:p>"#,
        );
        assert_eq!(out, "a\n\nb");
    }

    #[test]
    fn alignment_wrappers() {
        let out = convert_body(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:t>mid</w:t></w:r></w:p>
               <w:p><w:pPr><w:jc w:val="right"/></w:pPr><w:r><w:t>end</w:t></w:r></w:p>"#,
        );
        assert_eq!(out, "<center>mid</center>\n<div align='right'>end</div>");
    }

    #[test]
    fn tabs_and_breaks() {
        let out = convert_body(r#"<w:p><w:r><w:t>a</w:t><w:tab/><w:t>b</w:t><w:br/><w:t>c</w:t></w:r></w:p>"#);
        assert_eq!(out, "a\tb\nc");
    }

    #[test]
    fn merged_cells_fill_the_grid() {
        let cell = |t: &str| format!("<w:tc><w:p><w:r><w:t>{t}</w:t></w:r></w:p></w:tc>");
        let body = format!(
            "<w:tbl><w:tblGrid><w:gridCol/><w:gridCol/><w:gridCol/></w:tblGrid>\
             <w:tr>{}{}{}</w:tr>\
             <w:tr><w:tc><w:tcPr><w:gridSpan w:val=\"2\"/></w:tcPr><w:p><w:r><w:t>wide</w:t></w:r></w:p></w:tc>{}</w:tr>\
             <w:tr><w:tc><w:tcPr><w:vMerge w:val=\"restart\"/></w:tcPr><w:p><w:r><w:t>tall</w:t></w:r></w:p></w:tc>{}{}</w:tr>\
             <w:tr><w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc>{}</w:tr></w:tbl>",
            cell("A"),
            cell("B"),
            cell("C"),
            cell("z"),
            cell("1"),
            cell("2"),
            cell("3"),
        );
        let out = convert_body(&body);
        assert_eq!(
            out,
            "| A | B | C |\n| --- | --- | --- |\n| wide | wide | z |\n\
             | tall | 1 | 2 |\n| tall | 3 |  |\n"
        );
    }

    #[test]
    fn tables_skip_blank_rows_and_empty_headers() {
        let cell = |t: &str| format!("<w:tc><w:p><w:r><w:t>{t}</w:t></w:r></w:p></w:tc>");
        let empty = "<w:tc><w:p/></w:tc>";
        let body = format!(
            "<w:tbl><w:tr>{}{}</w:tr><w:tr>{empty}{empty}</w:tr><w:tr>{}{}</w:tr></w:tbl>\
             <w:tbl><w:tr>{empty}{empty}</w:tr><w:tr>{}{}</w:tr></w:tbl>",
            cell("Name"),
            cell("Role"),
            cell("Ada"),
            cell("a|b"),
            cell("x"),
            cell("y"),
        );
        let out = convert_body(&body);
        assert_eq!(out, "| Name | Role |\n| --- | --- |\n| Ada | a\\|b |\n");
    }

    #[test]
    fn paragraphs_and_tables_keep_document_order() {
        let body = "<w:p><w:r><w:t>before</w:t></w:r></w:p>\
            <w:tbl><w:tr><w:tc><w:p><w:r><w:t>H</w:t></w:r></w:p></w:tc></w:tr></w:tbl>\
            <w:p><w:r><w:t>after</w:t></w:r></w:p>";
        assert_eq!(convert_body(body), "before\n\n| H |\n| --- |\n\nafter");
    }

    #[test]
    fn hyperlinks_resolve_external_relationships() {
        let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId5" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.org/" TargetMode="External"/>
        </Relationships>"#;
        let doc = document(
            r#"<w:p><w:r><w:t xml:space="preserve">see </w:t></w:r><w:hyperlink r:id="rId5"><w:r><w:t>site</w:t></w:r></w:hyperlink></w:p>"#,
        );
        let out = convert(
            package(&[(DOCUMENT_PART, doc.as_bytes()), (DOCUMENT_RELS, rels)]),
            ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out, "see [site](https://example.org/)");
    }

    fn image_package() -> Vec<u8> {
        let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
            <Relationship Id="rId8" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/missing.png"/>
        </Relationships>"#;
        let doc = document(
            r#"<w:p><w:r><w:t>Figure</w:t></w:r><w:r><w:drawing><a:graphic><a:graphicData><a:blip r:embed="rId7"/></a:graphicData></a:graphic></w:drawing></w:r></w:p>
               <w:p><w:r><w:pict><v:shape><v:imagedata r:id="rId7"/></v:shape></w:pict></w:r></w:p>"#,
        );
        let image = png();
        package(&[
            (DOCUMENT_PART, doc.as_bytes()),
            (DOCUMENT_RELS, rels),
            ("word/media/image1.png", &image),
        ])
    }

    #[test]
    fn embedded_images_are_saved_and_referenced() {
        let store = ImageStore::new(ImageSettings::default(), Arc::new(NoNetwork));
        let out = convert(image_package(), ConvertOptions::new(false, Some(&store))).unwrap();
        assert_eq!(store.len(), 1);
        let filename = store.records()[0].local_filename.clone();
        assert!(filename.starts_with("docx_img_1_"));
        let reference = format!("![Image](assets/{filename})");
        assert_eq!(out.matches(&reference).count(), 2, "{out}");
        assert!(out.starts_with("Figure\n\n![Image]"));
    }

    #[test]
    fn alternate_content_picture_is_emitted_once() {
        let rels = br#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId7" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="media/image1.png"/>
        </Relationships>"#;
        let doc = document(
            r#"<w:p><w:r><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006">
                 <mc:Choice Requires="wps"><w:drawing><a:graphic><a:graphicData><a:blip r:embed="rId7"/></a:graphicData></a:graphic></w:drawing></mc:Choice>
                 <mc:Fallback><w:pict><v:shape><v:imagedata r:id="rId7"/></v:shape></w:pict></mc:Fallback>
               </mc:AlternateContent></w:r></w:p>
               <w:p><w:r><mc:AlternateContent xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006">
                 <mc:Fallback><w:pict><v:shape><v:imagedata r:id="rId7"/></v:shape></w:pict></mc:Fallback>
               </mc:AlternateContent></w:r></w:p>"#,
        );
        let image = png();
        let bytes = package(&[
            (DOCUMENT_PART, doc.as_bytes()),
            (DOCUMENT_RELS, rels),
            ("word/media/image1.png", &image),
        ]);
        let store = ImageStore::new(ImageSettings::default(), Arc::new(NoNetwork));
        let out = convert(bytes, ConvertOptions::new(false, Some(&store))).unwrap();
        let reference = format!("![Image](assets/{})", store.records()[0].local_filename);
        // Once from the Choice of the first paragraph, once from the lone
        // Fallback of the second.
        assert_eq!(out.matches(&reference).count(), 2, "{out}");
    }

    #[test]
    fn images_are_omitted_without_a_store() {
        let out = convert(image_package(), ConvertOptions::default()).unwrap();
        assert!(!out.contains("!["));
    }

    #[test]
    fn core_properties_become_metadata() {
        let core = br#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/">
            <dc:creator>Ada Lovelace</dc:creator>
            <dcterms:created>2024-03-01T10:20:30Z</dcterms:created>
            <dcterms:modified>2024-03-02T08:00:00+02:00</dcterms:modified>
        </cp:coreProperties>"#;
        let doc = document(r#"<w:p><w:r><w:t>Body</w:t></w:r></w:p>"#);
        let out = convert(
            package(&[(DOCUMENT_PART, doc.as_bytes()), (CORE_PART, core)]),
            ConvertOptions::new(true, None),
        )
        .unwrap();
        let (block, rest) = MetadataBlock::parse(&out).unwrap();
        assert_eq!(block.get("title"), Some(&MetaValue::Text("report.docx".into())));
        assert_eq!(block.get("source_format"), Some(&MetaValue::Text("DOCX".into())));
        assert_eq!(block.get("author"), Some(&MetaValue::Text("Ada Lovelace".into())));
        assert_eq!(block.get("created"), Some(&MetaValue::Text("2024-03-01T10:20:30".into())));
        assert_eq!(block.get("modified"), Some(&MetaValue::Text("2024-03-02T06:00:00".into())));
        assert!(block.get("subject").is_none());
        assert_eq!(rest, "\nBody");
    }

    #[test]
    fn metadata_without_core_part_has_only_required_keys() {
        let doc = document(r#"<w:p><w:r><w:t>Body</w:t></w:r></w:p>"#);
        let out = convert(package(&[(DOCUMENT_PART, doc.as_bytes())]), ConvertOptions::new(true, None)).unwrap();
        let (block, _) = MetadataBlock::parse(&out).unwrap();
        assert_eq!(block.entries().len(), 2);
    }

    #[test]
    fn invalid_package_is_a_format_error() {
        let err = convert(b"not a zip".to_vec(), ConvertOptions::default()).unwrap_err();
        assert!(err.is_format_error());
        assert!(err.to_string().contains("report.docx"));
    }

    #[test]
    fn missing_document_part_is_a_format_error() {
        let err = convert(package(&[("other.xml", b"<x/>")]), ConvertOptions::default()).unwrap_err();
        match err {
            Doc2MdError::Format { source: FormatError::MissingPart(part), .. } => {
                assert_eq!(part, DOCUMENT_PART)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_document_xml_is_a_format_error() {
        let err = convert(package(&[(DOCUMENT_PART, b"<w:document>")]), ConvertOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Doc2MdError::Format { source: FormatError::MalformedXml { .. }, .. }
        ));
    }

    #[test]
    fn relationship_targets_resolve_under_word() {
        assert_eq!(resolve_target("media/image1.png"), "word/media/image1.png");
        assert_eq!(resolve_target("../media/x.png"), "media/x.png");
        assert_eq!(resolve_target("/word/media/y.png"), "word/media/y.png");
    }

    #[test]
    fn timestamps_normalise_to_utc() {
        assert_eq!(format_timestamp("2024-01-02T03:04:05Z").as_deref(), Some("2024-01-02T03:04:05"));
        assert_eq!(format_timestamp("2024-01-02").as_deref(), Some("2024-01-02T00:00:00"));
        assert_eq!(format_timestamp("yesterday"), None);
    }
}
