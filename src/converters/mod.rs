//! Format converters and the registry that picks one per file.
//!
//! Every converter implements [`Converter`]: bytes plus a filename in,
//! Markdown out. Converters share no state with each other; the only thing
//! passed between files is the optional [`ImageStore`].
//!
//! | Converter | Extensions | Images |
//! |-----------|------------|--------|
//! | [`csv::CsvConverter`] | `csv` | — |
//! | [`text::TextConverter`] | `txt`, `text` | — |
//! | [`docx::DocxConverter`] | `docx` | embedded parts |
//! | [`wxr::WxrConverter`] | `wxr`, `xml` | remote URLs, data URIs |

pub mod csv;
pub mod docx;
pub mod encoding;
pub mod text;
pub mod wxr;

use crate::config::ConversionConfig;
use crate::error::Doc2MdError;
use crate::images::ImageStore;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

// ── Input ────────────────────────────────────────────────────────────────

/// A fully buffered input file. Read once, dropped after conversion.
#[derive(Debug, Clone)]
pub struct ConversionInput {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ConversionInput {
    pub fn from_bytes(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    /// Buffer everything `reader` yields.
    pub fn from_reader(filename: impl Into<String>, mut reader: impl Read) -> std::io::Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(Self::from_bytes(filename, bytes))
    }

    /// Lower-cased extension of the filename, if any.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ── Contract ─────────────────────────────────────────────────────────────

/// Supported source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Docx,
    Csv,
    Txt,
    Wxr,
}

impl FileType {
    /// Tag written as `source_format` in metadata blocks.
    pub fn source_tag(self) -> &'static str {
        match self {
            FileType::Docx => "DOCX",
            FileType::Csv => "CSV",
            FileType::Txt => "TXT",
            FileType::Wxr => "WXR",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileType::Docx => "docx",
            FileType::Csv => "csv",
            FileType::Txt => "txt",
            FileType::Wxr => "wxr",
        })
    }
}

/// Per-call options handed to a converter.
#[derive(Clone, Copy, Default)]
pub struct ConvertOptions<'a> {
    pub include_metadata: bool,
    /// When absent, image references stay unresolved.
    pub images: Option<&'a ImageStore>,
}

impl<'a> ConvertOptions<'a> {
    pub fn new(include_metadata: bool, images: Option<&'a ImageStore>) -> Self {
        Self {
            include_metadata,
            images,
        }
    }
}

/// One source format → Markdown.
///
/// `convert` is the single error boundary of a converter: every error it
/// returns names the input file and the stage that failed.
pub trait Converter: Send + Sync {
    fn name(&self) -> &'static str;

    fn file_type(&self) -> FileType;

    /// Extensions (lower-case, no dot) this converter accepts.
    fn file_extensions(&self) -> &'static [&'static str];

    fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<String, Doc2MdError>;
}

// ── Registry ─────────────────────────────────────────────────────────────

/// The set of available converters, selected by filename extension.
pub struct ConverterRegistry {
    converters: Vec<Box<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    /// Register a converter. A later registration for the same file type wins.
    pub fn register<C: Converter + 'static>(&mut self, converter: C) {
        self.converters.retain(|c| c.file_type() != converter.file_type());
        self.converters.push(Box::new(converter));
    }

    /// All four converters, with tabular limits taken from `config`.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let mut registry = Self::new();
        registry.register(docx::DocxConverter);
        registry.register(csv::CsvConverter::new(
            config.max_table_rows,
            config.max_cell_chars,
        ));
        registry.register(text::TextConverter);
        registry.register(wxr::WxrConverter);
        registry
    }

    pub fn get(&self, file_type: FileType) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.file_type() == file_type)
            .map(|c| c.as_ref())
    }

    /// Detect the file type from the filename's extension.
    pub fn detect_format_from_filename(&self, filename: &str) -> Option<FileType> {
        self.by_extension(extension_of(filename).as_deref())
            .map(|c| c.file_type())
    }

    /// The converter for `filename`, or `UnsupportedFormat`.
    pub fn detect(&self, filename: &str) -> Result<&dyn Converter, Doc2MdError> {
        let extension = extension_of(filename);
        self.by_extension(extension.as_deref())
            .ok_or_else(|| Doc2MdError::UnsupportedFormat {
                filename: filename.to_string(),
                extension,
            })
    }

    fn by_extension(&self, ext: Option<&str>) -> Option<&dyn Converter> {
        let ext = ext?;
        self.converters
            .iter()
            .find(|c| c.file_extensions().contains(&ext))
            .map(|c| c.as_ref())
    }

    /// `(name, extensions)` for every registered converter.
    pub fn list_formats(&self) -> Vec<(&'static str, &'static [&'static str])> {
        self.converters
            .iter()
            .map(|c| (c.name(), c.file_extensions()))
            .collect()
    }

    /// Detect and run the matching converter.
    ///
    /// A panic inside a converter is caught here and reported as
    /// [`Doc2MdError::Unexpected`] for that file.
    pub fn convert(
        &self,
        input: &ConversionInput,
        opts: &ConvertOptions<'_>,
    ) -> Result<(FileType, String), Doc2MdError> {
        let extension = input.extension();
        let converter = self.by_extension(extension.as_deref()).ok_or_else(|| {
            Doc2MdError::UnsupportedFormat {
                filename: input.filename.clone(),
                extension: extension.clone(),
            }
        })?;
        let markdown = panic::catch_unwind(AssertUnwindSafe(|| converter.convert(input, opts)))
            .map_err(|payload| {
                Doc2MdError::unexpected(&input.filename, converter.name(), panic_message(&payload))
            })??;
        Ok((converter.file_type(), markdown))
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::from_config(&ConversionConfig::default())
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "converter panicked".to_string())
}

/// Join a rendered metadata block and a body with one blank line between.
pub(crate) fn with_metadata(metadata: Option<String>, body: String) -> String {
    match metadata {
        Some(block) => format!("{block}\n\n{body}"),
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension_case_insensitively() {
        let r = ConverterRegistry::default();
        assert_eq!(r.detect_format_from_filename("a.DOCX"), Some(FileType::Docx));
        assert_eq!(r.detect_format_from_filename("a.csv"), Some(FileType::Csv));
        assert_eq!(r.detect_format_from_filename("notes.text"), Some(FileType::Txt));
        assert_eq!(r.detect_format_from_filename("site.xml"), Some(FileType::Wxr));
        assert_eq!(r.detect_format_from_filename("site.wxr"), Some(FileType::Wxr));
        assert_eq!(r.detect_format_from_filename("deck.pptx"), None);
        assert_eq!(r.detect_format_from_filename("README"), None);
    }

    #[test]
    fn detect_unsupported_is_an_error() {
        let r = ConverterRegistry::default();
        let err = r.detect("deck.pptx").err().unwrap();
        assert!(matches!(err, Doc2MdError::UnsupportedFormat { .. }));
    }

    #[test]
    fn register_replaces_same_file_type() {
        let mut r = ConverterRegistry::new();
        r.register(csv::CsvConverter::new(10, 10));
        r.register(csv::CsvConverter::new(20, 10));
        assert_eq!(r.list_formats().len(), 1);
    }

    #[test]
    fn registry_convert_reports_file_type() {
        let r = ConverterRegistry::default();
        let input = ConversionInput::from_bytes("hello.txt", "hello");
        let (ft, md) = r.convert(&input, &ConvertOptions::default()).unwrap();
        assert_eq!(ft, FileType::Txt);
        assert_eq!(md, "hello");
    }

    #[test]
    fn registry_convert_reports_unknown_extension() {
        let r = ConverterRegistry::default();
        let input = ConversionInput::from_bytes("Deck.PPTX", "x");
        match r.convert(&input, &ConvertOptions::default()).unwrap_err() {
            Doc2MdError::UnsupportedFormat { filename, extension } => {
                assert_eq!(filename, "Deck.PPTX");
                assert_eq!(extension.as_deref(), Some("pptx"));
            }
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    struct Exploding;

    impl Converter for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }
        fn file_type(&self) -> FileType {
            FileType::Txt
        }
        fn file_extensions(&self) -> &'static [&'static str] {
            &["txt"]
        }
        fn convert(&self, _: &ConversionInput, _: &ConvertOptions<'_>) -> Result<String, Doc2MdError> {
            panic!("index out of range");
        }
    }

    #[test]
    fn converter_panics_become_unexpected_errors() {
        let mut r = ConverterRegistry::new();
        r.register(Exploding);
        let input = ConversionInput::from_bytes("notes.txt", "x");
        let err = r.convert(&input, &ConvertOptions::default()).unwrap_err();
        match err {
            Doc2MdError::Unexpected { filename, stage, detail } => {
                assert_eq!(filename, "notes.txt");
                assert_eq!(stage, "exploding");
                assert_eq!(detail, "index out of range");
            }
            other => panic!("expected Unexpected, got {other:?}"),
        }
    }

    #[test]
    fn input_helpers() {
        let input = ConversionInput::from_reader("Report.Final.DOCX", &b"abc"[..]).unwrap();
        assert_eq!(input.bytes, b"abc");
        assert_eq!(input.extension().as_deref(), Some("docx"));
        assert_eq!(ConversionInput::from_bytes("README", "x").extension(), None);
    }
}
