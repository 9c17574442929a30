//! # edgequake-doc2md
//!
//! Convert word-processor documents, CSV files, plain text and WordPress
//! exports to Markdown.
//!
//! ## Why this crate?
//!
//! Content migrations rarely arrive in one format. This crate normalises the
//! four formats such migrations usually carry into a single Markdown dialect,
//! keeps their metadata in a re-parseable `---` block, and collects every
//! embedded or referenced image into one deduplicated `assets/` directory.
//!
//! ## Pipeline Overview
//!
//! ```text
//! path / URL
//!  │
//!  ├─ 1. Input      read the file or download it (fully buffered)
//!  ├─ 2. Detect     pick a converter by extension
//!  ├─ 3. Convert    DOCX · CSV · TXT · WXR → Markdown (spawn_blocking)
//!  ├─ 4. Images     optimise, deduplicate by content hash, name assets/<file>
//!  └─ 5. Output     Markdown per file + image snapshot + batch stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2md::{convert, ConversionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .include_metadata(true)
//!         .build()?;
//!     let output = convert("report.docx", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!("{} images extracted", output.images.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Extensions | Notes |
//! |--------|------------|-------|
//! | Styled document | `docx` | headings, run formatting, tables, embedded images |
//! | Tabular | `csv` | Markdown table, truncation footnote, summary statistics |
//! | Plain text | `txt`, `text` | heading/list/code/link heuristics |
//! | Syndication export | `wxr`, `xml` | one section per post, remote images localised |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `doc2md` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-doc2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod converters;
pub mod error;
pub mod images;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    convert, convert_batch, convert_bytes, convert_sync, convert_to_dir, sanitize_filename,
};
pub use converters::{
    ConversionInput, ConvertOptions, Converter, ConverterRegistry, FileType,
};
pub use error::{Doc2MdError, FileError, FormatError};
pub use images::{ImageRecord, ImageSettings, ImageStore};
pub use metadata::{MetaValue, MetadataBlock};
pub use output::{BatchOutput, BatchStats, ConversionOutput, FileResult};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{convert_stream, FileStream};
