//! Error types for the edgequake-doc2md library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`FormatError`] — a parser stage could not make sense of its input
//!   (undecodable bytes, no rows, a ZIP package missing its main part).
//!   Never returned on its own: every converter wraps it in
//!   [`Doc2MdError::Format`] together with the filename and stage.
//!
//! * [`Doc2MdError`] — **Fatal** for one call: the file could not be
//!   resolved, its format is unsupported, or it could not be converted.
//!   Returned as `Err(Doc2MdError)` from the top-level `convert*` functions.
//!
//! * [`FileError`] — **Non-fatal**: one file in a batch failed but the
//!   others are fine. Stored inside [`crate::output::FileResult`] so callers
//!   can inspect partial success rather than losing the whole batch.
//!
//! Image optimisation and download failures are not errors at all; the
//! image store degrades to "keep the original" and logs a warning.

use std::path::PathBuf;
use thiserror::Error;

/// Stage-level parse failure, always carried inside [`Doc2MdError::Format`].
#[derive(Debug, Error)]
pub enum FormatError {
    /// None of the candidate text encodings could decode the bytes.
    #[error("could not decode input as any of: {tried}")]
    Undecodable { tried: String },

    /// The decoded text contains no parseable rows.
    #[error("no columns to parse from file")]
    NoRows,

    /// A data row has more cells than the header row.
    #[error("row {row} has {found} fields, expected at most {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// The byte stream is not a valid ZIP package.
    #[error("not a valid document package: {0}")]
    InvalidPackage(#[from] zip::result::ZipError),

    /// A required package part is absent.
    #[error("package part '{0}' is missing")]
    MissingPart(String),

    /// A package part is not well-formed XML.
    #[error("part '{part}' is not well-formed XML: {source}")]
    MalformedXml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    /// Reading a package part failed.
    #[error("failed to read part '{part}': {source}")]
    PartRead {
        part: String,
        #[source]
        source: std::io::Error,
    },
}

/// All fatal errors returned by the edgequake-doc2md library.
///
/// Per-file failures inside a batch use [`FileError`] and are stored in
/// [`crate::output::FileResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Doc2MdError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// No converter is registered for the file's extension.
    #[error("Unsupported file format for '{filename}' (extension: {extension:?})\nSupported: docx, csv, txt, text, wxr, xml")]
    UnsupportedFormat {
        filename: String,
        extension: Option<String>,
    },

    /// The input could not be parsed by its converter.
    #[error("Failed to convert '{filename}' during {stage}: {source}")]
    Format {
        filename: String,
        stage: &'static str,
        #[source]
        source: FormatError,
    },

    /// Anything else that went wrong inside a converter.
    #[error("Unexpected error converting '{filename}' during {stage}: {detail}")]
    Unexpected {
        filename: String,
        stage: &'static str,
        detail: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2MdError {
    /// Wrap a [`FormatError`] with the file and stage it came from.
    pub fn format(filename: &str, stage: &'static str, source: FormatError) -> Self {
        Doc2MdError::Format {
            filename: filename.to_string(),
            stage,
            source,
        }
    }

    /// Wrap any other failure with the file and stage it came from.
    pub fn unexpected(filename: &str, stage: &'static str, detail: impl ToString) -> Self {
        Doc2MdError::Unexpected {
            filename: filename.to_string(),
            stage,
            detail: detail.to_string(),
        }
    }

    /// True when the failure is a [`FormatError`] (bad input, not a bug).
    pub fn is_format_error(&self) -> bool {
        matches!(self, Doc2MdError::Format { .. })
    }
}

/// A non-fatal error for a single file in a batch.
///
/// Stored alongside [`crate::output::FileResult`] when a file fails.
/// The batch always continues with the remaining files.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The file could not be resolved or has no converter.
    #[error("{input}: {detail}")]
    Unreadable { input: String, detail: String },

    /// The converter rejected or failed on the file.
    #[error("{input}: conversion failed: {detail}")]
    ConversionFailed { input: String, detail: String },

    /// The blocking worker running the conversion panicked or was cancelled.
    #[error("{input}: worker task failed: {detail}")]
    TaskFailed { input: String, detail: String },
}

impl FileError {
    /// Classify a fatal error for one input into its batch-level form.
    pub fn from_fatal(input: &str, err: &Doc2MdError) -> Self {
        match err {
            Doc2MdError::Format { .. } | Doc2MdError::Unexpected { .. } => {
                FileError::ConversionFailed {
                    input: input.to_string(),
                    detail: err.to_string(),
                }
            }
            _ => FileError::Unreadable {
                input: input.to_string(),
                detail: err.to_string(),
            },
        }
    }

    /// The input this error belongs to.
    pub fn input(&self) -> &str {
        match self {
            FileError::Unreadable { input, .. }
            | FileError::ConversionFailed { input, .. }
            | FileError::TaskFailed { input, .. } => input,
        }
    }
}
