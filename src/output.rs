//! Output types returned by the conversion entry points.
//!
//! Everything here is plain data and `Serialize`, so the CLI's `--json` mode
//! can dump a whole batch result without a separate DTO layer.

use crate::converters::FileType;
use crate::error::FileError;
use crate::images::ImageRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One converted document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The path or URL as given by the caller.
    pub input: String,
    /// Filename used for format detection.
    pub filename: String,
    /// The converter that produced `markdown`.
    pub file_type: FileType,
    /// Complete Markdown document, including the metadata block if requested.
    pub markdown: String,
    /// Images stored while converting this document on its own.
    ///
    /// Empty for documents inside a batch; the batch owns one shared store
    /// and reports it in [`BatchOutput::images`].
    #[serde(skip)]
    pub images: Vec<ImageRecord>,
}

/// The outcome for one input of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResult {
    /// 0-indexed position of the input in the batch.
    pub index: usize,
    /// The path or URL as given by the caller.
    pub input: String,
    pub result: Result<ConversionOutput, FileError>,
}

impl FileResult {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output(&self) -> Option<&ConversionOutput> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&FileError> {
        self.result.as_ref().err()
    }
}

/// Aggregate counters for a batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub converted: usize,
    pub failed: usize,
    /// Distinct images in the batch-wide store.
    pub images: usize,
    pub duration_ms: u64,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// One entry per input, in input order.
    pub files: Vec<FileResult>,
    /// `content_hash → filename` snapshot of the batch image store.
    pub images: BTreeMap<String, String>,
    pub stats: BatchStats,
    /// Markdown files written by [`crate::convert::convert_to_dir`], in input order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub written: Vec<PathBuf>,
}

impl BatchOutput {
    /// Successful conversions, in input order.
    pub fn outputs(&self) -> impl Iterator<Item = &ConversionOutput> {
        self.files.iter().filter_map(FileResult::output)
    }

    /// Failed inputs, in input order.
    pub fn errors(&self) -> impl Iterator<Item = &FileError> {
        self.files.iter().filter_map(FileResult::error)
    }
}
