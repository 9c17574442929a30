//! Eager conversion entry points: one document, a batch, or a batch written
//! straight to an output directory.
//!
//! Converters are synchronous and CPU-bound, so every file runs inside
//! `tokio::task::spawn_blocking`. A batch shares one [`ImageStore`], which is
//! what makes identical images across documents collapse to a single asset.
//! Use [`crate::stream::convert_stream`] to receive per-file results as they
//! complete instead of waiting for the whole batch.

use crate::config::ConversionConfig;
use crate::converters::{ConversionInput, ConvertOptions, ConverterRegistry};
use crate::error::Doc2MdError;
use crate::images::{ImageStore, ASSETS_DIR};
use crate::output::{BatchOutput, BatchStats, ConversionOutput, FileResult};
use crate::pipeline::input;
use crate::stream::convert_stream;
use futures::StreamExt;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Longest output filename, in bytes.
const MAX_FILENAME_BYTES: usize = 255;

/// Convert one file or URL to Markdown.
///
/// This is the primary entry point for the library. Images are collected in
/// a store private to this call and returned in [`ConversionOutput::images`].
///
/// # Arguments
/// * `input` — Local file path or HTTP/HTTPS URL
/// * `config` — Conversion configuration
///
/// # Errors
/// - File not found / permission denied / download failure
/// - No converter for the file's extension
/// - The converter rejected the content ([`Doc2MdError::Format`])
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    convert_resolved(input_str.to_string(), resolved, config).await
}

/// Convert an in-memory document to Markdown.
///
/// `filename` is only used for format detection and metadata; nothing is
/// read from or written to disk.
///
/// # Example
/// ```rust,no_run
/// use edgequake_doc2md::{convert_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let output = convert_bytes("people.csv", b"Name,Age\nAda,36\n".to_vec(), &ConversionConfig::default()).await?;
/// println!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_bytes(
    filename: impl Into<String>,
    bytes: Vec<u8>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let input = ConversionInput::from_bytes(filename, bytes);
    convert_resolved(input.filename.clone(), input, config).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Doc2MdError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// Convert several files or URLs with one shared image store.
///
/// A failing input never stops the batch: it is recorded as a
/// [`FileResult`] with an error and the remaining inputs are converted.
pub async fn convert_batch<S: AsRef<str>>(inputs: &[S], config: &ConversionConfig) -> BatchOutput {
    let (batch, store) = run_batch(inputs, config).await;
    release_store(store).await;
    batch
}

/// Convert a batch and write `<name>.md` per converted file plus every
/// image under `<out_dir>/assets/`.
///
/// Output names come from [`sanitize_filename`] applied to the input's file
/// stem. When two inputs share a stem, later ones get their extension
/// appended (`report.md`, `report_csv.md`). Every file is written to a temp
/// file in `out_dir` first and renamed into place.
///
/// # Errors
/// Only output-directory failures are fatal; per-file conversion failures
/// are reported inside the returned [`BatchOutput`].
pub async fn convert_to_dir<S: AsRef<str>>(
    inputs: &[S],
    out_dir: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<BatchOutput, Doc2MdError> {
    let out_dir = out_dir.as_ref().to_path_buf();
    tokio::fs::create_dir_all(&out_dir)
        .await
        .map_err(|e| Doc2MdError::OutputWriteFailed {
            path: out_dir.clone(),
            source: e,
        })?;

    let (mut batch, store) = run_batch(inputs, config).await;

    let mut used = HashSet::new();
    let documents: Vec<(PathBuf, String)> = batch
        .outputs()
        .map(|out| {
            let name = unique_output_name(&out.filename, &mut used);
            (out_dir.join(name), out.markdown.clone())
        })
        .collect();

    let assets_dir = out_dir.join(ASSETS_DIR);
    let written = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>, Doc2MdError> {
        let mut written = Vec::with_capacity(documents.len());
        for (path, markdown) in documents {
            write_atomic(&path, markdown.as_bytes())?;
            written.push(path);
        }
        if let Some(store) = store {
            let count = store
                .write_assets(&assets_dir)
                .map_err(|e| Doc2MdError::OutputWriteFailed {
                    path: assets_dir.clone(),
                    source: e,
                })?;
            debug!("Wrote {} assets", count);
        }
        Ok(written)
    })
    .await
    .map_err(|e| Doc2MdError::Internal(format!("output writer task failed: {e}")))??;

    info!(
        "Wrote {} documents to {}",
        written.len(),
        out_dir.display()
    );
    batch.written = written;
    Ok(batch)
}

/// Make `name` safe to use as a single path component.
///
/// Reserved characters `<>:"/\|?*` become `_`, control characters are
/// removed, a leading dot becomes `_`, and the result is cut to 255 bytes
/// on a character boundary.
pub fn sanitize_filename(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect();

    if cleaned.starts_with('.') {
        cleaned.replace_range(..1, "_");
    }
    if cleaned.trim().is_empty() {
        return "document".to_string();
    }
    if cleaned.len() > MAX_FILENAME_BYTES {
        let mut cut = MAX_FILENAME_BYTES;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }
    cleaned
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Convert a buffered input on the blocking pool with a private store.
async fn convert_resolved(
    label: String,
    input: ConversionInput,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Doc2MdError> {
    let start = Instant::now();
    let registry = ConverterRegistry::from_config(config);
    let store = config.extract_images.then(|| ImageStore::from_config(config));
    let include_metadata = config.include_metadata;

    // The store (and its lazily built HTTP client) is dropped on the blocking
    // thread as well.
    let output = tokio::task::spawn_blocking(move || {
        let opts = ConvertOptions::new(include_metadata, store.as_ref());
        let (file_type, markdown) = registry.convert(&input, &opts)?;
        Ok::<_, Doc2MdError>(ConversionOutput {
            input: label,
            filename: input.filename,
            file_type,
            markdown,
            images: store.map(|s| s.records()).unwrap_or_default(),
        })
    })
    .await
    .map_err(|e| Doc2MdError::Internal(format!("conversion task failed: {e}")))??;

    info!(
        "Converted {} ({}, {} bytes, {} images) in {}ms",
        output.filename,
        output.file_type,
        output.markdown.len(),
        output.images.len(),
        start.elapsed().as_millis()
    );
    Ok(output)
}

/// Drive a whole batch through [`convert_stream`] and aggregate the results.
async fn run_batch<S: AsRef<str>>(
    inputs: &[S],
    config: &ConversionConfig,
) -> (BatchOutput, Option<Arc<ImageStore>>) {
    let start = Instant::now();
    let total = inputs.len();
    info!("Starting batch of {} files", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let store = config
        .extract_images
        .then(|| Arc::new(ImageStore::from_config(config)));
    let owned: Vec<String> = inputs.iter().map(|s| s.as_ref().to_string()).collect();
    let files: Vec<FileResult> = convert_stream(owned, config, store.clone()).collect().await;

    let converted = files.iter().filter(|f| f.is_ok()).count();
    let images = store.as_ref().map(|s| s.list_images()).unwrap_or_default();
    let stats = BatchStats {
        total_files: total,
        converted,
        failed: total - converted,
        images: images.len(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if stats.failed > 0 {
        warn!("{} of {} files failed", stats.failed, total);
    }
    info!(
        "Batch complete: {}/{} files, {} images, {}ms",
        converted, total, stats.images, stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, converted);
    }

    let batch = BatchOutput {
        files,
        images,
        stats,
        written: Vec::new(),
    };
    (batch, store)
}

/// Drop the batch store off the async workers; its blocking HTTP client
/// must not be dropped inside the runtime.
async fn release_store(store: Option<Arc<ImageStore>>) {
    if let Some(store) = store {
        let _ = tokio::task::spawn_blocking(move || drop(store)).await;
    }
}

/// `<stem>.md`, or `<stem>_<ext>.md` (then `_<n>`) when already taken.
fn unique_output_name(filename: &str, used: &mut HashSet<String>) -> String {
    let path = Path::new(filename);
    let stem = sanitize_filename(
        path.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(filename),
    );
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(sanitize_filename)
        .unwrap_or_default();

    let mut candidates = vec![format!("{stem}.md")];
    if !ext.is_empty() {
        candidates.push(format!("{stem}_{ext}.md"));
    }
    let base = candidates.last().cloned().unwrap_or_default();
    let base_stem = base.trim_end_matches(".md").to_string();

    let name = candidates
        .into_iter()
        .find(|c| !used.contains(c))
        .unwrap_or_else(|| {
            (2..)
                .map(|n| format!("{base_stem}_{n}.md"))
                .find(|c| !used.contains(c))
                .unwrap_or(base)
        });
    used.insert(name.clone());
    name
}

/// Write `bytes` to `path` via a temp file in the same directory and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Doc2MdError> {
    let err = |e: std::io::Error| Doc2MdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(err)?;
    tmp.write_all(bytes).map_err(err)?;
    tmp.persist(path).map_err(|e| err(e.error))?;
    Ok(())
}
