//! Progress-callback trait for per-file conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as a batch converts each file.
//!
//! # Example
//!
//! ```rust
//! use edgequake_doc2md::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, input: &str, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {input} ({markdown_len} bytes)", index + 1, total);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch driver as it converts each file.
///
/// Implementations must be `Send + Sync`. All methods have default no-op
/// implementations so callers only override what they care about.
///
/// # Thread safety
///
/// When `concurrency > 1`, `on_file_start`, `on_file_complete`, and
/// `on_file_error` may be called concurrently from different tasks.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once before the first file is converted.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called just before a file is resolved and converted.
    ///
    /// # Arguments
    /// * `index` — 0-indexed position of the file in the batch
    /// * `total` — number of files in the batch
    /// * `input` — the path or URL as given by the caller
    fn on_file_start(&self, index: usize, total: usize, input: &str) {
        let _ = (index, total, input);
    }

    /// Called when a file converts successfully.
    fn on_file_complete(&self, index: usize, total: usize, input: &str, markdown_len: usize) {
        let _ = (index, total, input, markdown_len);
    }

    /// Called when a file fails. The batch continues.
    fn on_file_error(&self, index: usize, total: usize, input: &str, error: &str) {
        let _ = (index, total, input, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
