//! Streaming batch API: emit per-file results as they complete.
//!
//! Large batches (a few hundred exports, or documents fetched over the
//! network) take a while. A stream lets callers show progress, write each
//! document as soon as it is ready, or stop early by dropping the stream.
//!
//! [`crate::convert::convert_batch`] is this stream collected into a
//! [`crate::output::BatchOutput`].

use crate::config::ConversionConfig;
use crate::converters::{ConversionInput, ConvertOptions, ConverterRegistry};
use crate::error::FileError;
use crate::images::ImageStore;
use crate::output::{ConversionOutput, FileResult};
use crate::pipeline::input;
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// A boxed stream of per-file results.
pub type FileStream = Pin<Box<dyn Stream<Item = FileResult> + Send>>;

/// Convert every input, yielding one [`FileResult`] per input in input order.
///
/// With `concurrency == 1` files are converted strictly one after another.
/// Otherwise up to `concurrency` files are in flight at once; results are
/// still yielded in input order.
///
/// `images` is the store shared by every file of the stream. Pass `None` to
/// skip image extraction regardless of `config.extract_images`.
pub fn convert_stream(
    inputs: Vec<String>,
    config: &ConversionConfig,
    images: Option<Arc<ImageStore>>,
) -> FileStream {
    let total = inputs.len();
    info!("Starting streaming conversion of {} files", total);

    let ctx = Arc::new(BatchContext {
        registry: ConverterRegistry::from_config(config),
        images,
        include_metadata: config.include_metadata,
        download_timeout_secs: config.download_timeout_secs,
        callback: config.progress_callback.clone(),
        total,
    });
    let concurrency = config.concurrency.max(1);
    let jobs = inputs.into_iter().enumerate();

    if concurrency == 1 {
        let s = stream::iter(jobs).then(move |(index, input)| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.convert_file(index, input).await }
        });
        Box::pin(s)
    } else {
        let s = stream::iter(jobs.map(move |(index, input)| {
            let ctx = Arc::clone(&ctx);
            async move { ctx.convert_file(index, input).await }
        }))
        .buffered(concurrency);
        Box::pin(s)
    }
}

/// Everything one file's conversion needs, shared by all files of a stream.
struct BatchContext {
    registry: ConverterRegistry,
    images: Option<Arc<ImageStore>>,
    include_metadata: bool,
    download_timeout_secs: u64,
    callback: Option<ProgressCallback>,
    total: usize,
}

impl BatchContext {
    /// Resolve, convert and report one input. Never fails: every error
    /// becomes the [`FileError`] of the returned result.
    async fn convert_file(self: Arc<Self>, index: usize, input_str: String) -> FileResult {
        if let Some(ref cb) = self.callback {
            cb.on_file_start(index, self.total, &input_str);
        }

        let result = match input::resolve_input(&input_str, self.download_timeout_secs).await {
            Ok(resolved) => Arc::clone(&self).convert_blocking(input_str.clone(), resolved).await,
            Err(e) => Err(FileError::from_fatal(&input_str, &e)),
        };

        match &result {
            Ok(out) => {
                info!("Converted {} as {}", input_str, out.file_type);
                if let Some(ref cb) = self.callback {
                    cb.on_file_complete(index, self.total, &input_str, out.markdown.len());
                }
            }
            Err(e) => {
                warn!("{}", e);
                if let Some(ref cb) = self.callback {
                    cb.on_file_error(index, self.total, &input_str, &e.to_string());
                }
            }
        }

        FileResult {
            index,
            input: input_str,
            result,
        }
    }

    async fn convert_blocking(
        self: Arc<Self>,
        input_str: String,
        resolved: ConversionInput,
    ) -> Result<ConversionOutput, FileError> {
        let label = input_str.clone();
        let task = tokio::task::spawn_blocking(move || {
            let opts = ConvertOptions::new(self.include_metadata, self.images.as_deref());
            debug!("Converting {} ({} bytes)", resolved.filename, resolved.bytes.len());
            self.registry
                .convert(&resolved, &opts)
                .map(|(file_type, markdown)| ConversionOutput {
                    input: input_str.clone(),
                    filename: resolved.filename.clone(),
                    file_type,
                    markdown,
                    images: Vec::new(),
                })
                .map_err(|e| FileError::from_fatal(&input_str, &e))
        })
        .await;

        task.unwrap_or_else(|e| {
            Err(FileError::TaskFailed {
                input: label,
                detail: e.to_string(),
            })
        })
    }
}
