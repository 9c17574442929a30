//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across threads, serialise them for logging, and
//! diff two runs to understand why their outputs differ.

use crate::error::Doc2MdError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Browser-like user agent sent with remote image requests.
///
/// Several image hosts refuse hotlinked requests that do not look like they
/// come from a browser.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Configuration for a conversion run.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_doc2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .include_metadata(true)
///     .max_image_width(800)
///     .concurrency(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Prepend a `---` delimited metadata block to each output. Default: false.
    pub include_metadata: bool,

    /// Extract embedded and remote images into an image store. Default: true.
    ///
    /// When false, no store is created: styled documents omit inline images
    /// and syndication posts keep their original remote image URLs.
    pub extract_images: bool,

    /// Images wider than this are scaled down, preserving aspect ratio. Default: 1200.
    pub max_image_width: u32,

    /// JPEG quality used when re-encoding images (1–100). Default: 85.
    pub image_quality: u8,

    /// Per-request timeout for remote image downloads in seconds. Default: 10.
    ///
    /// A failed or timed-out download is never retried; the original URL is
    /// kept in the Markdown instead.
    pub fetch_timeout_secs: u64,

    /// User agent sent with remote image requests.
    pub user_agent: String,

    /// Maximum data rows rendered for tabular input. Default: 1000.
    pub max_table_rows: usize,

    /// Tabular cells longer than this many characters are truncated with `...`. Default: 100.
    pub max_cell_chars: usize,

    /// Number of files converted at once in a batch. Default: 1.
    ///
    /// Converters are CPU-bound and independent of each other, so raising
    /// this helps large batches. Results are always reported in input order.
    pub concurrency: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-file progress events.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            include_metadata: false,
            extract_images: true,
            max_image_width: 1200,
            image_quality: 85,
            fetch_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_table_rows: 1000,
            max_cell_chars: 100,
            concurrency: 1,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("include_metadata", &self.include_metadata)
            .field("extract_images", &self.extract_images)
            .field("max_image_width", &self.max_image_width)
            .field("image_quality", &self.image_quality)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("max_table_rows", &self.max_table_rows)
            .field("max_cell_chars", &self.max_cell_chars)
            .field("concurrency", &self.concurrency)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn include_metadata(mut self, v: bool) -> Self {
        self.config.include_metadata = v;
        self
    }

    pub fn extract_images(mut self, v: bool) -> Self {
        self.config.extract_images = v;
        self
    }

    pub fn max_image_width(mut self, px: u32) -> Self {
        self.config.max_image_width = px.max(16);
        self
    }

    pub fn image_quality(mut self, q: u8) -> Self {
        self.config.image_quality = q;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    pub fn max_table_rows(mut self, n: usize) -> Self {
        self.config.max_table_rows = n.max(1);
        self
    }

    pub fn max_cell_chars(mut self, n: usize) -> Self {
        self.config.max_cell_chars = n.max(4);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Doc2MdError> {
        let c = &self.config;
        if c.image_quality == 0 || c.image_quality > 100 {
            return Err(Doc2MdError::InvalidConfig(format!(
                "Image quality must be 1–100, got {}",
                c.image_quality
            )));
        }
        if c.fetch_timeout_secs == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Image fetch timeout must be ≥ 1 second".into(),
            ));
        }
        if c.concurrency == 0 {
            return Err(Doc2MdError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
