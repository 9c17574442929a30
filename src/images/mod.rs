//! The image store: one place that owns every image a batch references.
//!
//! Images are deduplicated by a short content hash, so identical bytes are
//! stored once no matter how many documents or URLs point at them. Every
//! stored image gets the filename `{prefix}_{sequence}_{hash}.{ext}`, which
//! converters emit as `assets/<filename>`.
//!
//! One store is created per batch and shared behind an `Arc`; the
//! check-hash / allocate-sequence / insert step runs under a single lock.

pub mod fetch;
pub mod optimize;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use fetch::{decode_data_uri, FetchedImage, HttpFetcher, RemoteFetcher};
pub use optimize::optimize;

use crate::config::ConversionConfig;

/// Relative directory that every emitted image reference points into.
pub const ASSETS_DIR: &str = "assets";

/// One stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    /// First 8 hex characters of the SHA-256 of `data`.
    pub content_hash: String,
    pub local_filename: String,
    pub data: Vec<u8>,
}

/// Knobs used when optimising images before they are stored.
#[derive(Debug, Clone, Copy)]
pub struct ImageSettings {
    pub max_width: u32,
    pub quality: u8,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            max_width: 1200,
            quality: 85,
        }
    }
}

#[derive(Default)]
struct StoreState {
    by_hash: HashMap<String, usize>,
    records: Vec<ImageRecord>,
    sequence: usize,
}

/// Deduplicating, thread-safe image store for one conversion batch.
pub struct ImageStore {
    settings: ImageSettings,
    fetcher: Arc<dyn RemoteFetcher>,
    state: Mutex<StoreState>,
}

impl ImageStore {
    /// A store that fetches remote images with `fetcher`.
    pub fn new(settings: ImageSettings, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            settings,
            fetcher,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// A store configured from a [`ConversionConfig`], using HTTP for remote images.
    pub fn from_config(config: &ConversionConfig) -> Self {
        let fetcher = HttpFetcher::new(
            Duration::from_secs(config.fetch_timeout_secs),
            config.user_agent.clone(),
        );
        Self::new(
            ImageSettings {
                max_width: config.max_image_width,
                quality: config.image_quality,
            },
            Arc::new(fetcher),
        )
    }

    pub fn settings(&self) -> ImageSettings {
        self.settings
    }

    /// Optimise `data` with this store's settings.
    pub fn optimize(&self, data: &[u8]) -> (Vec<u8>, &'static str) {
        optimize(data, self.settings.max_width, self.settings.quality)
    }

    /// Store `data` and return its filename.
    ///
    /// Saving bytes whose hash is already present returns the existing
    /// filename and does not advance the sequence.
    pub fn save(&self, data: &[u8], extension: &str, prefix: &str) -> String {
        let hash = content_hash(data);
        let mut state = self.state.lock();
        if let Some(&idx) = state.by_hash.get(&hash) {
            return state.records[idx].local_filename.clone();
        }
        state.sequence += 1;
        let filename = format!(
            "{}_{}_{}.{}",
            sanitize_component(prefix),
            state.sequence,
            hash,
            sanitize_component(extension)
        );
        debug!("Stored image {} ({} bytes)", filename, data.len());
        let idx = state.records.len();
        state.records.push(ImageRecord {
            content_hash: hash.clone(),
            local_filename: filename.clone(),
            data: data.to_vec(),
        });
        state.by_hash.insert(hash, idx);
        filename
    }

    /// Optimise then store; the common path for embedded and downloaded images.
    pub fn optimize_and_save(&self, data: &[u8], prefix: &str) -> String {
        let (bytes, ext) = self.optimize(data);
        self.save(&bytes, ext, prefix)
    }

    /// Best-effort remote fetch; `None` on any failure.
    pub fn fetch_remote(&self, url: &str) -> Option<FetchedImage> {
        self.fetcher.fetch(url)
    }

    /// Snapshot of `content_hash → filename`.
    pub fn list_images(&self) -> BTreeMap<String, String> {
        self.state
            .lock()
            .records
            .iter()
            .map(|r| (r.content_hash.clone(), r.local_filename.clone()))
            .collect()
    }

    /// Snapshot of every stored record, in insertion order.
    pub fn records(&self) -> Vec<ImageRecord> {
        self.state.lock().records.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every stored image into `dir` as `dir/<filename>`.
    ///
    /// Each image goes through a temp file in `dir` and a rename, so a reader
    /// never sees a half-written asset.
    pub fn write_assets(&self, dir: &Path) -> std::io::Result<usize> {
        let records = self.records();
        if records.is_empty() {
            return Ok(0);
        }
        std::fs::create_dir_all(dir)?;
        for record in &records {
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            tmp.write_all(&record.data)?;
            tmp.persist(dir.join(&record.local_filename))
                .map_err(|e| e.error)?;
        }
        debug!("Wrote {} images to {}", records.len(), dir.display());
        Ok(records.len())
    }
}

/// Markdown-relative path for a stored filename.
pub fn asset_path(filename: &str) -> String {
    format!("{ASSETS_DIR}/{filename}")
}

/// First 8 hex characters of the SHA-256 digest.
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

fn sanitize_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}
