//! Remote image retrieval.
//!
//! [`RemoteFetcher`] is the seam between the converters and the network:
//! [`HttpFetcher`] performs a single blocking GET, while tests inject a fake.
//! Every failure is reported as `None`; callers keep the original URL.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{debug, warn};

/// Bytes of a retrieved image plus the extension to store it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub extension: String,
}

/// Best-effort image retrieval by URL.
pub trait RemoteFetcher: Send + Sync {
    /// Fetch `url`, returning `None` on any network, timeout or protocol error.
    fn fetch(&self, url: &str) -> Option<FetchedImage>;
}

/// Blocking HTTP fetcher with a fixed per-request timeout and no retries.
///
/// Runs on the blocking thread pool together with the converters; the
/// underlying client is built on first use.
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
    client: OnceCell<reqwest::blocking::Client>,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
            client: OnceCell::new(),
        }
    }

    fn client(&self) -> Option<&reqwest::blocking::Client> {
        self.client
            .get_or_try_init(|| {
                reqwest::blocking::Client::builder()
                    .timeout(self.timeout)
                    .user_agent(self.user_agent.clone())
                    .build()
            })
            .map_err(|e| warn!("Could not build HTTP client for image fetches: {}", e))
            .ok()
    }
}

impl RemoteFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Option<FetchedImage> {
        let client = self.client()?;
        let response = match client.get(url).send() {
            Ok(r) => r,
            Err(e) => {
                warn!("Could not download image from {}: {}", url, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("Could not download image from {}: HTTP {}", url, response.status());
            return None;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let data = match response.bytes() {
            Ok(b) => b.to_vec(),
            Err(e) => {
                warn!("Could not read image body from {}: {}", url, e);
                return None;
            }
        };

        let extension = extension_from_content_type(&content_type)
            .or_else(|| extension_from_url(url))
            .unwrap_or("jpg")
            .to_string();
        debug!("Fetched {} ({} bytes, {})", url, data.len(), extension);

        Some(FetchedImage { data, extension })
    }
}

/// Map an image MIME type to a file extension.
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        _ => None,
    }
}

/// Guess an image extension from the last path segment of a URL.
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("jpg"),
        "png" => Some("png"),
        "gif" => Some("gif"),
        "webp" => Some("webp"),
        "svg" => Some("svg"),
        "bmp" => Some("bmp"),
        "tif" | "tiff" => Some("tiff"),
        _ => None,
    }
}

/// Decode a base64 `data:image/...` URI.
pub fn decode_data_uri(uri: &str) -> Option<FetchedImage> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header.strip_suffix(";base64")?;
    let extension = extension_from_content_type(mime)?;
    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let data = STANDARD.decode(cleaned).ok()?;
    Some(FetchedImage {
        data,
        extension: extension.to_string(),
    })
}
