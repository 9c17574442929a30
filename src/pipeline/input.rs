//! Input resolution: normalise a user-supplied path or URL to a buffered
//! [`ConversionInput`].
//!
//! Converters never touch the file system. Everything is read here, in full,
//! and handed over as bytes plus the filename the converter registry uses for
//! format detection. For URLs the filename is the last path segment, so
//! `https://host/export.xml` is detected as a syndication export.

use crate::converters::ConversionInput;
use crate::error::Doc2MdError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Used when a URL path has no usable last segment.
const FALLBACK_FILENAME: &str = "downloaded.txt";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a fully buffered [`ConversionInput`].
///
/// If the input is a URL, download it. If the input is a local file, read it.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ConversionInput, Doc2MdError> {
    if input.trim().is_empty() {
        return Err(Doc2MdError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input).await
    }
}

/// Read a local file, mapping I/O failures onto input errors.
async fn resolve_local(path_str: &str) -> Result<ConversionInput, Doc2MdError> {
    let path = PathBuf::from(path_str);

    if !path.is_file() {
        return Err(Doc2MdError::FileNotFound { path });
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Doc2MdError::PermissionDenied { path });
        }
        Err(_) => return Err(Doc2MdError::FileNotFound { path }),
    };

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path_str)
        .to_string();
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(ConversionInput::from_bytes(filename, bytes))
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ConversionInput, Doc2MdError> {
    info!("Downloading: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            Doc2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Doc2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(Doc2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    let filename = extract_filename(url);
    info!("Downloaded {} bytes as {}", bytes.len(), filename);

    Ok(ConversionInput::from_bytes(filename, bytes.to_vec()))
}

/// Extract a filename from the URL path.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    FALLBACK_FILENAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.docx"));
        assert!(is_url("http://example.com/data.csv"));
        assert!(!is_url("/tmp/doc.docx"));
        assert!(!is_url("doc.docx"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_extract_filename() {
        assert_eq!(extract_filename("https://x.org/files/export.xml"), "export.xml");
        assert_eq!(extract_filename("https://x.org/files/data.csv?raw=1"), "data.csv");
        assert_eq!(extract_filename("https://x.org/files/"), FALLBACK_FILENAME);
        assert_eq!(extract_filename("https://x.org/download"), FALLBACK_FILENAME);
    }

    #[tokio::test]
    async fn test_resolve_local_reads_bytes() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"a,b\n1,2\n").unwrap();

        let input = resolve_input(file.path().to_str().unwrap(), 5).await.unwrap();
        assert_eq!(input.bytes, b"a,b\n1,2\n");
        assert!(input.filename.ends_with(".csv"));
        assert!(!input.filename.contains('/'));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = resolve_input("/definitely/not/here.txt", 5).await.unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_input(dir.path().to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Doc2MdError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_blank_input() {
        let err = resolve_input("  ", 5).await.unwrap_err();
        assert!(matches!(err, Doc2MdError::InvalidInput { .. }));
    }
}
