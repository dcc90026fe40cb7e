//! Input resolution: turn a user-supplied path or URL into PDF bytes.
//!
//! The extraction core works on `(bytes, filename)`; the filename matters
//! because it feeds the prompt hints, identity backfill and the store key.
//! Local files keep their basename. Downloads take the last URL path
//! segment, falling back to `downloaded.pdf`.
//!
//! PDF validation is left to the loader so that a path, a URL and raw
//! bytes all fail the same way on non-PDF input.

use crate::error::DatasheetError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A resolved input document held in memory.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to PDF bytes and a filename.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<InputDocument, DatasheetError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(input).await
    }
}

async fn read_local(path_str: &str) -> Result<InputDocument, DatasheetError> {
    if path_str.trim().is_empty() {
        return Err(DatasheetError::InvalidInput {
            input: path_str.to_string(),
        });
    }
    let path = PathBuf::from(path_str);

    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DatasheetError::PermissionDenied { path: path.clone() },
        _ => DatasheetError::FileNotFound { path: path.clone() },
    })?;

    let filename = local_filename(&path);
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(InputDocument { bytes, filename })
}

fn local_filename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, DatasheetError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DatasheetError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DatasheetError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DatasheetError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DatasheetError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            DatasheetError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DatasheetError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let filename = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", filename, bytes.len());

    Ok(InputDocument {
        bytes: bytes.to_vec(),
        filename,
    })
}

/// Last non-empty URL path segment that looks like a filename.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}
