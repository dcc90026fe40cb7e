//! Page loading: spool the upload to disk and split it into page-text chunks.
//!
//! ## Why spool to a temp file?
//!
//! An upload is buffered into a [`NamedTempFile`] for the lifetime of one
//! run. The file is removed when [`SpooledPdf`] is dropped, which covers
//! every exit path (success, early `?` return, panic unwinding) without an
//! explicit cleanup step.
//!
//! ## Why spawn_blocking?
//!
//! Text extraction is CPU-bound and `pdf-extract` can panic on malformed
//! documents. Running it on the blocking pool keeps the Tokio workers free
//! and turns a decoder panic into a `JoinError` we can report as a corrupt
//! PDF instead of tearing down the caller.

use crate::error::DatasheetError;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// The text of one physical page plus its position in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChunk {
    pub text: String,
    /// 1-indexed.
    pub page_number: usize,
    pub total_pages: usize,
    pub filename: String,
    pub processed_at: DateTime<Utc>,
}

impl PageChunk {
    /// Character count of the trimmed text, used for eligibility.
    pub fn content_chars(&self) -> usize {
        self.text.trim().chars().count()
    }
}

/// An uploaded PDF buffered on disk for the duration of a run.
pub struct SpooledPdf {
    file: NamedTempFile,
    filename: String,
}

impl SpooledPdf {
    /// Write `bytes` to a fresh temp file.
    pub fn new(bytes: &[u8], filename: &str) -> Result<Self, DatasheetError> {
        let mut file = tempfile::Builder::new()
            .prefix("datasheet-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| DatasheetError::Internal(format!("tempfile: {e}")))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|e| DatasheetError::Internal(format!("tempfile write: {e}")))?;
        debug!("Spooled {} ({} bytes) to {}", filename, bytes.len(), file.path().display());
        Ok(Self {
            file,
            filename: filename.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// Load the spooled PDF and return one chunk per page, in page order.
///
/// # Errors
/// Ingestion errors ([`DatasheetError::is_ingestion`]) when the file is not
/// a PDF, cannot be decoded, or has no pages.
pub async fn load_pages(pdf: &SpooledPdf) -> Result<Vec<PageChunk>, DatasheetError> {
    let path = pdf.path().to_path_buf();
    let filename = pdf.filename().to_string();
    let panic_filename = filename.clone();

    tokio::task::spawn_blocking(move || {
        let bytes = std::fs::read(&path)
            .map_err(|e| DatasheetError::Internal(format!("Failed to read spooled PDF: {e}")))?;
        pages_from_bytes(&bytes, &filename)
    })
    .await
    .map_err(|e| {
        if e.is_panic() {
            DatasheetError::CorruptPdf {
                filename: panic_filename,
                detail: "PDF decoder panicked".into(),
            }
        } else {
            DatasheetError::Internal(format!("Load task failed: {e}"))
        }
    })?
}

/// Decode PDF bytes into page chunks. Blocking.
pub fn pages_from_bytes(bytes: &[u8], filename: &str) -> Result<Vec<PageChunk>, DatasheetError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        return Err(DatasheetError::NotAPdf {
            filename: filename.to_string(),
            magic: bytes.iter().take(4).copied().collect(),
        });
    }

    let texts = pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| {
        DatasheetError::CorruptPdf {
            filename: filename.to_string(),
            detail: e.to_string(),
        }
    })?;

    if texts.is_empty() {
        return Err(DatasheetError::EmptyDocument {
            filename: filename.to_string(),
        });
    }

    let total_pages = texts.len();
    let processed_at = Utc::now();
    info!("PDF loaded: {} pages from {}", total_pages, filename);

    Ok(texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageChunk {
            text,
            page_number: i + 1,
            total_pages,
            filename: filename.to_string(),
            processed_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = pages_from_bytes(b"GIF89a...", "image.pdf").unwrap_err();
        match err {
            DatasheetError::NotAPdf { filename, magic } => {
                assert_eq!(filename, "image.pdf");
                assert_eq!(magic, b"GIF8".to_vec());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_short_input() {
        let err = pages_from_bytes(b"%P", "tiny.pdf").unwrap_err();
        assert!(err.is_ingestion());
    }

    #[test]
    fn content_chars_trims() {
        let chunk = PageChunk {
            text: "  \n abc \n".into(),
            page_number: 1,
            total_pages: 1,
            filename: "a.pdf".into(),
            processed_at: Utc::now(),
        };
        assert_eq!(chunk.content_chars(), 3);
    }

    #[test]
    fn spooled_file_is_removed_on_drop() {
        let spooled = SpooledPdf::new(b"%PDF-1.4\n", "x.pdf").unwrap();
        let path = spooled.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4\n");
        drop(spooled);
        assert!(!path.exists());
    }
}
