//! Error types for the sensor-datasheet library.
//!
//! Four error types reflect four failure scopes:
//!
//! * [`DatasheetError`] — **Fatal**: the run cannot produce a record at all
//!   (unreadable PDF, provider not configured, store write failed). Returned
//!   as `Err(DatasheetError)` from the top-level `extract*` functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page yielded nothing (gateway
//!   call failed, response could not be recovered). Stored inside
//!   [`crate::output::PageOutcome`]; the run continues with the next page.
//!
//! * [`GatewayError`] — returned by [`crate::pipeline::gateway::ModelGateway`]
//!   implementations. The pipeline converts it into a [`PageError`].
//!
//! * [`StoreError`] — returned by [`crate::store::RecordStore`]
//!   implementations. Surfaced to callers as [`DatasheetError::Persistence`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the sensor-datasheet library.
#[derive(Debug, Error)]
pub enum DatasheetError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Ingestion errors ──────────────────────────────────────────────────
    /// The bytes do not start with the `%PDF` magic.
    #[error("'{filename}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { filename: String, magic: Vec<u8> },

    /// The PDF decoder rejected the document.
    #[error("PDF '{filename}' is corrupt: {detail}")]
    CorruptPdf { filename: String, detail: String },

    /// The document decoded but has no pages.
    #[error("PDF '{filename}' has no pages")]
    EmptyDocument { filename: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The store rejected or failed the final upsert.
    #[error("Failed to persist record for model '{model}' from '{filename}': {detail}")]
    Persistence {
        model: String,
        filename: String,
        detail: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DatasheetError {
    /// `true` for the failures the pipeline classifies as ingestion errors:
    /// the bytes could not be turned into page text.
    pub fn is_ingestion(&self) -> bool {
        matches!(
            self,
            DatasheetError::NotAPdf { .. }
                | DatasheetError::CorruptPdf { .. }
                | DatasheetError::EmptyDocument { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored alongside [`crate::output::PageOutcome`] when a page contributes
/// nothing to the merged record.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The model gateway call failed.
    #[error("Page {page}: model call failed: {detail}")]
    GatewayFailed { page: usize, detail: String },

    /// No JSON object could be recovered from the response, even after repair.
    #[error("Page {page}: no JSON object recoverable from model response")]
    Unrecoverable { page: usize },
}

/// Failure of a single [`crate::pipeline::gateway::ModelGateway`] call.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider returned an error (HTTP failure, rate limit, auth, ...).
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider answered with no content at all.
    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

/// Failure of a [`crate::store::RecordStore`] operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Serde(#[from] serde_json::Error),

    /// The record's own `model` / `source.filename` disagree with the key
    /// it is being written under.
    #[error("record does not answer to key ({model}, {filename})")]
    KeyMismatch { model: String, filename: String },

    /// Backend-specific failure (connection lost, write rejected, ...).
    #[error("{0}")]
    Backend(String),
}
