//! # sensor-datasheet
//!
//! Extract a structured record from a PDF sensor datasheet with a language
//! model.
//!
//! ## Why this crate?
//!
//! Datasheets put the same facts in different places: the part number on the
//! cover, the supply range in an electrical table on page 3, the operating
//! temperature in a footnote. Asking a model about the whole document at once
//! overflows small context windows, and the answers of small models are
//! rarely clean JSON. This crate asks about one page at a time, recovers
//! whatever JSON it can from each answer, and merges the pages into one
//! record with a deterministic conflict policy.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Load     spool to a temp file, extract page text (spawn_blocking)
//!  ├─ 2. Prompt   first 5 pages with ≥ 50 chars, filename hints embedded
//!  ├─ 3. Model    one call per page, no retries
//!  ├─ 4. Recover  fenced block / brace scan / one repair pass
//!  ├─ 5. Merge    FirstNonNullWins or ScoreBased, empty groups pruned
//!  ├─ 6. Fallback three-field prompt when no page yielded data
//!  ├─ 7. Identity model / sensor type backfilled from the filename
//!  └─ 8. Store    upsert keyed on (model, filename)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_datasheet::{extract_file, ExtractionConfig, JsonFileStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENROUTER_API_KEY / OPENAI_API_KEY / ...
//!     let config = ExtractionConfig::default();
//!     let store = JsonFileStore::new("sensors.json");
//!     let output = extract_file("TEMT6000_datasheet.pdf", &config, &store).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.record)?);
//!     eprintln!("quality: {:?}, store: {:?}", output.quality, output.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `datasheet2json` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! sensor-datasheet = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, MergePolicy, DEFAULT_MODEL};
pub use error::{DatasheetError, GatewayError, PageError, StoreError};
pub use extract::{extract, extract_file, extract_sync, run_pages, PageRun};
pub use output::{ExtractionOutput, ExtractionStats, PageOutcome, Quality};
pub use pipeline::gateway::{LlmGateway, ModelGateway};
pub use pipeline::merge::RecordMerger;
pub use pipeline::recover::recover;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{Group, MergedRecord, Node, PartialRecord, SourceInfo};
pub use store::{
    Confidence, JsonFileStore, MemoryStore, PageAuditRecord, RecordKey, RecordStore, UpsertOutcome,
};
