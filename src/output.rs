//! Result types returned by the extraction entry points.

use crate::error::PageError;
use crate::record::MergedRecord;
use crate::store::UpsertOutcome;
use serde::{Deserialize, Serialize};

/// Overall quality of a merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Manufacturer and sensor type are known and at least one
    /// specification group holds a value.
    Good,
    Partial,
}

impl Quality {
    pub fn assess(record: &MergedRecord) -> Self {
        if record.manufacturer.is_some()
            && record.sensor_type.is_some()
            && !record.filled_groups().is_empty()
        {
            Quality::Good
        } else {
            Quality::Partial
        }
    }
}

/// What happened to one eligible page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,
    /// The page's response yielded a non-empty record.
    pub recovered: bool,
    /// Filled fields in the page's record (0 when not recovered).
    pub fields: usize,
    /// The page's record named a model.
    pub named_model: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageOutcome {
    pub(crate) fn failed(page_num: usize, error: Option<PageError>, duration_ms: u64) -> Self {
        Self {
            page_num,
            recovered: false,
            fields: 0,
            named_model: false,
            duration_ms,
            error,
        }
    }
}

/// Counters and timings for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages sent to the model (after the length filter and page cap).
    pub eligible_pages: usize,
    pub recovered_pages: usize,
    /// Pages whose model call failed or whose response was unrecoverable.
    pub failed_pages: usize,
    pub used_fallback: bool,
    pub total_duration_ms: u64,
    pub llm_duration_ms: u64,
}

/// Complete result of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// The record as persisted.
    pub record: MergedRecord,
    pub quality: Quality,
    /// What the store did with the record.
    pub outcome: UpsertOutcome,
    pub pages: Vec<PageOutcome>,
    pub stats: ExtractionStats,
}
