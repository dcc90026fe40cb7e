//! Extraction entry points.
//!
//! A run turns one PDF into one persisted record:
//!
//! ```text
//! bytes ─▶ spool ─▶ load pages ─▶ per eligible page: prompt ─▶ model ─▶ recover ─▶ merge
//!                                   │
//!                                   └─ nothing recovered ─▶ fallback prompt ─▶ recover ─▶ merge
//!       ─▶ prune ─▶ identity backfill ─▶ attach source ─▶ upsert
//! ```
//!
//! Pages are processed sequentially and in page order; merge results under
//! both policies depend on that order.

use crate::config::ExtractionConfig;
use crate::error::{DatasheetError, PageError, StoreError};
use crate::output::{ExtractionOutput, ExtractionStats, PageOutcome, Quality};
use crate::pipeline::gateway::{resolve_gateway, ModelGateway};
use crate::pipeline::hints::FilenameHints;
use crate::pipeline::load::{load_pages, PageChunk, SpooledPdf};
use crate::pipeline::merge::RecordMerger;
use crate::pipeline::{fallback, input, recover};
use crate::prompts::{page_prompt, truncate_chars};
use crate::record::{MergedRecord, PartialRecord, SourceInfo};
use crate::store::{Confidence, PageAuditRecord, RecordKey, RecordStore};
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Characters kept in an audit document's `text_snippet`.
const SNIPPET_CHARS: usize = 200;

/// Extract a record from PDF bytes and persist it.
///
/// # Arguments
/// * `bytes`    — Raw PDF bytes
/// * `filename` — Original upload name; drives prompt hints, identity
///   backfill and the store key
/// * `config`   — Extraction configuration
/// * `store`    — Where the record (and optional page audit) is written
///
/// # Returns
/// `Ok(ExtractionOutput)` whenever the PDF could be read and the record was
/// persisted, even if no page yielded data (the record then carries only
/// filename-derived identity).
///
/// # Errors
/// Returns `Err(DatasheetError)` only for fatal errors:
/// - Not a PDF / corrupt / zero pages
/// - No LLM provider could be resolved
/// - The store failed
///
/// # Example
/// ```rust,no_run
/// use sensor_datasheet::{extract, ExtractionConfig, MemoryStore};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("TEMT6000_datasheet.pdf")?;
/// let store = MemoryStore::new();
/// let output = extract(&bytes, "TEMT6000_datasheet.pdf", &ExtractionConfig::default(), &store).await?;
/// println!("{}", serde_json::to_string_pretty(&output.record)?);
/// # Ok(())
/// # }
/// ```
pub async fn extract(
    bytes: &[u8],
    filename: &str,
    config: &ExtractionConfig,
    store: &dyn RecordStore,
) -> Result<ExtractionOutput, DatasheetError> {
    let total_start = Instant::now();
    info!("Starting extraction: {}", filename);

    // ── Step 1: Spool input ──────────────────────────────────────────────
    // `spooled` is dropped (and the file deleted) on every return path.
    let spooled = SpooledPdf::new(bytes, filename)?;

    // ── Step 2: Resolve gateway ──────────────────────────────────────────
    let gateway = resolve_gateway(config)?;

    // ── Step 3: Load pages ───────────────────────────────────────────────
    let pages = load_pages(&spooled).await?;

    // ── Step 4: Prompt, recover and merge ────────────────────────────────
    let hints = FilenameHints::from_filename(filename);
    let llm_start = Instant::now();
    let run = run_pages(&pages, &hints, gateway.as_ref(), config).await;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    // ── Step 5: Identity backfill and provenance ─────────────────────────
    // Prefer the model the gateway reports over the configured one.
    let model_id = gateway.model_id().unwrap_or(config.model_id()).to_string();
    let mut record = run.record;
    hints.resolve_identity(&mut record);
    record.classification_model = Some(model_id.clone());
    record.source = Some(SourceInfo {
        filename: filename.to_string(),
        upload_date: Utc::now(),
        page_count: pages.len(),
    });

    // ── Step 6: Persist ──────────────────────────────────────────────────
    let key = RecordKey::new(
        record
            .model
            .clone()
            .unwrap_or_else(|| format!("Unknown_{filename}")),
        filename,
    );
    let committed = if config.audit_pages {
        let audits = page_audit(&pages, &run.pages, &model_id);
        store.upsert_with_audit(&key, &record, &audits).await
    } else {
        store.upsert(&key, &record).await
    };
    let outcome = committed.map_err(|e: StoreError| {
        error!("Persistence failed for {}: {}", filename, e);
        DatasheetError::Persistence {
            model: key.model.clone(),
            filename: filename.to_string(),
            detail: e.to_string(),
        }
    })?;

    let quality = Quality::assess(&record);
    let stats = ExtractionStats {
        total_pages: pages.len(),
        eligible_pages: run.pages.len(),
        recovered_pages: run.pages.iter().filter(|p| p.recovered).count(),
        failed_pages: run.pages.iter().filter(|p| p.error.is_some()).count(),
        used_fallback: run.used_fallback,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        llm_duration_ms,
    };

    info!(
        "Extraction complete: {} ({:?}, {:?}), {}/{} pages recovered, {}ms total",
        key.model, quality, outcome, stats.recovered_pages, stats.eligible_pages, stats.total_duration_ms
    );

    Ok(ExtractionOutput {
        record,
        quality,
        outcome,
        pages: run.pages,
        stats,
    })
}

/// Resolve a local path or HTTP(S) URL, then run [`extract`].
pub async fn extract_file(
    input_str: impl AsRef<str>,
    config: &ExtractionConfig,
    store: &dyn RecordStore,
) -> Result<ExtractionOutput, DatasheetError> {
    let doc = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    extract(&doc.bytes, &doc.filename, config, store).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a temporary tokio runtime internally.
pub fn extract_sync(
    bytes: &[u8],
    filename: &str,
    config: &ExtractionConfig,
    store: &dyn RecordStore,
) -> Result<ExtractionOutput, DatasheetError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DatasheetError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(bytes, filename, config, store))
}

/// Merged result of the page loop, before identity backfill.
#[derive(Debug, Clone)]
pub struct PageRun {
    /// Pruned merge of every recovered page (and the fallback, if used).
    pub record: MergedRecord,
    /// One outcome per eligible page, in page order.
    pub pages: Vec<PageOutcome>,
    pub used_fallback: bool,
}

/// Drive the eligible pages through the gateway and merge what comes back.
///
/// Eligible pages are the first `max_pages` whose trimmed text holds at
/// least `min_page_chars` characters. Never fails: a page whose call errors
/// or whose response cannot be recovered contributes nothing.
pub async fn run_pages(
    pages: &[PageChunk],
    hints: &FilenameHints,
    gateway: &dyn ModelGateway,
    config: &ExtractionConfig,
) -> PageRun {
    let merger = RecordMerger::from_config(config);
    let eligible: Vec<&PageChunk> = pages
        .iter()
        .filter(|p| p.content_chars() >= config.min_page_chars)
        .take(config.max_pages)
        .collect();
    debug!(
        "{} of {} pages eligible (min {} chars, cap {})",
        eligible.len(),
        pages.len(),
        config.min_page_chars,
        config.max_pages
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(eligible.len());
    }

    let mut acc = MergedRecord::default();
    let mut outcomes = Vec::with_capacity(eligible.len());

    for chunk in eligible {
        let page_num = chunk.page_number;
        let total = chunk.total_pages;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_num, total);
        }

        let page_start = Instant::now();
        let prompt = page_prompt(chunk, hints, config.max_page_chars);
        let response = gateway.complete(&prompt).await;
        let duration_ms = page_start.elapsed().as_millis() as u64;

        let outcome = match response {
            Err(e) => {
                warn!("Page {}: model call failed: {}", page_num, e);
                PageOutcome::failed(
                    page_num,
                    Some(PageError::GatewayFailed {
                        page: page_num,
                        detail: e.to_string(),
                    }),
                    duration_ms,
                )
            }
            Ok(raw) => match recover::recover(&raw) {
                None => {
                    debug!("Page {}: no JSON object recoverable", page_num);
                    PageOutcome::failed(
                        page_num,
                        Some(PageError::Unrecoverable { page: page_num }),
                        duration_ms,
                    )
                }
                Some(object) => {
                    let partial = PartialRecord::from_object(object);
                    if partial.is_empty() {
                        debug!("Page {}: response carried no information", page_num);
                        PageOutcome::failed(page_num, None, duration_ms)
                    } else {
                        let outcome = PageOutcome {
                            page_num,
                            recovered: true,
                            fields: partial.filled_fields(),
                            named_model: partial.model.is_some(),
                            duration_ms,
                            error: None,
                        };
                        acc = merger.merge(acc, partial);
                        outcome
                    }
                }
            },
        };

        if let Some(ref cb) = config.progress_callback {
            match (&outcome.error, outcome.recovered) {
                (_, true) => cb.on_page_recovered(page_num, total, outcome.fields),
                (Some(e), false) => cb.on_page_error(page_num, total, &e.to_string()),
                (None, false) => cb.on_page_error(page_num, total, "empty record"),
            }
        }
        outcomes.push(outcome);
    }

    let recovered = outcomes.iter().filter(|o| o.recovered).count();
    let mut used_fallback = false;
    if recovered == 0 {
        used_fallback = true;
        if let Some(ref cb) = config.progress_callback {
            cb.on_fallback();
        }
        if let Some(partial) = fallback::extract_identity(pages, gateway, config).await {
            acc = merger.merge(acc, partial);
        }
    }

    let record = RecordMerger::finalize(acc);
    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_complete(outcomes.len(), recovered);
    }

    PageRun {
        record,
        pages: outcomes,
        used_fallback,
    }
}

/// One audit document per physical page, sharing a single upload id.
fn page_audit(pages: &[PageChunk], outcomes: &[PageOutcome], model: &str) -> Vec<PageAuditRecord> {
    let upload_id = format!("upload_{}", Utc::now().format("%Y%m%dT%H%M%S"));
    pages
        .iter()
        .map(|page| {
            let confidence = outcomes
                .iter()
                .find(|o| o.page_num == page.page_number && o.recovered)
                .map(|o| {
                    if o.named_model {
                        Confidence::High
                    } else {
                        Confidence::Medium
                    }
                });
            PageAuditRecord {
                upload_id: upload_id.clone(),
                filename: page.filename.clone(),
                page_number: page.page_number,
                text: page.text.clone(),
                text_snippet: truncate_chars(&page.text, SNIPPET_CHARS).to_string(),
                extraction_model: model.to_string(),
                extraction_confidence: confidence,
                processed_at: page.processed_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::progress::ExtractionProgressCallback;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Replays canned responses in order and records every prompt.
    struct Scripted {
        replies: Mutex<VecDeque<Result<String, GatewayError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<&str, GatewayError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(str::to_string)).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelGateway for Scripted {
        async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GatewayError::EmptyCompletion))
        }
    }

    fn pages(texts: &[&str]) -> Vec<PageChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| PageChunk {
                text: t.to_string(),
                page_number: i + 1,
                total_pages: texts.len(),
                filename: "x1.pdf".into(),
                processed_at: Utc::now(),
            })
            .collect()
    }

    fn long(tag: &str) -> String {
        format!("{tag} {}", "datasheet text ".repeat(5))
    }

    #[tokio::test]
    async fn three_page_scenario() {
        let texts = [long("p1"), long("p2"), long("p3")];
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let gw = Scripted::new(vec![
            Ok(r#"{"model":"X1","manufacturer":"Acme"}"#),
            Ok("```json\n{\"sensor_type\":\"Pressure Sensor\",\"specifications\":{\"performance\":{\"range\":\"0-10 bar\"}}}\n```"),
            Ok("not json at all"),
        ]);
        let hints = FilenameHints::from_filename("x1.pdf");
        let run = run_pages(&pages(&texts), &hints, &gw, &ExtractionConfig::default()).await;

        assert_eq!(gw.calls(), 3);
        assert!(!run.used_fallback);
        assert_eq!(
            run.record.to_document(),
            json!({
                "model": "X1",
                "manufacturer": "Acme",
                "sensor_type": "Pressure Sensor",
                "specifications": {"performance": {"range": "0-10 bar"}}
            })
        );
        assert_eq!(run.pages[2].error, Some(PageError::Unrecoverable { page: 3 }));
        assert!(run.pages[0].named_model);
    }

    #[tokio::test]
    async fn short_pages_are_skipped_and_cap_applies() {
        let body = long("page");
        let b = body.as_str();
        let texts = ["tiny", b, b, "  ", b, b, b, b];
        let gw = Scripted::new(vec![Ok(r#"{"model":"X1"}"#); 8]);
        let hints = FilenameHints::from_filename("x1.pdf");
        let run = run_pages(&pages(&texts), &hints, &gw, &ExtractionConfig::default()).await;

        assert_eq!(gw.calls(), 5);
        let nums: Vec<usize> = run.pages.iter().map(|p| p.page_num).collect();
        assert_eq!(nums, vec![2, 3, 5, 6, 7]);
    }

    #[tokio::test]
    async fn gateway_errors_are_per_page() {
        let texts = [long("p1"), long("p2")];
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let gw = Scripted::new(vec![
            Err(GatewayError::Provider("HTTP 429".into())),
            Ok(r#"{"manufacturer":"Acme"}"#),
        ]);
        let hints = FilenameHints::from_filename("x1.pdf");
        let run = run_pages(&pages(&texts), &hints, &gw, &ExtractionConfig::default()).await;

        assert!(matches!(run.pages[0].error, Some(PageError::GatewayFailed { page: 1, .. })));
        assert!(run.pages[1].recovered);
        assert_eq!(run.record.manufacturer.as_deref(), Some("Acme"));
        assert!(!run.used_fallback);
    }

    #[tokio::test]
    async fn fallback_runs_once_when_nothing_recovered() {
        let texts = [long("p1"), long("p2")];
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let gw = Scripted::new(vec![
            Ok("sorry"),
            Ok("{broken"),
            Ok(r#"{"model":"X1","manufacturer":"Acme","sensor_type":null}"#),
        ]);
        let hints = FilenameHints::from_filename("x1.pdf");
        let run = run_pages(&pages(&texts), &hints, &gw, &ExtractionConfig::default()).await;

        assert_eq!(gw.calls(), 3);
        assert!(run.used_fallback);
        assert_eq!(run.record.model.as_deref(), Some("X1"));
        assert_eq!(run.record.manufacturer.as_deref(), Some("Acme"));
        let last = gw.prompts.lock().unwrap().last().cloned().unwrap();
        assert!(last.contains("Extract ONLY these fields"));
    }

    #[tokio::test]
    async fn progress_events_follow_the_run() {
        #[derive(Default)]
        struct Counter {
            starts: AtomicUsize,
            recovered: AtomicUsize,
            errors: AtomicUsize,
            fallbacks: AtomicUsize,
            completes: AtomicUsize,
        }
        impl ExtractionProgressCallback for Counter {
            fn on_page_start(&self, _: usize, _: usize) {
                self.starts.fetch_add(1, Ordering::SeqCst);
            }
            fn on_page_recovered(&self, _: usize, _: usize, _: usize) {
                self.recovered.fetch_add(1, Ordering::SeqCst);
            }
            fn on_page_error(&self, _: usize, _: usize, _: &str) {
                self.errors.fetch_add(1, Ordering::SeqCst);
            }
            fn on_fallback(&self) {
                self.fallbacks.fetch_add(1, Ordering::SeqCst);
            }
            fn on_extraction_complete(&self, _: usize, _: usize) {
                self.completes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let counter = Arc::new(Counter::default());
        let config = ExtractionConfig::builder()
            .progress_callback(counter.clone() as Arc<dyn ExtractionProgressCallback>)
            .build()
            .unwrap();
        let texts = [long("p1"), long("p2")];
        let texts: Vec<&str> = texts.iter().map(String::as_str).collect();
        let gw = Scripted::new(vec![Ok(r#"{"model":"X1"}"#), Ok("nope")]);
        let hints = FilenameHints::from_filename("x1.pdf");
        run_pages(&pages(&texts), &hints, &gw, &config).await;

        assert_eq!(counter.starts.load(Ordering::SeqCst), 2);
        assert_eq!(counter.recovered.load(Ordering::SeqCst), 1);
        assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
        assert_eq!(counter.fallbacks.load(Ordering::SeqCst), 0);
        assert_eq!(counter.completes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn page_audit_confidence() {
        let chunks = pages(&["a".repeat(300).as_str(), "second page", "third"]);
        let outcomes = vec![
            PageOutcome {
                page_num: 1,
                recovered: true,
                fields: 2,
                named_model: true,
                duration_ms: 1,
                error: None,
            },
            PageOutcome {
                page_num: 2,
                recovered: true,
                fields: 1,
                named_model: false,
                duration_ms: 1,
                error: None,
            },
        ];
        let audits = page_audit(&chunks, &outcomes, "m");
        assert_eq!(audits.len(), 3);
        assert!(audits.iter().all(|a| a.upload_id == audits[0].upload_id));
        assert!(audits[0].upload_id.starts_with("upload_"));
        assert_eq!(audits[0].text_snippet.chars().count(), 200);
        assert_eq!(audits[0].extraction_confidence, Some(Confidence::High));
        assert_eq!(audits[1].extraction_confidence, Some(Confidence::Medium));
        assert_eq!(audits[2].extraction_confidence, None);
    }
}
