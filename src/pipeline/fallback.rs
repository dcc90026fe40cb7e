//! Reduced-scope extraction when no page yielded a record.
//!
//! The full schema is a lot to ask of a small model, and a datasheet whose
//! pages all came back unparseable usually still names its part on the first
//! page or two. The fallback asks for the three identity fields only, over
//! the leading pages' combined text, in a single call.

use crate::config::ExtractionConfig;
use crate::pipeline::gateway::ModelGateway;
use crate::pipeline::load::PageChunk;
use crate::pipeline::recover::recover;
use crate::prompts::{fallback_prompt, truncate_chars};
use crate::record::PartialRecord;
use tracing::{debug, info, warn};

/// Combined text of the leading pages, bounded by `fallback_max_chars`.
pub fn combined_text(pages: &[PageChunk], config: &ExtractionConfig) -> String {
    let joined = pages
        .iter()
        .take(config.fallback_pages)
        .map(|p| truncate_chars(&p.text, config.fallback_max_chars))
        .collect::<Vec<_>>()
        .join("\n\n");
    truncate_chars(&joined, config.fallback_max_chars).to_string()
}

/// Run the fallback call. Returns `None` when the call fails or nothing
/// useful could be recovered.
pub async fn extract_identity(
    pages: &[PageChunk],
    gateway: &dyn ModelGateway,
    config: &ExtractionConfig,
) -> Option<PartialRecord> {
    let text = combined_text(pages, config);
    if text.trim().is_empty() {
        debug!("Fallback skipped: no page text");
        return None;
    }

    info!("No page yielded data, trying reduced fallback extraction");
    let raw = match gateway.complete(&fallback_prompt(&text)).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Fallback model call failed: {}", e);
            return None;
        }
    };

    let Some(object) = recover(&raw) else {
        debug!("Fallback response not recoverable");
        return None;
    };

    let record = PartialRecord::from_object(object);
    if record.is_empty() {
        debug!("Fallback response carried no information");
        None
    } else {
        Some(record)
    }
}
