//! Prompts for LLM-based datasheet extraction.
//!
//! Every prompt the pipeline sends is built here so that a prompt change is
//! a one-file edit and unit tests can inspect the exact text without a
//! model. Callers can override the system message via
//! [`crate::config::ExtractionConfig::system_prompt`]; the per-page user
//! prompts are always built by [`page_prompt`] and [`fallback_prompt`].

use crate::pipeline::hints::FilenameHints;
use crate::pipeline::load::PageChunk;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Default system message sent with every extraction call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a specialised assistant that extracts structured data from sensor datasheets. You answer with a single JSON object and nothing else.";

/// Per-page extraction prompt. Placeholders are filled by [`page_prompt`].
pub const PAGE_PROMPT_TEMPLATE: &str = r#"Analyse the following text from a sensor datasheet and extract the key information as JSON.

Follow these rules precisely:

1. FIELDS
   - sensor_type: the kind of sensor (e.g. "Temperature Sensor", "Light Sensor", "Pressure Sensor")
   - manufacturer: the company that makes the sensor
   - model: the model number or name of the sensor
   - specifications: an object with these nested objects
     - performance: e.g. range, sensitivity, accuracy, resolution, response_time
     - electrical: e.g. power_supply, current_consumption, output_type, interface
     - mechanical: e.g. dimensions, weight, mounting_options, package_type
     - environmental: e.g. operating_temp, storage_temp, humidity_range, protection_rating
   - extra_fields: an object for other important information that does not fit above

2. VALUES
   - Copy each value exactly as written in the text, including units
   - Use null for anything not stated on this page
   - Do not guess

3. CONTEXT
   - The filename suggests the model is: {model_hint}
   - The filename suggests this may be a: {sensor_type_hint}
   - Treat both as hints only; the page text takes precedence

4. OUTPUT FORMAT
   - Output ONLY one valid JSON object
   - Do NOT add commentary or explanations

Text from page {page_num} of {total_pages}:
{page_text}"#;

/// Reduced three-field prompt used when no page yielded a record.
pub const FALLBACK_PROMPT_TEMPLATE: &str = r#"Extract ONLY these fields from the sensor datasheet text below:
- model: the model number or name
- manufacturer: the company name
- sensor_type: what kind of sensor this is (light, temperature, pressure, ...)

Use null for anything not found. Output ONLY one valid JSON object with these three fields.

Text:
{text}"#;

/// Build the extraction prompt for one eligible page.
///
/// The page text is truncated to `max_chars` characters.
pub fn page_prompt(chunk: &PageChunk, hints: &FilenameHints, max_chars: usize) -> String {
    let page_num = chunk.page_number.to_string();
    let total_pages = chunk.total_pages.to_string();
    fill(
        PAGE_PROMPT_TEMPLATE,
        &[
            ("model_hint", hints.model_hint.as_str()),
            ("sensor_type_hint", hints.sensor_type_hint.unwrap_or("sensor")),
            ("page_num", page_num.as_str()),
            ("total_pages", total_pages.as_str()),
            ("page_text", truncate_chars(&chunk.text, max_chars)),
        ],
    )
}

/// Build the reduced fallback prompt from already-combined text.
pub fn fallback_prompt(text: &str) -> String {
    fill(FALLBACK_PROMPT_TEMPLATE, &[("text", text)])
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Substitute `{name}` placeholders in a single pass. Inserted values are
/// never scanned again; unknown placeholders are left as they are.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| value.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Longest prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn chunk(text: &str) -> PageChunk {
        PageChunk {
            text: text.to_string(),
            page_number: 2,
            total_pages: 7,
            filename: "TEMT6000_datasheet.pdf".into(),
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn page_prompt_embeds_hints_and_position() {
        let hints = FilenameHints::from_filename("TEMT6000_datasheet.pdf");
        let p = page_prompt(&chunk("Ambient light sensor, 5 V supply"), &hints, 8000);
        assert!(p.contains("TEMT6000 datasheet"));
        assert!(p.contains("may be a: Light Sensor"));
        assert!(p.contains("page 2 of 7"));
        assert!(p.contains("Ambient light sensor, 5 V supply"));
        assert!(!p.contains("{page_text}"));
    }

    #[test]
    fn page_prompt_defaults_sensor_hint() {
        let hints = FilenameHints::from_filename("X1.pdf");
        let p = page_prompt(&chunk("some text"), &hints, 8000);
        assert!(p.contains("may be a: sensor"));
    }

    #[test]
    fn page_prompt_truncates_text() {
        let hints = FilenameHints::from_filename("X1.pdf");
        let long = "é".repeat(9000);
        let p = page_prompt(&chunk(&long), &hints, 8000);
        assert_eq!(p.matches('é').count(), 8000);
    }

    #[test]
    fn placeholders_in_filenames_and_text_stay_literal() {
        let hints = FilenameHints::from_filename("{page_num}_{sensor_type_hint}.pdf");
        let p = page_prompt(&chunk("Range {total_pages} to {model_hint}"), &hints, 8000);
        assert!(p.contains("{page_num} {sensor_type_hint}"), "got: {p}");
        assert!(p.contains("Range {total_pages} to {model_hint}"));
        assert!(p.contains("page 2 of 7"));

        let p = fallback_prompt("literal {text} stays");
        assert!(p.ends_with("literal {text} stays"));
    }

    #[test]
    fn fallback_prompt_names_three_fields() {
        let p = fallback_prompt("Acme X1 pressure transducer");
        for field in ["model", "manufacturer", "sensor_type"] {
            assert!(p.contains(field), "missing {field}");
        }
        assert!(!p.contains("specifications"));
        assert!(p.ends_with("Acme X1 pressure transducer"));
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("°C°C", 2), "°C");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
