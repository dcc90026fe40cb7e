//! Configuration types for datasheet extraction.
//!
//! All pipeline behaviour is controlled through [`ExtractionConfig`], built
//! via its [`ExtractionConfigBuilder`]. Every threshold the pipeline applies
//! (page eligibility, truncation, the page cap, the fallback budget, the
//! score-based unit table) lives here so two runs can be compared by diffing
//! their configs.

use crate::error::DatasheetError;
use crate::pipeline::gateway::ModelGateway;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Model identifier used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.1-8b-instruct";

/// Unit substrings that earn the score-based bonus.
pub const DEFAULT_UNIT_TOKENS: [&str; 8] = ["v", "a", "w", "hz", "°c", "mm", "g", "%"];

/// Configuration for a datasheet extraction run.
///
/// # Example
/// ```rust
/// use sensor_datasheet::{ExtractionConfig, MergePolicy};
///
/// let config = ExtractionConfig::builder()
///     .model("gpt-4.1-nano")
///     .merge_policy(MergePolicy::FirstNonNullWins)
///     .max_pages(3)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 3);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// LLM model identifier. If None, [`DEFAULT_MODEL`] is used.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openrouter", "openai", "ollama").
    /// If None along with `gateway`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed gateway. Takes precedence over `provider_name`.
    pub gateway: Option<Arc<dyn ModelGateway>>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per call. Default: 2048.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Conflict resolution between pages. Default: [`MergePolicy::ScoreBased`].
    pub merge_policy: MergePolicy,

    /// Substrings (matched against the lowercased value) that earn the
    /// score-based unit bonus.
    pub unit_tokens: Vec<String>,

    /// Pages whose trimmed text is shorter than this are skipped. Default: 50.
    pub min_page_chars: usize,

    /// Page text is truncated to this many characters before prompting. Default: 8000.
    pub max_page_chars: usize,

    /// Only the first N eligible pages are sent to the model. Default: 5.
    pub max_pages: usize,

    /// Number of leading pages combined for the fallback prompt. Default: 2.
    pub fallback_pages: usize,

    /// Combined fallback text is truncated to this many characters. Default: 5000.
    pub fallback_max_chars: usize,

    /// Persist one raw-text audit document per page. Default: false.
    pub audit_pages: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            gateway: None,
            temperature: 0.1,
            max_tokens: 2048,
            system_prompt: None,
            merge_policy: MergePolicy::default(),
            unit_tokens: DEFAULT_UNIT_TOKENS.iter().map(|s| s.to_string()).collect(),
            min_page_chars: 50,
            max_page_chars: 8000,
            max_pages: 5,
            fallback_pages: 2,
            fallback_max_chars: 5000,
            audit_pages: false,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("gateway", &self.gateway.as_ref().map(|_| "<dyn ModelGateway>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("merge_policy", &self.merge_policy)
            .field("unit_tokens", &self.unit_tokens)
            .field("min_page_chars", &self.min_page_chars)
            .field("max_page_chars", &self.max_page_chars)
            .field("max_pages", &self.max_pages)
            .field("fallback_pages", &self.fallback_pages)
            .field("fallback_max_chars", &self.fallback_max_chars)
            .field("audit_pages", &self.audit_pages)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model identifier this run will use.
    pub fn model_id(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn ModelGateway>) -> Self {
        self.config.gateway = Some(gateway);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.config.merge_policy = policy;
        self
    }

    /// Replace the unit-bonus table. Tokens are lowercased.
    pub fn unit_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.unit_tokens = tokens
            .into_iter()
            .map(|t| t.into().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn min_page_chars(mut self, n: usize) -> Self {
        self.config.min_page_chars = n;
        self
    }

    pub fn max_page_chars(mut self, n: usize) -> Self {
        self.config.max_page_chars = n;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn fallback_pages(mut self, n: usize) -> Self {
        self.config.fallback_pages = n;
        self
    }

    pub fn fallback_max_chars(mut self, n: usize) -> Self {
        self.config.fallback_max_chars = n;
        self
    }

    pub fn audit_pages(mut self, v: bool) -> Self {
        self.config.audit_pages = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, DatasheetError> {
        let c = &self.config;
        if c.max_pages == 0 {
            return Err(DatasheetError::InvalidConfig(
                "max_pages must be ≥ 1".into(),
            ));
        }
        if c.max_page_chars == 0 || c.fallback_max_chars == 0 {
            return Err(DatasheetError::InvalidConfig(
                "character limits must be ≥ 1".into(),
            ));
        }
        if let Some(ref m) = c.model {
            if m.trim().is_empty() {
                return Err(DatasheetError::InvalidConfig(
                    "model identifier must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How conflicting values from different pages are reconciled.
///
/// | Policy | Leaf conflict | `extra_fields` conflict |
/// |--------|---------------|-------------------------|
/// | `FirstNonNullWins` | earliest page wins | earliest page wins |
/// | `ScoreBased` | higher detail score wins, ties keep earliest | distinct values collected in first-seen order |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    FirstNonNullWins,
    #[default]
    ScoreBased,
}
