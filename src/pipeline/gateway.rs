//! Model gateway: send one prompt, get raw completion text back.
//!
//! The pipeline only ever needs "prompt in, text out", so that is the whole
//! [`ModelGateway`] surface. Tests script responses with an in-process
//! implementation; production wraps an `edgequake_llm` provider in
//! [`LlmGateway`].
//!
//! ## No retries
//!
//! Each eligible page is sent at most once. A failed call costs that page's
//! contribution and nothing else, so the gateway reports the error and the
//! pipeline moves on.

use crate::config::{ExtractionConfig, DEFAULT_MODEL};
use crate::error::{DatasheetError, GatewayError};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Sends a prompt to a language model and returns the raw completion.
///
/// The output is untrusted free text. Implementations must not retry.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Identifier of the model answering the prompts, when known.
    ///
    /// Recorded as the record's `classification_model`. `None` falls back
    /// to the configured model.
    fn model_id(&self) -> Option<&str> {
        None
    }
}

/// [`ModelGateway`] backed by an `edgequake_llm` chat provider.
///
/// Every call sends the system prompt followed by the page prompt as a
/// single user turn.
pub struct LlmGateway {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmGateway {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
        }
    }
}

#[async_trait]
impl ModelGateway for LlmGateway {
    async fn complete(&self, prompt: &str) -> Result<String, GatewayError> {
        let start = Instant::now();
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(prompt),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| GatewayError::Provider(e.to_string()))?;

        debug!(
            "{} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(GatewayError::EmptyCompletion);
        }
        Ok(response.content)
    }

    fn model_id(&self) -> Option<&str> {
        Some(self.provider.model())
    }
}

/// Build `CompletionOptions` from the extraction config.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DatasheetError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DatasheetError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the gateway, from most-specific to least-specific:
///
/// 1. **Pre-built gateway** (`config.gateway`) — used as-is.
/// 2. **Named provider + model** (`config.provider_name`).
/// 3. **Environment provider** (`EDGEQUAKE_LLM_PROVIDER`), with the
///    configured model, else `EDGEQUAKE_MODEL`.
/// 4. **OpenRouter** when `OPENROUTER_API_KEY` is set, with the configured
///    model or [`DEFAULT_MODEL`].
/// 5. **Full auto-detection** (`ProviderFactory::from_env`), re-created with
///    the configured model when one is set.
///
/// A configured model always wins over `EDGEQUAKE_MODEL`.
pub fn resolve_gateway(config: &ExtractionConfig) -> Result<Arc<dyn ModelGateway>, DatasheetError> {
    if let Some(ref gateway) = config.gateway {
        return Ok(Arc::clone(gateway));
    }

    let provider = resolve_provider(config)?;
    debug!("Using provider {} with model {}", provider.name(), provider.model());
    Ok(Arc::new(LlmGateway::new(provider, config)))
}

/// Provider and model named by the environment, the configured model taking
/// precedence over `EDGEQUAKE_MODEL`.
fn env_choice(
    config: &ExtractionConfig,
    env_provider: Option<String>,
    env_model: Option<String>,
) -> Option<(String, String)> {
    let provider = env_provider.filter(|p| !p.is_empty())?;
    let model = config
        .model
        .clone()
        .or(env_model)
        .filter(|m| !m.is_empty())?;
    Some((provider, model))
}

fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, DatasheetError> {
    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_id());
    }

    if let Some((prov, model)) = env_choice(
        config,
        std::env::var("EDGEQUAKE_LLM_PROVIDER").ok(),
        std::env::var("EDGEQUAKE_MODEL").ok(),
    ) {
        return create_provider(&prov, &model);
    }

    if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
        if !key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openrouter", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DatasheetError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENROUTER_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    match config.model.as_deref() {
        Some(model) if model != llm_provider.model() => {
            match ProviderFactory::create_llm_provider(llm_provider.name(), model) {
                Ok(provider) => Ok(provider),
                Err(e) => {
                    warn!(
                        "Cannot switch {} to model {}: {}; keeping {}",
                        llm_provider.name(),
                        model,
                        e,
                        llm_provider.model()
                    );
                    Ok(llm_provider)
                }
            }
        }
        _ => Ok(llm_provider),
    }
}
