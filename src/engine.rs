//! The inference-engine seam: a trait the dispatcher calls, plus the
//! vision-LLM implementation used in production.
//!
//! The engine is an **explicit handle**: [`VisionLlmEngine::new`] resolves
//! the provider eagerly, so a misconfigured environment fails at
//! construction rather than on the first page deep into a run. The handle
//! is then shared by every dispatch worker as an `Arc<dyn OcrEngine>`;
//! whether concurrent calls are serialised internally or truly parallel is
//! the provider's concern.
//!
//! [`OcrEngine`] is the seam tests mock: the dispatcher never knows which
//! implementation it is driving.

use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::prompts::DEFAULT_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Default vision model when neither config nor environment names one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Errors an engine implementation may return for a single page.
///
/// These are always caught by the dispatcher and recorded as per-page
/// failures; they never abort a run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The inference request failed (network, API, or model error).
    #[error("inference request failed: {0}")]
    Api(String),

    /// The engine rejected the image payload.
    #[error("image rejected: {0}")]
    BadImage(String),
}

/// One page in, extracted text out.
///
/// Implementations must tolerate up to `workers` concurrent invocations on
/// one shared instance.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Extract the text of one page from its raw image bytes.
    async fn extract_text(&self, image: &[u8]) -> Result<String, EngineError>;
}

/// Production engine: sends each page image to a vision LLM provider.
pub struct VisionLlmEngine {
    provider: Arc<dyn LLMProvider>,
    prompt: String,
    system_message: String,
    max_new_tokens: usize,
    do_sample: bool,
    temperature: f32,
    skip_special_tokens: bool,
    clean_up_spaces: bool,
}

impl VisionLlmEngine {
    /// Construct the engine, resolving the provider immediately.
    ///
    /// Resolution order mirrors how much the caller chose to specify:
    /// an explicit provider name (plus optional model), the
    /// `EDGEQUAKE_LLM_PROVIDER`/`EDGEQUAKE_MODEL` environment pair, then
    /// full auto-detection from known API-key variables.
    pub fn new(config: EngineConfig) -> Result<Self, PipelineError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::with_provider(provider, config))
    }

    /// Construct the engine around a caller-supplied provider.
    ///
    /// Useful in tests and when the host application already manages
    /// provider construction (custom middleware, shared clients).
    pub fn with_provider(provider: Arc<dyn LLMProvider>, config: EngineConfig) -> Self {
        if config.do_sample && (config.top_p != 1.0 || config.repetition_penalty != 1.0) {
            // The provider abstraction forwards temperature and max tokens
            // only; refusing silently would hide the limitation mid-run.
            warn!(
                top_p = config.top_p as f64,
                repetition_penalty = config.repetition_penalty as f64,
                "provider interface does not expose top_p/repetition_penalty; values ignored"
            );
        }

        Self {
            provider,
            prompt: config.prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            system_message: config.system_message,
            max_new_tokens: config.max_new_tokens,
            do_sample: config.do_sample,
            temperature: config.temperature,
            skip_special_tokens: config.skip_special_tokens,
            clean_up_spaces: config.clean_up_spaces,
        }
    }

    fn completion_options(&self) -> CompletionOptions {
        CompletionOptions {
            // Greedy decoding unless sampling was requested; transcription
            // wants the model faithful to the pixels.
            temperature: Some(if self.do_sample { self.temperature } else { 0.0 }),
            max_tokens: Some(self.max_new_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl OcrEngine for VisionLlmEngine {
    async fn extract_text(&self, image: &[u8]) -> Result<String, EngineError> {
        if image.is_empty() {
            return Err(EngineError::BadImage("empty image payload".into()));
        }

        let b64 = STANDARD.encode(image);
        let image_data = ImageData::new(b64, "image/png").with_detail("high");

        let messages = vec![
            ChatMessage::system(self.system_message.as_str()),
            ChatMessage::user_with_images(self.prompt.as_str(), vec![image_data]),
        ];

        let options = self.completion_options();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| EngineError::Api(e.to_string()))?;

        debug!(
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            "page transcribed"
        );

        Ok(tidy_output(
            &response.content,
            self.skip_special_tokens,
            self.clean_up_spaces,
        ))
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PipelineError::EngineNotConfigured {
            hint: format!("Provider '{provider_name}' could not be created: {e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
fn resolve_provider(config: &EngineConfig) -> Result<Arc<dyn LLMProvider>, PipelineError> {
    // 1) Provider name (+ optional model)
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    // 2) Environment pair set at the execution-environment level
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // 3) Full auto-detection from known API-key variables
    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| PipelineError::EngineNotConfigured {
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass an explicit provider.\n\
                 Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

// ── Output cleanup ───────────────────────────────────────────────────────

/// Chat-template marker tokens some models leak into their output,
/// e.g. `<|im_end|>`.
static SPECIAL_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<\|[A-Za-z0-9_./-]+\|>").expect("valid special-token regex"));

/// Stray whitespace before closing punctuation, a common detokenisation
/// artefact (`word ,` / `sentence .`).
static SPACE_BEFORE_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+([,.!?;:])").expect("valid punctuation regex"));

/// Apply the configured decode-cleanup passes to raw engine output.
fn tidy_output(text: &str, skip_special_tokens: bool, clean_up_spaces: bool) -> String {
    let mut out = if skip_special_tokens {
        SPECIAL_TOKEN_RE.replace_all(text, "").into_owned()
    } else {
        text.to_string()
    };

    if clean_up_spaces {
        out = SPACE_BEFORE_PUNCT_RE.replace_all(&out, "$1").into_owned();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_special_tokens_when_enabled() {
        let raw = "Invoice total: 42<|im_end|>";
        assert_eq!(tidy_output(raw, true, false), "Invoice total: 42");
        assert_eq!(tidy_output(raw, false, false), raw);
    }

    #[test]
    fn cleans_spaces_before_punctuation_when_enabled() {
        let raw = "Hello , world . Done";
        assert_eq!(tidy_output(raw, false, true), "Hello, world. Done");
        assert_eq!(tidy_output(raw, false, false), raw);
    }

    #[test]
    fn cleanup_passes_compose() {
        let raw = "Line one .<|endoftext|> tail";
        assert_eq!(tidy_output(raw, true, true), "Line one. tail");
    }

    #[test]
    fn cleanup_leaves_ordinary_markup_alone() {
        let raw = "<table><tr><td>1</td></tr></table>";
        assert_eq!(tidy_output(raw, true, true), raw);
    }
}
