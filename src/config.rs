//! Configuration types for the pipeline and the inference engine.
//!
//! Stage behaviour is controlled through [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]; everything the engine needs lives in
//! [`EngineConfig`]. Keeping the two apart mirrors the ownership split: the
//! pipeline is constructed per run, while the engine handle is constructed
//! once and shared by every dispatch worker.

use crate::error::PipelineError;
use crate::progress::ProgressHandle;
use std::fmt;

/// Configuration for the pipeline stages.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use ocrpipe::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .dpi(175)
///     .workers(8)
///     .pages_per_batch(50)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rendering resolution in dots-per-inch. Range: 72–600. Default: 200.
    ///
    /// 200 DPI keeps small print legible to vision models while bounding
    /// image sizes; drop to ~150 for clean digital PDFs, raise for scans
    /// with tiny fonts.
    pub dpi: u32,

    /// Number of concurrent inference tasks during dispatch. Default: 4.
    ///
    /// This is the only concurrency control in the pipeline: every page is
    /// submitted up front and at most `workers` inference calls are in
    /// flight at once. The engine itself must tolerate that many
    /// simultaneous invocations.
    pub workers: usize,

    /// Maximum records per batch manifest. Default: 100.
    ///
    /// The last manifest of a run may hold fewer.
    pub pages_per_batch: usize,

    /// Optional progress callback receiving stage events.
    pub progress: Option<ProgressHandle>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            workers: 4,
            pages_per_batch: 100,
            progress: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("workers", &self.workers)
            .field("pages_per_batch", &self.pages_per_batch)
            .field("progress", &self.progress.as_ref().map(|_| "<dyn PipelineProgress>"))
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn pages_per_batch(mut self, n: usize) -> Self {
        self.config.pages_per_batch = n.max(1);
        self
    }

    pub fn progress(mut self, cb: ProgressHandle) -> Self {
        self.config.progress = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.workers == 0 {
            return Err(PipelineError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if c.pages_per_batch == 0 {
            return Err(PipelineError::InvalidConfig(
                "pages_per_batch must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Configuration for [`crate::engine::VisionLlmEngine`].
///
/// All generation knobs are fixed at engine construction; the engine handle
/// is immutable afterwards and shared across workers.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model identifier. `None` uses the provider's default vision model.
    pub model: Option<String>,

    /// Provider name (e.g. "openai", "ollama"). `None` auto-detects from
    /// the environment.
    pub provider_name: Option<String>,

    /// Maximum tokens the model may generate per page. Default: 4096.
    ///
    /// Dense pages (tables, forms) routinely exceed 2 000 output tokens;
    /// setting this too low truncates the transcription mid-sentence.
    pub max_new_tokens: usize,

    /// Enable sampling. Default: false (greedy decoding).
    ///
    /// Transcription wants the model faithful to the pixels, so greedy is
    /// the default; `temperature`/`top_p` apply only when this is on.
    pub do_sample: bool,

    /// Sampling temperature, used only when `do_sample` is true. Default: 1.0.
    pub temperature: f32,

    /// Nucleus-sampling threshold, used only when `do_sample` is true.
    /// Default: 1.0 (disabled).
    pub top_p: f32,

    /// Repetition penalty. Default: 1.0 (disabled).
    pub repetition_penalty: f32,

    /// Extraction instruction. `None` uses
    /// [`crate::prompts::DEFAULT_PROMPT`].
    pub prompt: Option<String>,

    /// System message sent before the instruction.
    pub system_message: String,

    /// Strip `<|…|>` special-token markers from engine output. Default: true.
    pub skip_special_tokens: bool,

    /// Remove stray spaces before punctuation in engine output. Default: true.
    pub clean_up_spaces: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            max_new_tokens: 4096,
            do_sample: false,
            temperature: 1.0,
            top_p: 1.0,
            repetition_penalty: 1.0,
            prompt: None,
            system_message: crate::prompts::DEFAULT_SYSTEM_MESSAGE.to_string(),
            skip_special_tokens: true,
            clean_up_spaces: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = PipelineConfig::builder()
            .dpi(10_000)
            .workers(0)
            .pages_per_batch(0)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 600);
        assert_eq!(config.workers, 1);
        assert_eq!(config.pages_per_batch, 1);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.dpi, 200);
        assert_eq!(config.workers, 4);
        assert_eq!(config.pages_per_batch, 100);

        let engine = EngineConfig::default();
        assert_eq!(engine.max_new_tokens, 4096);
        assert!(!engine.do_sample);
        assert!(engine.skip_special_tokens);
        assert!(engine.clean_up_spaces);
    }
}
