//! Configuration types for a résumé analysis run.
//!
//! Every knob lives in [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. One struct is easy to share across concurrent
//! runs and easy to print when two runs disagree.
//!
//! Where the pdfium library lives is a separate concern, described by
//! [`EngineLocation`] and consumed once by the engine loader.

use crate::error::ConfigError;
use crate::pipeline::render::DEFAULT_MAX_PIXELS;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for an analysis run.
///
/// # Example
/// ```rust
/// use resume_scan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .scale(2.0)
///     .feedback_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.feedback_timeout_secs, 90);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Viewport scale used when rasterising pages. Range: 0.5–4.0. Default: 2.0.
    ///
    /// At 2.0 a US-letter page becomes 1224 × 1584 px, enough for a vision
    /// model to read 9 pt body text.
    pub scale: f32,

    /// Cap on the composite's area (width × height) in pixels.
    /// Default: 100 000 000.
    ///
    /// Checked before the surface is allocated, so a long or oversized
    /// document fails the conversion instead of exhausting memory.
    pub max_composite_pixels: u64,

    /// Upper bound on each storage upload, in seconds. Default: 120.
    pub upload_timeout_secs: u64,

    /// Upper bound on the feedback request, in seconds. Default: 180.
    pub feedback_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Send the uploaded composite image path to the feedback service
    /// instead of the original résumé path. Default: false.
    pub feedback_from_image: bool,

    /// LLM model identifier, e.g. "gpt-4.1-mini". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the feedback completion. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 4096.
    ///
    /// A full report with four categories and a dozen tips runs to roughly
    /// 1 500 tokens; the headroom avoids truncated JSON.
    pub max_tokens: usize,

    /// Custom system prompt for the feedback request. If None, uses built-in default.
    pub system_prompt: Option<String>,

    /// Receives status strings and stage transitions.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            max_composite_pixels: DEFAULT_MAX_PIXELS,
            upload_timeout_secs: 120,
            feedback_timeout_secs: 180,
            download_timeout_secs: 120,
            feedback_from_image: false,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("scale", &self.scale)
            .field("max_composite_pixels", &self.max_composite_pixels)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("feedback_timeout_secs", &self.feedback_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("feedback_from_image", &self.feedback_from_image)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    /// Minimum 1 000 000, enough for one page at the smallest scale.
    pub fn max_composite_pixels(mut self, px: u64) -> Self {
        self.config.max_composite_pixels = px.max(1_000_000);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs;
        self
    }

    pub fn feedback_timeout_secs(mut self, secs: u64) -> Self {
        self.config.feedback_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn feedback_from_image(mut self, v: bool) -> Self {
        self.config.feedback_from_image = v;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
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

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ConfigError> {
        let c = &self.config;
        if !c.scale.is_finite() || c.scale < 0.5 || c.scale > 4.0 {
            return Err(ConfigError(format!(
                "Scale must be 0.5–4.0, got {}",
                c.scale
            )));
        }
        if c.upload_timeout_secs == 0 || c.feedback_timeout_secs == 0 {
            return Err(ConfigError("Timeouts must be ≥ 1 second".into()));
        }
        Ok(self.config)
    }
}

/// Where to find the pdfium shared library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EngineLocation {
    /// Search the system library path. (default)
    #[default]
    System,
    /// A directory holding the platform library (`libpdfium.so`,
    /// `libpdfium.dylib` or `pdfium.dll`).
    Directory(PathBuf),
}

impl EngineLocation {
    /// Read `PDFIUM_LIB_PATH`; fall back to the system library.
    pub fn from_env() -> Self {
        match std::env::var_os("PDFIUM_LIB_PATH") {
            Some(dir) if !dir.is_empty() => EngineLocation::Directory(PathBuf::from(dir)),
            _ => EngineLocation::System,
        }
    }
}
