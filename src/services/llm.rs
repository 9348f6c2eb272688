//! [`FeedbackService`] backed by a vision-capable LLM.
//!
//! The stored file is sent as an image attachment next to the instruction
//! payload. Image files go as they are. PDFs are first rasterised through a
//! [`PageCompositor`], since vision endpoints accept images only.

use super::{FeedbackResponse, FeedbackService};
use crate::config::AnalysisConfig;
use crate::error::ServiceError;
use crate::pipeline::encode;
use crate::pipeline::input::Document;
use crate::pipeline::render::PageCompositor;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

pub struct LlmFeedbackService {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    options: CompletionOptions,
    compositor: Option<PageCompositor>,
    scale: f32,
    max_pixels: u64,
}

impl LlmFeedbackService {
    /// Wrap an existing provider, taking prompt and sampling settings from
    /// `config`.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &AnalysisConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            options: build_options(config),
            compositor: None,
            scale: config.scale,
            max_pixels: config.max_composite_pixels,
        }
    }

    /// Resolve a provider from `config` and the environment.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ServiceError> {
        let provider = resolve_provider(config)?;
        info!(
            "Feedback provider resolved (model hint: {})",
            config.model.as_deref().unwrap_or(DEFAULT_MODEL)
        );
        Ok(Self::new(provider, config))
    }

    /// Rasterise PDF inputs with `compositor` before sending them.
    ///
    /// Each PDF attachment is rendered and encoded again here. Runs with
    /// `feedback_from_image` set send the already uploaded PNG instead and
    /// skip that work.
    pub fn with_compositor(mut self, compositor: PageCompositor) -> Self {
        self.compositor = Some(compositor.with_max_pixels(self.max_pixels));
        self
    }

    async fn attachment(&self, path: &str) -> Result<ImageData, ServiceError> {
        let attach_err = |reason: String| ServiceError::Attachment {
            path: path.to_string(),
            reason,
        };

        let mime = mime_for_path(Path::new(path))
            .ok_or_else(|| attach_err("unsupported file type".into()))?;
        let bytes = tokio::fs::read(path).await.map_err(|source| ServiceError::Io {
            path: path.into(),
            source,
        })?;

        if mime != "application/pdf" {
            return Ok(ImageData::new(STANDARD.encode(&bytes), mime).with_detail("high"));
        }

        let compositor = self
            .compositor
            .as_ref()
            .ok_or_else(|| attach_err("PDF attachments need a page compositor".into()))?;
        let name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "resume.pdf".into());
        let composite = compositor
            .composite(&Document::new(name.clone(), bytes), self.scale)
            .await
            .map_err(|e| attach_err(e.to_string()))?;
        let artifact = encode::encode(composite, &name)
            .await
            .map_err(|e| attach_err(e.to_string()))?;

        Ok(ImageData::new(STANDARD.encode(&artifact.bytes), artifact.mime_type).with_detail("high"))
    }
}

#[async_trait]
impl FeedbackService for LlmFeedbackService {
    async fn feedback(
        &self,
        path: &str,
        instructions: &str,
    ) -> Result<Option<FeedbackResponse>, ServiceError> {
        let start = Instant::now();
        let image = self.attachment(path).await?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(instructions, vec![image]),
        ];

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ServiceError::Llm(e.to_string()))?;

        debug!(
            "Feedback: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            warn!("Feedback provider returned an empty message");
            return Ok(None);
        }
        Ok(Some(FeedbackResponse::text(response.content)))
    }
}

/// MIME type for an attachable file, by extension.
fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "pdf" => Some("application/pdf"),
        _ => None,
    }
}

fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ServiceError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ServiceError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, most specific first:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` with `config.model`.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. OpenAI when `OPENAI_API_KEY` is set.
/// 5. Whatever [`ProviderFactory::from_env`] detects.
fn resolve_provider(config: &AnalysisConfig) -> Result<Arc<dyn LLMProvider>, ServiceError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_provider("openai", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ServiceError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}
