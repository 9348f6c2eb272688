//! # resume-scan
//!
//! Turn a résumé PDF into one stacked image, ask a vision LLM to review it
//! against a job description, and persist a structured score report.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload    store the original document
//!  ├─ 2. Convert   rasterise every page via pdfium and stack them (spawn_blocking)
//!  ├─ 3. Upload    store the composite PNG
//!  ├─ 4. Draft     persist the record under resume:<id> with empty feedback
//!  ├─ 5. Feedback  ask the feedback service to review the stored résumé
//!  ├─ 6. Parse     pull the JSON report out of the model's text
//!  └─ 7. Persist   overwrite the record with the parsed feedback
//! ```
//!
//! Each stage is bounded and runs once; the first failure ends the run with
//! a fixed, stage-specific message (see [`analyze::Stage`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resume_scan::{
//!     AnalysisConfig, AnalysisOrchestrator, Document, EngineLoader, EngineLocation,
//!     FileKvStore, JobContext, LlmFeedbackService, LocalStorage, PageCompositor,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::default();
//!     let compositor = PageCompositor::new(Arc::new(EngineLoader::pdfium(EngineLocation::from_env())));
//!     let feedback = LlmFeedbackService::from_config(&config)?.with_compositor(compositor.clone());
//!
//!     let orchestrator = AnalysisOrchestrator::new(
//!         Arc::new(LocalStorage::new("data/files")),
//!         Arc::new(FileKvStore::new("data/kv")),
//!         Arc::new(feedback),
//!         compositor,
//!         config,
//!     );
//!
//!     let job = JobContext {
//!         company_name: "Acme".into(),
//!         job_title: "Backend Engineer".into(),
//!         job_description: "Rust, Postgres, on-call".into(),
//!     };
//!     let record = orchestrator.analyze(&Document::from_path("cv.pdf").await?, &job).await?;
//!     println!("{}", record.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `resume-scan` binary (clap + indicatif + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod report;
pub mod services;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{AnalysisOrchestrator, JobContext, RunState, Stage};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, EngineLocation};
pub use error::{
    AnalysisError, ConfigError, ConversionError, EncodeError, InputError, LoadError, ParseError,
    ServiceError, StageError,
};
pub use pipeline::encode::{artifact_name, encode, encode_composite, EncodedArtifact};
pub use pipeline::engine::{EngineHandle, EngineLoader, PageSource, PdfiumEngine, RenderEngine, Viewport};
pub use pipeline::extract::extract_feedback;
pub use pipeline::input::{resolve_document, Document};
pub use pipeline::render::{CompositeImage, PageCompositor, RenderedPage, DEFAULT_MAX_PIXELS};
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use report::{AnalysisRecord, Category, Feedback, FeedbackState, ScoreBand, Tip, TipKind};
pub use services::{
    FeedbackResponse, FeedbackService, FileKvStore, KeyValueStore, LlmFeedbackService,
    LocalStorage, MemoryKvStore, MessageContent, StorageService, UploadResponse, UploadedRef,
};
