//! The analysis run: one résumé in, one persisted feedback record out.
//!
//! A run walks a fixed sequence of [`Stage`]s and stops at the first one
//! that fails:
//!
//! ```text
//! Idle → UploadingResume → ConvertingImage → UploadingImage → PersistingDraft
//!      → AwaitingFeedback → ParsingFeedback → PersistingFinal → Done
//! ```
//!
//! Before each stage the run emits its status line through the configured
//! [`crate::progress::AnalysisProgressCallback`]. A failure emits the
//! stage's fixed user-facing message and is returned as [`AnalysisError`].
//!
//! The draft record is written before the feedback request, so a run that
//! fails later still leaves an inspectable record with empty feedback.
//! No stage is retried. Every collaborator call is bounded by a timeout from
//! [`AnalysisConfig`]; rendering is not, since it cannot be cancelled once
//! it is running on the blocking pool.

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, StageError};
use crate::pipeline::encode;
use crate::pipeline::extract::extract_feedback;
use crate::pipeline::input::Document;
use crate::pipeline::render::PageCompositor;
use crate::prompts::prepare_instructions;
use crate::report::{AnalysisRecord, FeedbackState};
use crate::services::{
    normalize_content, FeedbackService, KeyValueStore, StorageService, UploadFile, UploadedRef,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status emitted once a run completes.
pub const SUCCESS_STATUS: &str = "Resume analyzed successfully!";

/// One step of an analysis run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    UploadingResume,
    ConvertingImage,
    UploadingImage,
    PersistingDraft,
    AwaitingFeedback,
    ParsingFeedback,
    PersistingFinal,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::UploadingResume,
        Stage::ConvertingImage,
        Stage::UploadingImage,
        Stage::PersistingDraft,
        Stage::AwaitingFeedback,
        Stage::ParsingFeedback,
        Stage::PersistingFinal,
    ];

    /// Status line emitted before the stage starts.
    pub fn status(self) -> &'static str {
        match self {
            Stage::UploadingResume => "Uploading file...",
            Stage::ConvertingImage => "Converting to image...",
            Stage::UploadingImage => "Uploading image...",
            Stage::PersistingDraft => "Preparing data...",
            Stage::AwaitingFeedback => "Analyzing resume...",
            Stage::ParsingFeedback => "Parsing analysis results...",
            Stage::PersistingFinal => "Saving analysis...",
        }
    }

    /// User-facing message when the stage fails.
    pub fn failure_message(self) -> &'static str {
        match self {
            Stage::UploadingResume => "Error uploading file",
            Stage::ConvertingImage => "Error converting to image",
            Stage::UploadingImage => "Error uploading image",
            Stage::PersistingDraft | Stage::PersistingFinal => "Error saving analysis",
            Stage::AwaitingFeedback => "Error: Failed to analyze resume",
            Stage::ParsingFeedback => "Error: Failed to parse analysis results",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Stage::UploadingResume => "uploading resume",
            Stage::ConvertingImage => "converting image",
            Stage::UploadingImage => "uploading image",
            Stage::PersistingDraft => "persisting draft",
            Stage::AwaitingFeedback => "awaiting feedback",
            Stage::ParsingFeedback => "parsing feedback",
            Stage::PersistingFinal => "persisting final",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running(Stage),
    Done,
    Failed { stage: Stage, message: &'static str },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

impl AnalysisError {
    /// The terminal state this error represents.
    pub fn state(&self) -> RunState {
        RunState::Failed {
            stage: self.stage,
            message: self.message,
        }
    }
}

/// Job details the résumé is judged against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobContext {
    pub company_name: String,
    pub job_title: String,
    pub job_description: String,
}

/// Sequences one analysis run over the injected collaborators.
///
/// Cheap to share: independent runs may execute concurrently on one
/// orchestrator and only share the compositor's engine handle.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    storage: Arc<dyn StorageService>,
    kv: Arc<dyn KeyValueStore>,
    feedback: Arc<dyn FeedbackService>,
    compositor: PageCompositor,
    config: AnalysisConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        storage: Arc<dyn StorageService>,
        kv: Arc<dyn KeyValueStore>,
        feedback: Arc<dyn FeedbackService>,
        compositor: PageCompositor,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            storage,
            kv,
            feedback,
            compositor: compositor.with_max_pixels(config.max_composite_pixels),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run every stage for `document` and return the final record.
    pub async fn analyze(
        &self,
        document: &Document,
        job: &JobContext,
    ) -> Result<AnalysisRecord, AnalysisError> {
        let mut run = Run::new(&self.config);
        let upload_secs = self.config.upload_timeout_secs;

        run.enter(Stage::UploadingResume);
        let resume = self
            .upload(UploadFile::from(document))
            .await
            .map_err(|e| run.fail(Stage::UploadingResume, e))?;

        run.enter(Stage::ConvertingImage);
        let artifact = async {
            let composite = self.compositor.composite(document, self.config.scale).await?;
            Ok::<_, StageError>(encode::encode(composite, &document.name).await?)
        }
        .await
        .map_err(|e| run.fail(Stage::ConvertingImage, e))?;

        run.enter(Stage::UploadingImage);
        let image = self
            .upload(UploadFile::from(&artifact))
            .await
            .map_err(|e| run.fail(Stage::UploadingImage, e))?;

        run.enter(Stage::PersistingDraft);
        let id = Uuid::new_v4().to_string();
        run.run_id = Some(id.clone());
        let mut record = AnalysisRecord {
            id,
            resume_path: resume.path,
            image_path: image.path,
            company_name: job.company_name.clone(),
            job_title: job.job_title.clone(),
            job_description: job.job_description.clone(),
            feedback: FeedbackState::Empty,
        };
        self.persist(&record, upload_secs)
            .await
            .map_err(|e| run.fail(Stage::PersistingDraft, e))?;

        run.enter(Stage::AwaitingFeedback);
        let text = self
            .request_feedback(&record, job)
            .await
            .map_err(|e| run.fail(Stage::AwaitingFeedback, e))?;

        run.enter(Stage::ParsingFeedback);
        let feedback = extract_feedback(&text).map_err(|e| run.fail(Stage::ParsingFeedback, e.into()))?;

        run.enter(Stage::PersistingFinal);
        record.feedback = FeedbackState::Ready(feedback);
        self.persist(&record, upload_secs)
            .await
            .map_err(|e| run.fail(Stage::PersistingFinal, e))?;

        run.complete(&record);
        Ok(record)
    }

    async fn upload(&self, file: UploadFile) -> Result<UploadedRef, StageError> {
        let response = bounded(
            self.config.upload_timeout_secs,
            self.storage.upload(vec![file]),
        )
        .await?;
        response
            .and_then(|r| r.first())
            .ok_or(StageError::UploadFailure)
    }

    async fn persist(&self, record: &AnalysisRecord, secs: u64) -> Result<(), StageError> {
        let payload = serde_json::to_string(record).map_err(crate::error::ServiceError::from)?;
        bounded(secs, self.kv.set(&record.key(), &payload)).await
    }

    async fn request_feedback(
        &self,
        record: &AnalysisRecord,
        job: &JobContext,
    ) -> Result<String, StageError> {
        let path = if self.config.feedback_from_image {
            &record.image_path
        } else {
            &record.resume_path
        };
        let instructions = prepare_instructions(&job.job_title, &job.job_description);

        let response = bounded(
            self.config.feedback_timeout_secs,
            self.feedback.feedback(path, &instructions),
        )
        .await?
        .ok_or(StageError::EmptyResponse)?;

        normalize_content(&response.message.content)
            .map(str::to_owned)
            .ok_or(StageError::EmptyResponse)
    }
}

/// Await `fut` for at most `secs` seconds.
async fn bounded<T, E>(secs: u64, fut: impl Future<Output = Result<T, E>>) -> Result<T, StageError>
where
    StageError: From<E>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result.map_err(StageError::from),
        Err(_) => Err(StageError::Timeout { secs }),
    }
}

/// Per-run bookkeeping: current state, run id, and event fan-out.
struct Run<'a> {
    config: &'a AnalysisConfig,
    run_id: Option<String>,
    state: RunState,
}

impl<'a> Run<'a> {
    fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            run_id: None,
            state: RunState::Idle,
        }
    }

    fn id(&self) -> &str {
        self.run_id.as_deref().unwrap_or("-")
    }

    fn status(&self, status: &str) {
        if let Some(cb) = &self.config.progress_callback {
            cb.on_status(status);
        }
    }

    fn enter(&mut self, stage: Stage) {
        debug!(run_id = self.id(), from = ?self.state, to = %stage, "Stage transition");
        self.state = RunState::Running(stage);
        info!(run_id = self.id(), stage = %stage, "{}", stage.status());
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage_start(stage);
        }
        self.status(stage.status());
    }

    fn fail(&mut self, stage: Stage, source: StageError) -> AnalysisError {
        let message = stage.failure_message();
        warn!(run_id = self.id(), stage = %stage, error = %source, "{message}");
        self.state = RunState::Failed { stage, message };
        if let Some(cb) = &self.config.progress_callback {
            cb.on_failed(stage, message);
        }
        self.status(message);
        AnalysisError {
            stage,
            message,
            run_id: self.run_id.clone(),
            source,
        }
    }

    fn complete(&mut self, record: &AnalysisRecord) {
        self.state = RunState::Done;
        info!(run_id = self.id(), "{SUCCESS_STATUS}");
        self.status(SUCCESS_STATUS);
        if let Some(cb) = &self.config.progress_callback {
            cb.on_complete(record);
        }
    }
}
