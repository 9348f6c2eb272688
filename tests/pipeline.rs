//! Integration tests for the analysis run.
//!
//! Every collaborator is an in-memory fake and the render engine draws
//! solid-colour pages, so these run without pdfium or an API key.

use async_trait::async_trait;
use image::{imageops, Rgba, RgbaImage};
use resume_scan::error::ServiceError;
use resume_scan::services::{load_record, ContentPart, UploadFile};
use resume_scan::{
    AnalysisConfig, AnalysisOrchestrator, AnalysisProgressCallback, ConversionError, Document,
    EngineHandle, EngineLoader, FeedbackResponse, FeedbackService, FeedbackState, KeyValueStore,
    MemoryKvStore, MessageContent, PageCompositor, PageSource, RenderEngine, RunState, Stage,
    StageError, StorageService, UploadResponse, UploadedRef, Viewport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Two pages of 300×400 and 250×500 points.
struct StubEngine {
    opens: AtomicUsize,
    fail: bool,
}

impl StubEngine {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            fail,
        })
    }
}

const PAGES: [(f32, f32); 2] = [(300.0, 400.0), (250.0, 500.0)];

impl PageSource for StubEngine {
    fn page_count(&self) -> usize {
        PAGES.len()
    }

    fn viewport(&self, index: usize, scale: f32) -> Result<Viewport, ConversionError> {
        let (w, h) = PAGES[index];
        Ok(Viewport::from_points(w, h, scale))
    }

    fn render_into(
        &self,
        index: usize,
        viewport: Viewport,
        surface: &mut RgbaImage,
        y_offset: u32,
    ) -> Result<(), ConversionError> {
        if self.fail {
            return Err(ConversionError::RenderFailed {
                page: index + 1,
                detail: "stub failure".into(),
            });
        }
        let tile = RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([0, 0, 0, 255]));
        imageops::overlay(surface, &tile, 0, i64::from(y_offset));
        Ok(())
    }
}

impl RenderEngine for StubEngine {
    fn open_document(
        &self,
        _name: &str,
        _bytes: &[u8],
        f: &mut dyn FnMut(&dyn PageSource) -> Result<(), ConversionError>,
    ) -> Result<(), ConversionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        f(self)
    }
}

/// Stores nothing; answers `/store/<name>`, or nothing for listed calls.
#[derive(Default)]
struct FakeStorage {
    uploads: Mutex<Vec<(String, Arc<[u8]>)>>,
    empty_on_call: Option<usize>,
}

impl FakeStorage {
    fn names(&self) -> Vec<String> {
        self.uploads.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl StorageService for FakeStorage {
    async fn upload(&self, files: Vec<UploadFile>) -> Result<Option<UploadResponse>, ServiceError> {
        let mut uploads = self.uploads.lock().unwrap();
        let call = uploads.len();
        for f in &files {
            uploads.push((f.name.clone(), Arc::clone(&f.bytes)));
        }
        if self.empty_on_call == Some(call) {
            return Ok(None);
        }
        Ok(Some(UploadResponse::Many(
            files
                .iter()
                .map(|f| UploadedRef {
                    path: format!("/store/{}", f.name),
                })
                .collect(),
        )))
    }
}

/// Memory store that also keeps every attempted write. The write numbered
/// `fail_on_write` (0-based) is recorded but not applied, and errors.
#[derive(Default)]
struct RecordingKv {
    inner: MemoryKvStore,
    writes: Mutex<Vec<(String, String)>>,
    fail_on_write: Option<usize>,
}

#[async_trait]
impl KeyValueStore for RecordingKv {
    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let attempt = {
            let mut writes = self.writes.lock().unwrap();
            writes.push((key.to_string(), value.to_string()));
            writes.len() - 1
        };
        if self.fail_on_write == Some(attempt) {
            return Err(ServiceError::Io {
                path: format!("{key}.json").into(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.set(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        self.inner.get(key).await
    }
}

struct ScriptedFeedback {
    reply: Option<FeedbackResponse>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedFeedback {
    fn replying(reply: Option<FeedbackResponse>) -> Self {
        Self {
            reply,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FeedbackService for ScriptedFeedback {
    async fn feedback(
        &self,
        path: &str,
        instructions: &str,
    ) -> Result<Option<FeedbackResponse>, ServiceError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), instructions.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.reply.clone())
    }
}

#[derive(Default)]
struct StatusLog {
    statuses: Mutex<Vec<String>>,
    stages: Mutex<Vec<Stage>>,
    failures: Mutex<Vec<(Stage, String)>>,
    completed: AtomicUsize,
}

impl AnalysisProgressCallback for StatusLog {
    fn on_status(&self, status: &str) {
        self.statuses.lock().unwrap().push(status.to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        self.stages.lock().unwrap().push(stage);
    }

    fn on_failed(&self, stage: Stage, message: &str) {
        self.failures.lock().unwrap().push((stage, message.to_string()));
    }

    fn on_complete(&self, _record: &resume_scan::AnalysisRecord) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

const FEEDBACK_JSON: &str = r#"```json
{
  "overallScore": 78,
  "toneAndStyle": {"score": 82, "tips": [{"type": "good", "tip": "Confident voice", "explanation": "Active verbs."}]},
  "content": {"score": 71, "tips": [{"type": "improve", "tip": "Quantify impact", "explanation": "Add numbers."}]},
  "structure": {"score": 80, "tips": []},
  "skills": {"score": 64, "tips": []}
}
```"#;

struct Harness {
    engine: Arc<StubEngine>,
    storage: Arc<FakeStorage>,
    kv: Arc<RecordingKv>,
    feedback: Arc<ScriptedFeedback>,
    log: Arc<StatusLog>,
    orchestrator: AnalysisOrchestrator,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn harness_with(
    engine: Arc<StubEngine>,
    storage: FakeStorage,
    feedback: ScriptedFeedback,
    configure: impl FnOnce(resume_scan::AnalysisConfigBuilder) -> resume_scan::AnalysisConfigBuilder,
) -> Harness {
    harness_with_kv(engine, storage, RecordingKv::default(), feedback, configure)
}

fn harness_with_kv(
    engine: Arc<StubEngine>,
    storage: FakeStorage,
    kv: RecordingKv,
    feedback: ScriptedFeedback,
    configure: impl FnOnce(resume_scan::AnalysisConfigBuilder) -> resume_scan::AnalysisConfigBuilder,
) -> Harness {
    init_tracing();
    let storage = Arc::new(storage);
    let kv = Arc::new(kv);
    let feedback = Arc::new(feedback);
    let log = Arc::new(StatusLog::default());

    let handle: EngineHandle = engine.clone();
    let compositor = PageCompositor::new(Arc::new(EngineLoader::ready(handle)));
    let config = configure(
        AnalysisConfig::builder().progress_callback(log.clone() as Arc<dyn AnalysisProgressCallback>),
    )
    .build()
    .unwrap();

    let orchestrator = AnalysisOrchestrator::new(
        storage.clone(),
        kv.clone(),
        feedback.clone(),
        compositor,
        config,
    );

    Harness {
        engine,
        storage,
        kv,
        feedback,
        log,
        orchestrator,
    }
}

fn harness(feedback: Option<FeedbackResponse>) -> Harness {
    harness_with(
        StubEngine::new(false),
        FakeStorage::default(),
        ScriptedFeedback::replying(feedback),
        |b| b,
    )
}

fn document() -> Document {
    Document::new("cv.pdf", b"%PDF-1.7 two pages".to_vec())
}

fn job() -> resume_scan::JobContext {
    resume_scan::JobContext {
        company_name: "Acme".into(),
        job_title: "Backend Engineer".into(),
        job_description: "Rust and Postgres".into(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn successful_run_persists_parsed_feedback() {
    let h = harness(Some(FeedbackResponse::text(FEEDBACK_JSON)));

    let record = h.orchestrator.analyze(&document(), &job()).await.unwrap();

    assert_eq!(record.resume_path, "/store/cv.pdf");
    assert_eq!(record.image_path, "/store/cv.png");
    assert_eq!(record.company_name, "Acme");
    let feedback = record.feedback.as_ready().expect("feedback is ready");
    assert_eq!(feedback.overall_score, 78);
    assert_eq!(feedback.content.tips[0].tip, "Quantify impact");

    // Draft first, then the final record, both under the same key.
    let writes = h.kv.writes.lock().unwrap().clone();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].0, format!("resume:{}", record.id));
    assert_eq!(writes[0].0, writes[1].0);
    let draft: serde_json::Value = serde_json::from_str(&writes[0].1).unwrap();
    assert_eq!(draft["feedback"], "");
    assert_eq!(draft["resumePath"], "/store/cv.pdf");

    let stored = load_record(h.kv.as_ref(), &record.id).await.unwrap().unwrap();
    assert_eq!(stored, record);

    assert_eq!(h.log.stages.lock().unwrap().as_slice(), Stage::ALL.as_slice());
    assert_eq!(
        *h.log.statuses.lock().unwrap(),
        vec![
            "Uploading file...",
            "Converting to image...",
            "Uploading image...",
            "Preparing data...",
            "Analyzing resume...",
            "Parsing analysis results...",
            "Saving analysis...",
            "Resume analyzed successfully!",
        ]
    );
    assert_eq!(h.log.completed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn uploaded_image_is_the_stacked_composite() {
    let h = harness(Some(FeedbackResponse::text(FEEDBACK_JSON)));
    h.orchestrator.analyze(&document(), &job()).await.unwrap();

    let uploads = h.storage.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);
    assert_eq!(uploads[1].0, "cv.png");
    let png = image::load_from_memory(&uploads[1].1).unwrap().to_rgba8();
    assert_eq!((png.width(), png.height()), (600, 1800));
    // Right of the narrower second page is white, not transparent.
    assert_eq!(*png.get_pixel(599, 1799), Rgba([255, 255, 255, 255]));
    assert_eq!(*png.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
}

#[tokio::test]
async fn feedback_request_uses_resume_path_and_job_context() {
    let h = harness(Some(FeedbackResponse::text(FEEDBACK_JSON)));
    h.orchestrator.analyze(&document(), &job()).await.unwrap();

    let calls = h.feedback.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "/store/cv.pdf");
    assert!(calls[0].1.contains("The job title is: Backend Engineer"));
    assert!(calls[0].1.contains("Rust and Postgres"));
}

#[tokio::test]
async fn feedback_from_image_sends_image_path() {
    let h = harness_with(
        StubEngine::new(false),
        FakeStorage::default(),
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b.feedback_from_image(true),
    );
    h.orchestrator.analyze(&document(), &job()).await.unwrap();
    assert_eq!(h.feedback.calls.lock().unwrap()[0].0, "/store/cv.png");
}

#[tokio::test]
async fn empty_resume_upload_short_circuits() {
    let h = harness_with(
        StubEngine::new(false),
        FakeStorage {
            empty_on_call: Some(0),
            ..Default::default()
        },
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b,
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::UploadingResume);
    assert_eq!(err.message, "Error uploading file");
    assert!(matches!(err.source, StageError::UploadFailure));
    assert!(err.run_id.is_none());
    assert!(matches!(
        err.state(),
        RunState::Failed {
            stage: Stage::UploadingResume,
            ..
        }
    ));

    assert_eq!(h.storage.names(), vec!["cv.pdf"]);
    assert_eq!(h.engine.opens.load(Ordering::SeqCst), 0);
    assert!(h.kv.writes.lock().unwrap().is_empty());
    assert!(h.feedback.calls.lock().unwrap().is_empty());
    assert_eq!(
        *h.log.statuses.lock().unwrap(),
        vec!["Uploading file...", "Error uploading file"]
    );
    assert_eq!(h.log.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn render_failure_stops_before_image_upload() {
    let h = harness_with(
        StubEngine::new(true),
        FakeStorage::default(),
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b,
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::ConvertingImage);
    assert_eq!(err.message, "Error converting to image");
    assert!(matches!(
        err.source,
        StageError::Conversion(ConversionError::RenderFailed { page: 1, .. })
    ));
    assert_eq!(h.storage.names(), vec!["cv.pdf"]);
    assert!(h.kv.writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_image_upload_fails_before_persisting() {
    let h = harness_with(
        StubEngine::new(false),
        FakeStorage {
            empty_on_call: Some(1),
            ..Default::default()
        },
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b,
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::UploadingImage);
    assert_eq!(err.message, "Error uploading image");
    assert!(h.kv.writes.lock().unwrap().is_empty());
    assert!(h.feedback.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn garbage_feedback_leaves_draft_record_empty() {
    let h = harness(Some(FeedbackResponse::text("garbage")));

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::ParsingFeedback);
    assert_eq!(err.message, "Error: Failed to parse analysis results");
    match &err.source {
        StageError::Parse(parse) => assert_eq!(parse.original, "garbage"),
        other => panic!("unexpected source: {other:?}"),
    }

    let id = err.run_id.as_deref().expect("draft id is known");
    let stored = load_record(h.kv.as_ref(), id).await.unwrap().unwrap();
    assert_eq!(stored.feedback, FeedbackState::Empty);
    assert_eq!(stored.image_path, "/store/cv.png");
    assert_eq!(h.kv.writes.lock().unwrap().len(), 1);

    let failures = h.log.failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, Stage::ParsingFeedback);
    assert_eq!(
        h.log.statuses.lock().unwrap().last().map(String::as_str),
        Some("Error: Failed to parse analysis results")
    );
}

fn failing_kv(write: usize) -> RecordingKv {
    RecordingKv {
        fail_on_write: Some(write),
        ..Default::default()
    }
}

#[tokio::test]
async fn draft_write_failure_stops_before_feedback_request() {
    let h = harness_with_kv(
        StubEngine::new(false),
        FakeStorage::default(),
        failing_kv(0),
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b,
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::PersistingDraft);
    assert_eq!(err.message, "Error saving analysis");
    assert!(matches!(err.source, StageError::Service(ServiceError::Io { .. })));
    assert!(h.feedback.calls.lock().unwrap().is_empty());
    assert_eq!(h.kv.writes.lock().unwrap().len(), 1);
    assert!(h.kv.inner.is_empty());
    assert_eq!(
        h.log.statuses.lock().unwrap().last().map(String::as_str),
        Some("Error saving analysis")
    );
    assert_eq!(h.log.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn final_write_failure_keeps_empty_draft() {
    let h = harness_with_kv(
        StubEngine::new(false),
        FakeStorage::default(),
        failing_kv(1),
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        |b| b,
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::PersistingFinal);
    assert_eq!(err.message, "Error saving analysis");
    let id = err.run_id.as_deref().expect("run id is set after the draft");

    let stored = load_record(h.kv.as_ref(), id).await.unwrap().unwrap();
    assert_eq!(stored.feedback, FeedbackState::Empty);

    // The rejected write carried the parsed report.
    let writes = h.kv.writes.lock().unwrap();
    assert_eq!(writes.len(), 2);
    let attempted: serde_json::Value = serde_json::from_str(&writes[1].1).unwrap();
    assert_eq!(attempted["feedback"]["overallScore"], 78);
    assert_eq!(h.feedback.calls.lock().unwrap().len(), 1);
    assert_eq!(h.log.completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oddly_shaped_feedback_still_completes() {
    let reply = r#"{
        "overallScore": 66.6,
        "toneAndStyle": {"score": 70, "tips": null},
        "content": {"score": 58, "tips": [{"type": "neutral", "tip": "Trim the summary"}]}
    }"#;
    let h = harness(Some(FeedbackResponse::text(reply)));

    let record = h.orchestrator.analyze(&document(), &job()).await.unwrap();

    let feedback = record.feedback.as_ready().expect("feedback is ready");
    assert_eq!(feedback.overall_score, 67);
    assert!(feedback.tone_and_style.tips.is_empty());
    assert_eq!(feedback.content.tips[0].kind, resume_scan::TipKind::Other);
    assert_eq!(feedback.structure, resume_scan::Category::default());
}

#[tokio::test]
async fn oversized_composite_fails_conversion() {
    let h = harness_with(
        StubEngine::new(false),
        FakeStorage::default(),
        ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON))),
        // 600 x 1800 at scale 2.0 is 1.08 Mpx.
        |b| b.max_composite_pixels(1_000_000),
    );

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::ConvertingImage);
    assert!(matches!(
        err.source,
        StageError::Conversion(ConversionError::SurfaceTooLarge { width: 600, height: 1800 })
    ));
    assert_eq!(h.storage.names(), vec!["cv.pdf"]);
}

#[tokio::test]
async fn missing_feedback_fails_analysis_stage() {
    let h = harness(None);

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::AwaitingFeedback);
    assert_eq!(err.message, "Error: Failed to analyze resume");
    assert!(matches!(err.source, StageError::EmptyResponse));
    assert_eq!(h.kv.writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn content_parts_use_first_text_part() {
    let reply = FeedbackResponse {
        message: resume_scan::services::ResponseMessage {
            content: MessageContent::Parts(vec![
                ContentPart {
                    kind: Some("image".into()),
                    text: None,
                },
                ContentPart::text(FEEDBACK_JSON),
                ContentPart::text("ignored"),
            ]),
        },
    };
    let h = harness(Some(reply));

    let record = h.orchestrator.analyze(&document(), &job()).await.unwrap();
    assert_eq!(record.feedback.as_ready().unwrap().overall_score, 78);
}

#[tokio::test]
async fn slow_feedback_times_out() {
    let mut feedback = ScriptedFeedback::replying(Some(FeedbackResponse::text(FEEDBACK_JSON)));
    feedback.delay = Some(Duration::from_secs(30));
    let h = harness_with(StubEngine::new(false), FakeStorage::default(), feedback, |b| {
        b.feedback_timeout_secs(1)
    });

    let err = h.orchestrator.analyze(&document(), &job()).await.unwrap_err();

    assert_eq!(err.stage, Stage::AwaitingFeedback);
    assert!(matches!(err.source, StageError::Timeout { secs: 1 }));
}

#[tokio::test]
async fn concurrent_runs_share_one_engine_initialisation() {
    let inits = Arc::new(AtomicUsize::new(0));
    let engine = StubEngine::new(false);
    let loader = {
        let inits = Arc::clone(&inits);
        let engine = Arc::clone(&engine);
        EngineLoader::with_initializer(move || {
            let inits = Arc::clone(&inits);
            let engine = Arc::clone(&engine);
            async move {
                inits.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(engine as EngineHandle)
            }
        })
    };

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(FakeStorage::default()),
        Arc::new(MemoryKvStore::new()),
        Arc::new(ScriptedFeedback::replying(Some(FeedbackResponse::text(
            FEEDBACK_JSON,
        )))),
        PageCompositor::new(Arc::new(loader)),
        AnalysisConfig::default(),
    );

    let doc = document();
    let job = job();
    let (a, b, c) = tokio::join!(
        orchestrator.analyze(&doc, &job),
        orchestrator.analyze(&doc, &job),
        orchestrator.analyze(&doc, &job),
    );
    let ids = [a.unwrap().id, b.unwrap().id, c.unwrap().id];

    assert_eq!(inits.load(Ordering::SeqCst), 1);
    assert_eq!(engine.opens.load(Ordering::SeqCst), 3);
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);
}
