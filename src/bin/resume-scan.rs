//! CLI binary for resume-scan.
//!
//! A thin shim over the library crate: maps CLI flags to `AnalysisConfig`,
//! wires the local collaborators together, runs one analysis and prints the
//! stored record.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use resume_scan::services::load_record;
use resume_scan::{
    resolve_document, AnalysisConfig, AnalysisOrchestrator, AnalysisProgressCallback,
    AnalysisRecord, EngineLoader, EngineLocation, FeedbackState, FileKvStore, JobContext,
    LlmFeedbackService, LocalStorage, PageCompositor, ProgressCallback, ScoreBand, Stage, TipKind,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

fn banded(score: u32) -> String {
    let band = ScoreBand::from_score(score);
    let text = format!("{score:>3}/100  {band}");
    match band {
        ScoreBand::Strong => green(&text),
        ScoreBand::GoodStart => yellow(&text),
        ScoreBand::NeedsWork => red(&text),
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current stage and its status line.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        let step = Stage::ALL.iter().position(|s| *s == stage).unwrap_or(0) + 1;
        self.bar.set_prefix(format!("[{step}/{}]", Stage::ALL.len()));
    }

    fn on_failed(&self, stage: Stage, message: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}  {}", red("✘"), bold(message), dim(&format!("({stage})")));
    }

    fn on_complete(&self, _record: &AnalysisRecord) {
        self.bar.finish_and_clear();
        eprintln!("{} Resume analyzed successfully", green("✔"));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a résumé against a job posting
  resume-scan cv.pdf --company Acme --job-title "Backend Engineer" \
      --job-description-file posting.txt

  # Analyze a résumé hosted online, print the stored record as JSON
  resume-scan https://example.com/cv.pdf --job-title "Data Analyst" --json

  # Show a previously stored analysis
  resume-scan --show 0b6c0e0c-3f4e-4a57-9f0e-7d2a5b1c9e11

STORAGE:
  <data-dir>/files/   uploaded résumés and their composite PNGs
  <data-dir>/kv/      one JSON record per analysis (resume_<id>.json)

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Directory holding libpdfium (else the system library)
"#;

/// Score a résumé PDF against a job description using a Vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "resume-scan",
    version,
    about = "Score a résumé PDF against a job description using a Vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "show")]
    input: Option<String>,

    /// Company the application is for.
    #[arg(long, env = "RESUME_SCAN_COMPANY", default_value = "")]
    company: String,

    /// Job title applied for.
    #[arg(long, env = "RESUME_SCAN_JOB_TITLE", default_value = "")]
    job_title: String,

    /// Job description text.
    #[arg(long, env = "RESUME_SCAN_JOB_DESCRIPTION", conflicts_with = "job_description_file")]
    job_description: Option<String>,

    /// Read the job description from a file.
    #[arg(long, env = "RESUME_SCAN_JOB_DESCRIPTION_FILE")]
    job_description_file: Option<PathBuf>,

    /// Directory for stored files and analysis records.
    #[arg(long, env = "RESUME_SCAN_DATA_DIR", default_value = "resume-scan-data")]
    data_dir: PathBuf,

    /// Print the stored analysis with this id and exit.
    #[arg(long, conflicts_with = "input")]
    show: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Page rendering scale (0.5–4.0).
    #[arg(long, env = "RESUME_SCAN_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Largest composite image allowed, in pixels (width × height).
    #[arg(long, env = "RESUME_SCAN_MAX_PIXELS", default_value_t = resume_scan::DEFAULT_MAX_PIXELS)]
    max_pixels: u64,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RESUME_SCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RESUME_SCAN_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUME_SCAN_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Send the composite image to the model instead of the original PDF.
    ///
    /// Without it the PDF is rendered a second time for the vision request.
    #[arg(long, env = "RESUME_SCAN_FEEDBACK_FROM_IMAGE")]
    feedback_from_image: bool,

    /// Upload and save timeout in seconds.
    #[arg(long, env = "RESUME_SCAN_UPLOAD_TIMEOUT", default_value_t = 120)]
    upload_timeout: u64,

    /// Feedback request timeout in seconds.
    #[arg(long, env = "RESUME_SCAN_FEEDBACK_TIMEOUT", default_value_t = 180)]
    feedback_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESUME_SCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the stored record as JSON instead of a summary.
    #[arg(long, env = "RESUME_SCAN_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "RESUME_SCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RESUME_SCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RESUME_SCAN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already shows every status line, so INFO logs stay quiet
    // while it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let kv = Arc::new(FileKvStore::new(cli.data_dir.join("kv")));

    // ── Show mode ────────────────────────────────────────────────────────
    if let Some(ref id) = cli.show {
        let record = load_record(kv.as_ref(), id)
            .await
            .context("Failed to read stored analysis")?
            .with_context(|| format!("No analysis stored with id '{id}'"))?;
        return print_record(&record, cli.json);
    }

    let input = cli
        .input
        .as_deref()
        .context("An input PDF path or URL is required")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let job = JobContext {
        company_name: cli.company.clone(),
        job_title: cli.job_title.clone(),
        job_description: read_job_description(&cli).await?,
    };

    // ── Wire collaborators ───────────────────────────────────────────────
    let loader = Arc::new(EngineLoader::pdfium(EngineLocation::from_env()));
    let compositor = PageCompositor::new(loader);
    let feedback = LlmFeedbackService::from_config(&config)
        .context("Failed to configure the feedback provider")?
        .with_compositor(compositor.clone());

    let orchestrator = AnalysisOrchestrator::new(
        Arc::new(LocalStorage::new(cli.data_dir.join("files"))),
        kv,
        Arc::new(feedback),
        compositor,
        config,
    );

    // ── Run analysis ─────────────────────────────────────────────────────
    let document = resolve_document(input, orchestrator.config().download_timeout_secs)
        .await
        .with_context(|| format!("Failed to read '{input}'"))?;

    let record = orchestrator
        .analyze(&document, &job)
        .await
        .context("Analysis failed")?;

    if !cli.quiet {
        print_record(&record, cli.json)?;
    }
    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .scale(cli.scale)
        .max_composite_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .feedback_from_image(cli.feedback_from_image)
        .upload_timeout_secs(cli.upload_timeout)
        .feedback_timeout_secs(cli.feedback_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_job_description(cli: &Cli) -> Result<String> {
    match (&cli.job_description, &cli.job_description_file) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job description from {:?}", path)),
        (None, None) => Ok(String::new()),
    }
}

fn print_record(record: &AnalysisRecord, json: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(record).context("Failed to serialise record")?;
        println!("{out}");
        return Ok(());
    }

    println!("{}  {}", bold("Analysis"), dim(&record.id));
    if !record.company_name.is_empty() || !record.job_title.is_empty() {
        println!("Job:      {} @ {}", record.job_title, record.company_name);
    }
    println!("Resume:   {}", record.resume_path);
    println!("Image:    {}", record.image_path);

    let feedback = match &record.feedback {
        FeedbackState::Empty => {
            println!("{}", yellow("Feedback: not available (the run did not finish)"));
            return Ok(());
        }
        FeedbackState::Ready(feedback) => feedback,
    };

    println!();
    println!("{:<14}{}", bold("Overall"), banded(feedback.overall_score));
    if let Some(ats) = &feedback.ats {
        println!("{:<14}{}", "ATS", banded(ats.score));
    }
    for (title, category) in feedback.categories() {
        println!("{:<14}{}", title, banded(category.score));
    }

    for (title, category) in feedback.categories() {
        if category.tips.is_empty() {
            continue;
        }
        println!();
        println!("{}", bold(title));
        for tip in &category.tips {
            let mark = match tip.kind {
                TipKind::Good => green("✓"),
                TipKind::Improve => yellow("△"),
                TipKind::Other => dim("·"),
            };
            println!("  {mark} {}", tip.tip);
            if !tip.explanation.is_empty() {
                println!("    {}", dim(&tip.explanation));
            }
        }
    }
    Ok(())
}
