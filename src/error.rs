//! Error types for the resume-scan library.
//!
//! Each pipeline component owns its own error type so the orchestrator can
//! tell *where* a run broke without string matching:
//!
//! * [`LoadError`]: the pdfium engine could not be bound.
//! * [`ConversionError`]: a page failed to render or the composite could
//!   not be assembled.
//! * [`EncodeError`]: the composite bitmap could not be serialised.
//! * [`ParseError`]: the feedback text did not yield valid JSON.
//! * [`ServiceError`]: a collaborator (storage, key-value store, LLM)
//!   failed at the transport level.
//!
//! The orchestrator folds all of them into [`StageError`] and reports the
//! terminal failure as [`AnalysisError`], which names the stage and carries
//! the fixed user-facing message for it.

use crate::analyze::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// The rendering engine could not be initialised.
///
/// `Clone` because a single failed initialisation is delivered to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
#[error("Failed to load the PDF rendering engine: {cause}")]
pub struct LoadError {
    pub cause: String,
}

impl LoadError {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

/// Failure while turning a document into a composite image.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The engine handle could not be acquired.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The bytes could not be opened as a PDF.
    #[error("Document '{name}' could not be opened: {detail}")]
    OpenFailed { name: String, detail: String },

    /// The PDF requires a password.
    #[error("Document '{name}' is encrypted and requires a password")]
    PasswordRequired { name: String },

    /// The PDF opened but contains no pages.
    #[error("Document '{name}' has no pages")]
    EmptyDocument { name: String },

    /// A page index was outside the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error for a specific page (1-indexed).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The stacked surface is over the pixel cap, or taller than `u32`.
    #[error("Composite surface {width}x{height} is too large")]
    SurfaceTooLarge { width: u64, height: u64 },

    /// The blocking render task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure while serialising the composite bitmap.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("PNG encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// The encoder ran but produced no bytes.
    #[error("Image encoder produced no data")]
    Empty,

    /// The blocking encode task panicked or was cancelled.
    #[error("Encode task failed: {0}")]
    Internal(String),
}

/// The feedback text could not be parsed.
///
/// Carries both the untouched service text and the cleaned candidate that
/// was handed to the JSON parser, for diagnostics.
#[derive(Debug, Error)]
#[error("Failed to parse feedback: {source}")]
pub struct ParseError {
    pub original: String,
    pub cleaned: String,
    #[source]
    pub source: serde_json::Error,
}

/// Transport-level failure of an external collaborator.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialisation failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The configured LLM provider is not available (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    #[error("LLM API error: {0}")]
    Llm(String),

    /// The stored file could not be turned into an image attachment.
    #[error("Cannot attach '{path}': {reason}")]
    Attachment { path: String, reason: String },

    #[error("Storage path '{0}' escapes the storage root")]
    InvalidPath(String),
}

/// Failure while reading a document from disk or over HTTP.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is not a valid PDF: '{name}'\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: [u8; 4] },

    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },
}

/// Builder validation failure.
#[derive(Debug, Error)]
#[error("Invalid configuration: {0}")]
pub struct ConfigError(pub String);

/// Why a single orchestrator stage failed.
#[derive(Debug, Error)]
pub enum StageError {
    /// The storage collaborator returned nothing.
    #[error("Upload returned no file reference")]
    UploadFailure,

    /// The feedback collaborator returned nothing usable.
    #[error("Feedback service returned no content")]
    EmptyResponse,

    #[error("Timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Terminal failure of an analysis run.
///
/// `message` is the fixed user-facing status for `stage`; `source` is the
/// underlying cause. `run_id` is set once the draft id has been generated.
#[derive(Debug, Error)]
#[error("{message} ({stage}): {source}")]
pub struct AnalysisError {
    pub stage: Stage,
    pub message: &'static str,
    pub run_id: Option<String>,
    #[source]
    pub source: StageError,
}
