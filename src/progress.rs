//! Progress-callback trait for analysis-run events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive the
//! human-readable status line emitted before every stage, plus structured
//! stage transitions.
//!
//! # Example
//!
//! ```rust
//! use resume_scan::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! struct StatusLog(Mutex<Vec<String>>);
//!
//! impl AnalysisProgressCallback for StatusLog {
//!     fn on_status(&self, status: &str) {
//!         self.0.lock().unwrap().push(status.to_string());
//!     }
//! }
//!
//! let log = Arc::new(StatusLog(Mutex::new(Vec::new())));
//! let config = AnalysisConfig::builder()
//!     .progress_callback(log as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::analyze::Stage;
use crate::report::AnalysisRecord;
use std::sync::Arc;

/// Called by the orchestrator as a run moves through its stages.
///
/// Implementations must be `Send + Sync`: several runs can share one
/// callback. All methods default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// The status line shown to the user, e.g. `"Uploading file..."`.
    ///
    /// Fired before each stage starts, and once more with the final
    /// success or error message.
    fn on_status(&self, status: &str) {
        let _ = status;
    }

    /// Called when `stage` begins.
    fn on_stage_start(&self, stage: Stage) {
        let _ = stage;
    }

    /// Called once when the run ends in `Failed`.
    fn on_failed(&self, stage: Stage, message: &str) {
        let _ = (stage, message);
    }

    /// Called once when the run reaches `Done`.
    fn on_complete(&self, record: &AnalysisRecord) {
        let _ = record;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
