//! Pipeline stages that turn a résumé PDF into a feedback report.
//!
//! Each submodule implements one transformation step and is testable on its
//! own; the orchestrator in [`crate::analyze`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ (storage, feedback service) ──▶ extract
//! (path/URL) (pdfium)   (PNG)                                     (JSON)
//! ```
//!
//! 1. [`input`]: resolve a local path or URL into an in-memory document
//! 2. [`engine`]: the pdfium backend and its one-time loader
//! 3. [`render`]: rasterise every page and stack them into one bitmap;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 4. [`encode`]: serialise the composite to a named PNG artifact
//! 5. [`extract`]: recover the feedback JSON from loosely formatted text

pub mod encode;
pub mod engine;
pub mod extract;
pub mod input;
pub mod render;
