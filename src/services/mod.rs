//! Contracts for the external collaborators an analysis run depends on.
//!
//! The orchestrator talks to three services through the traits here:
//!
//! * [`StorageService`] stores uploaded files and returns a path for each.
//! * [`KeyValueStore`] persists serialised [`crate::report::AnalysisRecord`]s.
//! * [`FeedbackService`] asks a model to review a stored file.
//!
//! Each trait returns `Ok(None)` for an empty result, which the orchestrator
//! treats as a stage failure. `Err` is reserved for transport errors.
//!
//! Concrete implementations live in the submodules: [`storage::LocalStorage`],
//! [`kv::FileKvStore`], [`kv::MemoryKvStore`] and
//! [`llm::LlmFeedbackService`].

pub mod kv;
pub mod llm;
pub mod storage;

use crate::error::ServiceError;
use crate::pipeline::encode::EncodedArtifact;
use crate::pipeline::input::Document;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use kv::{load_record, FileKvStore, MemoryKvStore};
pub use llm::LlmFeedbackService;
pub use storage::LocalStorage;

/// A file handed to [`StorageService::upload`].
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: &'static str,
    pub bytes: Arc<[u8]>,
}

impl From<&Document> for UploadFile {
    fn from(doc: &Document) -> Self {
        Self {
            name: doc.name.clone(),
            mime_type: "application/pdf",
            bytes: Arc::clone(&doc.bytes),
        }
    }
}

impl From<&EncodedArtifact> for UploadFile {
    fn from(artifact: &EncodedArtifact) -> Self {
        Self {
            name: artifact.name.clone(),
            mime_type: artifact.mime_type,
            bytes: Arc::clone(&artifact.bytes),
        }
    }
}

/// Reference to a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedRef {
    pub path: String,
}

/// Storage answers with one reference or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Single(UploadedRef),
    Many(Vec<UploadedRef>),
}

impl UploadResponse {
    /// The reference for the first uploaded file, if any.
    pub fn first(self) -> Option<UploadedRef> {
        match self {
            UploadResponse::Single(r) => Some(r),
            UploadResponse::Many(refs) => refs.into_iter().next(),
        }
    }
}

#[async_trait]
pub trait StorageService: Send + Sync {
    async fn upload(&self, files: Vec<UploadFile>) -> Result<Option<UploadResponse>, ServiceError>;
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError>;

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError>;
}

#[async_trait]
pub trait FeedbackService: Send + Sync {
    /// Review the file stored at `path` following `instructions`.
    async fn feedback(
        &self,
        path: &str,
        instructions: &str,
    ) -> Result<Option<FeedbackResponse>, ServiceError>;
}

/// Envelope returned by the feedback service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub message: ResponseMessage,
}

impl FeedbackResponse {
    /// Response carrying a single text body.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: ResponseMessage {
                content: MessageContent::Text(content.into()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub content: MessageContent,
}

/// Message content: a plain string or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: Some("text".into()),
            text: Some(text.into()),
        }
    }
}

/// Collapse message content to one string.
///
/// A plain string is returned as-is. For parts, the first part that carries
/// text wins; `None` if no part does.
pub fn normalize_content(content: &MessageContent) -> Option<&str> {
    match content {
        MessageContent::Text(text) => Some(text.as_str()),
        MessageContent::Parts(parts) => parts.iter().find_map(|p| p.text.as_deref()),
    }
}
