//! Input resolution: turn a user-supplied path or URL into a [`Document`].
//!
//! The document is held in memory as shared bytes: the storage upload and
//! the renderer both read it, and neither may change it. We check the PDF
//! magic bytes (`%PDF`) up front so callers get a meaningful error rather
//! than a pdfium failure halfway through a run.

use crate::error::InputError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// A submitted file: its original name and raw bytes. Immutable.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a local PDF.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, InputError> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => InputError::FileNotFound { path: path.clone() },
            std::io::ErrorKind::PermissionDenied => {
                InputError::PermissionDenied { path: path.clone() }
            }
            _ => InputError::ReadFailed {
                path: path.clone(),
                source: e,
            },
        })?;

        let name = file_name(&path);
        check_pdf_magic(&name, &bytes)?;
        debug!("Resolved local PDF: {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to a document.
pub async fn resolve_document(input: &str, timeout_secs: u64) -> Result<Document, InputError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        Document::from_path(input).await
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume.pdf".to_string())
}

/// Inputs shorter than the 4-byte header are rejected too; missing bytes
/// show as zeros in the error.
fn check_pdf_magic(name: &str, bytes: &[u8]) -> Result<(), InputError> {
    if !bytes.starts_with(b"%PDF") {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(InputError::NotAPdf {
            name: name.to_string(),
            magic,
        });
    }
    Ok(())
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, InputError> {
    info!("Downloading PDF from: {}", url);

    let failed = |reason: String| InputError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            InputError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| failed(e.to_string()))?;
    let name = filename_from_url(url);
    check_pdf_magic(&name, &bytes)?;

    info!("Downloaded {} ({} bytes)", name, bytes.len());
    Ok(Document::new(name, bytes.to_vec()))
}

/// Last path segment of `url` when it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// Path for a stored file, used by local collaborators.
pub(crate) fn join_name(dir: &Path, name: &str) -> PathBuf {
    dir.join(file_name(Path::new(name)))
}
