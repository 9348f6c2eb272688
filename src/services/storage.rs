//! Filesystem-backed [`StorageService`].

use super::{StorageService, UploadFile, UploadResponse, UploadedRef};
use crate::error::ServiceError;
use crate::pipeline::input::join_name;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Stores each upload under `<root>/<upload-id>/<file name>`.
///
/// The per-upload directory keeps two runs that submit `resume.pdf` from
/// overwriting each other while the stored file keeps its original name.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    async fn upload(&self, files: Vec<UploadFile>) -> Result<Option<UploadResponse>, ServiceError> {
        if files.is_empty() {
            return Ok(None);
        }

        let dir = self.root.join(Uuid::new_v4().simple().to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ServiceError::Io {
                path: dir.clone(),
                source,
            })?;

        let mut refs = Vec::with_capacity(files.len());
        for file in files {
            let target = join_name(&dir, &file.name);
            tokio::fs::write(&target, &file.bytes)
                .await
                .map_err(|source| ServiceError::Io {
                    path: target.clone(),
                    source,
                })?;
            debug!("Stored {} ({} bytes) at {}", file.name, file.bytes.len(), target.display());
            refs.push(UploadedRef {
                path: target.to_string_lossy().into_owned(),
            });
        }

        Ok(Some(if refs.len() == 1 {
            UploadResponse::Single(refs.remove(0))
        } else {
            UploadResponse::Many(refs)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn file(name: &str, bytes: &[u8]) -> UploadFile {
        UploadFile {
            name: name.into(),
            mime_type: "application/pdf",
            bytes: Arc::from(bytes),
        }
    }

    #[tokio::test]
    async fn upload_writes_file_and_returns_path() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let resp = storage.upload(vec![file("cv.pdf", b"%PDF-1.7")]).await.unwrap();
        let stored = resp.unwrap().first().unwrap();

        assert!(stored.path.ends_with("cv.pdf"));
        assert!(Path::new(&stored.path).starts_with(tmp.path()));
        assert_eq!(std::fs::read(&stored.path).unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn same_name_uploads_do_not_collide() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let a = storage.upload(vec![file("cv.pdf", b"a")]).await.unwrap().unwrap().first().unwrap();
        let b = storage.upload(vec![file("cv.pdf", b"b")]).await.unwrap().unwrap().first().unwrap();

        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read(&a.path).unwrap(), b"a");
    }

    #[tokio::test]
    async fn multiple_files_return_a_list() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let resp = storage
            .upload(vec![file("a.pdf", b"1"), file("b.png", b"2")])
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(resp, UploadResponse::Many(ref v) if v.len() == 2));
    }

    #[tokio::test]
    async fn empty_upload_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(tmp.path());
        assert!(storage.upload(vec![]).await.unwrap().is_none());
    }
}
