use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::models::job::JobId;
use crate::models::separation::Stem;

/// Local filesystem layout for uploads and per-job separation outputs.
///
/// Every job writes into `output_root/<job_id>/`, so concurrent jobs never
/// share an output path.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    upload_dir: PathBuf,
    output_root: PathBuf,
}

impl LocalStorage {
    /// Create both directories if needed and resolve them to absolute paths.
    pub async fn init(
        upload_dir: impl AsRef<Path>,
        output_root: impl AsRef<Path>,
    ) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(upload_dir.as_ref()).await?;
        tokio::fs::create_dir_all(output_root.as_ref()).await?;

        Ok(Self {
            upload_dir: tokio::fs::canonicalize(upload_dir.as_ref()).await?,
            output_root: tokio::fs::canonicalize(output_root.as_ref()).await?,
        })
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn job_output_dir(&self, job_id: JobId) -> PathBuf {
        self.output_root.join(job_id.to_string())
    }

    pub fn artifact_path(&self, job_id: JobId, stem: Stem) -> PathBuf {
        self.job_output_dir(job_id).join(stem.file_name())
    }

    /// Store an uploaded file under a unique name and return its path.
    pub async fn upload(&self, original_name: &str, data: &[u8]) -> Result<PathBuf, StorageError> {
        let (path, mut file) = self.create_upload(original_name).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(path)
    }

    /// Open a fresh file for an upload that is written incrementally.
    pub async fn create_upload(
        &self,
        original_name: &str,
    ) -> Result<(PathBuf, tokio::fs::File), StorageError> {
        let name = sanitize_file_name(original_name);
        let path = self.upload_dir.join(format!("{}-{}", Uuid::new_v4(), name));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok((path, file))
    }

    /// Delete a partially written or rejected upload.
    pub async fn discard_upload(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to discard upload");
            }
        }
    }

    /// Remove a job's output directory. Missing directories are not an error.
    pub async fn remove_job_output(&self, job_id: JobId) -> Result<(), StorageError> {
        match tokio::fs::remove_dir_all(self.job_output_dir(job_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check that `dir` exists and accepts new files.
    pub async fn check_writable(dir: &Path) -> Result<(), StorageError> {
        let probe = dir.join(format!(".probe-{}", Uuid::new_v4()));
        tokio::fs::write(&probe, b"").await?;
        tokio::fs::remove_file(&probe).await?;
        Ok(())
    }
}

/// Reduce a client supplied file name to a safe single path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Filesystem operation failed: {0}")]
    Io(#[from] std::io::Error),
}
