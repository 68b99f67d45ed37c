use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::config::get_config;
use crate::error::AppError;

/// Local-disk store for uploaded PDFs and generated MP3s. Writes go through
/// a temp file in the destination directory and a rename, so a crash mid-write
/// never leaves a partial file under the final name.
#[derive(Clone)]
pub struct StorageService {
    upload_dir: PathBuf,
    audio_dir: PathBuf,
}

impl StorageService {
    pub fn new(upload_dir: impl Into<PathBuf>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            audio_dir: audio_dir.into(),
        }
    }

    pub fn from_config() -> Self {
        let config = get_config();
        Self::new(&config.upload_dir, &config.audio_dir)
    }

    pub async fn ensure_dirs(&self) -> Result<(), AppError> {
        tokio::fs::create_dir_all(&self.upload_dir).await.map_err(|e| {
            AppError::InternalServerError(format!("Failed to create upload dir: {}", e))
        })?;
        tokio::fs::create_dir_all(&self.audio_dir).await.map_err(|e| {
            AppError::InternalServerError(format!("Failed to create audio dir: {}", e))
        })?;
        Ok(())
    }

    pub fn document_path(&self, stored_name: &str) -> PathBuf {
        self.upload_dir.join(stored_name)
    }

    pub fn audio_path(&self, stored_name: &str) -> PathBuf {
        self.audio_dir.join(stored_name)
    }

    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    pub async fn store_document(&self, stored_name: &str, data: Vec<u8>) -> Result<(), AppError> {
        write_atomic(self.upload_dir.clone(), self.document_path(stored_name), data).await
    }

    pub async fn read_document(&self, stored_name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.document_path(stored_name);
        tokio::fs::read(&path).await.map_err(|e| {
            AppError::InternalServerError(format!("Failed to read document {}: {}", stored_name, e))
        })
    }

    /// Reads a generated MP3. A missing or empty file is reported as a
    /// storage inconsistency, not a plain not-found: the caller only asks
    /// for artifacts the database says exist.
    pub async fn read_audio(&self, stored_name: &str) -> Result<Vec<u8>, AppError> {
        let path = self.audio_path(stored_name);
        match tokio::fs::read(&path).await {
            Ok(data) if data.is_empty() => Err(AppError::StorageInconsistency(format!(
                "Audio file {} exists but is empty",
                stored_name
            ))),
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::StorageInconsistency(
                format!("Audio file {} is missing from storage", stored_name),
            )),
            Err(e) => Err(AppError::InternalServerError(format!(
                "Failed to read audio file {}: {}",
                stored_name, e
            ))),
        }
    }

    pub async fn remove_document(&self, stored_name: &str) -> Result<(), AppError> {
        remove_if_exists(self.document_path(stored_name)).await
    }

    pub async fn remove_audio(&self, stored_name: &str) -> Result<(), AppError> {
        remove_if_exists(self.audio_path(stored_name)).await
    }
}

pub(crate) async fn write_atomic(
    dir: PathBuf,
    final_path: PathBuf,
    data: Vec<u8>,
) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        // Temp file must live in the destination directory: rename is only
        // atomic within the same filesystem.
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(&data)?;
        tmp.persist(&final_path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("Task join error: {}", e)))?
    .map_err(|e| AppError::InternalServerError(format!("Failed to write file: {}", e)))
}

async fn remove_if_exists(path: PathBuf) -> Result<(), AppError> {
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::InternalServerError(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}
