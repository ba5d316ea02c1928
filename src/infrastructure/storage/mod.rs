pub mod local;
pub mod s3;

use bytes::Bytes;
use std::path::{Component, Path};
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::config::settings::{AppConfig, StorageBackend};
use crate::engine::model::{FileFormat, JobId};
use local::LocalStorage;
use s3::S3Storage;

pub type ByteReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Owner of input and output bytes. Jobs only carry keys into it.
#[derive(Clone, Debug)]
pub enum StorageService {
    Local(LocalStorage),
    S3(S3Storage),
}

impl StorageService {
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        match config.storage_backend {
            StorageBackend::Local => {
                let storage = LocalStorage::new(&config.storage_dir).await?;
                Ok(StorageService::Local(storage))
            }
            StorageBackend::S3 => {
                let storage = S3Storage::new(
                    &config.minio_url,
                    &config.minio_bucket,
                    &config.minio_access_key,
                    &config.minio_secret_key,
                )
                .await;
                Ok(StorageService::S3(storage))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StorageService::Local(_) => "local",
            StorageService::S3(_) => "s3",
        }
    }

    pub async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self {
            StorageService::Local(local) => local.put(key, data).await,
            StorageService::S3(s3) => s3.put_object(key, data, content_type).await,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        validate_key(key)?;
        match self {
            StorageService::Local(local) => local.get(key).await,
            StorageService::S3(s3) => s3.get_object(key).await,
        }
    }

    /// Deleting a missing object is not an error.
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        match self {
            StorageService::Local(local) => local.delete(key).await,
            StorageService::S3(s3) => s3.delete_object(key).await,
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        match self {
            StorageService::Local(local) => local.exists(key).await,
            StorageService::S3(s3) => s3.head_object(key).await,
        }
    }

    /// Keys under `prefix` whose objects were last written before `cutoff`.
    pub async fn list_older_than(&self, prefix: &str, cutoff: SystemTime) -> Result<Vec<String>, StorageError> {
        validate_key(prefix)?;
        match self {
            StorageService::Local(local) => local.list_older_than(prefix, cutoff).await,
            StorageService::S3(s3) => {
                let cutoff_secs = cutoff
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                s3.list_older_than(&format!("{}/", prefix.trim_end_matches('/')), cutoff_secs)
                    .await
            }
        }
    }

    /// Reader over the object plus its length in bytes.
    pub async fn open_stream(&self, key: &str) -> Result<(ByteReader, u64), StorageError> {
        validate_key(key)?;
        match self {
            StorageService::Local(local) => local.open(key).await,
            StorageService::S3(s3) => s3.open_object(key).await,
        }
    }
}

/// Rejects keys that could escape the storage root: empty, absolute, or
/// containing `..`.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.starts_with('\\') || key.contains('\0') {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    let escapes = Path::new(key)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || key.split(['/', '\\']).any(|part| part == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub const UPLOAD_PREFIX: &str = "uploads";
pub const RESULT_PREFIX: &str = "results";

pub fn upload_key(format: FileFormat) -> String {
    format!("{}/{}.{}", UPLOAD_PREFIX, Uuid::new_v4(), format.extension())
}

pub fn result_key(job_id: JobId, format: FileFormat) -> String {
    format!("{}/{}.{}", RESULT_PREFIX, job_id, format.extension())
}
