use cron::Schedule;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::env::{self, EnvKey};
use crate::engine::{EngineConfig, RetryPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("{0}")]
    Invalid(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "s3" | "minio" => Ok(StorageBackend::S3),
            other => Err(format!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub worker_count: usize,
    pub max_queue_depth: usize,
    pub convert_max_retries: u32,
    pub compress_max_retries: u32,
    pub subscriber_buffer: usize,
    pub max_upload_bytes: u64,
    pub storage_backend: StorageBackend,
    pub storage_dir: String,
    pub minio_url: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub cleanup_cron: String,
    pub retention_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            worker_count: 4,
            max_queue_depth: 64,
            convert_max_retries: 1,
            compress_max_retries: 1,
            subscriber_buffer: 32,
            max_upload_bytes: 10 * 1024 * 1024,
            storage_backend: StorageBackend::Local,
            storage_dir: "./data".to_string(),
            minio_url: String::new(),
            minio_bucket: String::new(),
            minio_access_key: String::new(),
            minio_secret_key: String::new(),
            cleanup_cron: "0 0 * * * *".to_string(),
            retention_secs: 3600,
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let storage_backend = env::get_parsed(EnvKey::StorageBackend, defaults.storage_backend)
            .map_err(ConfigError::Invalid)?;

        let (minio_url, minio_bucket, minio_access_key, minio_secret_key) = match storage_backend {
            StorageBackend::S3 => (
                required(EnvKey::MinioUrl)?,
                required(EnvKey::MinioBucket)?,
                required(EnvKey::MinioAccessKey)?,
                required(EnvKey::MinioSecretKey)?,
            ),
            StorageBackend::Local => Default::default(),
        };

        let config = Self {
            server_port: parsed(EnvKey::ServerPort, defaults.server_port)?,
            worker_count: parsed(EnvKey::WorkerCount, defaults.worker_count)?,
            max_queue_depth: parsed(EnvKey::MaxQueueDepth, defaults.max_queue_depth)?,
            convert_max_retries: parsed(EnvKey::ConvertMaxRetries, defaults.convert_max_retries)?,
            compress_max_retries: parsed(EnvKey::CompressMaxRetries, defaults.compress_max_retries)?,
            subscriber_buffer: parsed(EnvKey::SubscriberBuffer, defaults.subscriber_buffer)?,
            max_upload_bytes: parsed(EnvKey::MaxUploadBytes, defaults.max_upload_bytes)?,
            storage_backend,
            storage_dir: env::get_or(EnvKey::StorageDir, &defaults.storage_dir),
            minio_url,
            minio_bucket,
            minio_access_key,
            minio_secret_key,
            cleanup_cron: env::get_or(EnvKey::CleanupCron, &defaults.cleanup_cron),
            retention_secs: parsed(EnvKey::RetentionSecs, defaults.retention_secs)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count == 0 {
            return Err(ConfigError::Invalid("WORKER_COUNT must be at least 1".into()));
        }
        if self.max_queue_depth == 0 {
            return Err(ConfigError::Invalid("MAX_QUEUE_DEPTH must be at least 1".into()));
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::Invalid("SUBSCRIBER_BUFFER must be at least 1".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("MAX_UPLOAD_BYTES must be at least 1".into()));
        }
        self.cleanup_schedule()?;
        Ok(())
    }

    pub fn cleanup_schedule(&self) -> Result<Schedule, ConfigError> {
        Schedule::from_str(&self.cleanup_cron)
            .map_err(|e| ConfigError::Invalid(format!("CLEANUP_CRON {:?} is invalid: {}", self.cleanup_cron, e)))
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_count: self.worker_count,
            max_queue_depth: self.max_queue_depth,
            subscriber_buffer: self.subscriber_buffer,
            retry: RetryPolicy {
                convert: self.convert_max_retries,
                compress: self.compress_max_retries,
            },
        }
    }
}

fn required(key: EnvKey) -> Result<String, ConfigError> {
    let name = key.as_str();
    env::get(key).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: FromStr>(key: EnvKey, default: T) -> Result<T, ConfigError> {
    env::get_parsed(key, default).map_err(ConfigError::Invalid)
}
