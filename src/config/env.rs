use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    WorkerCount,
    MaxQueueDepth,
    ConvertMaxRetries,
    CompressMaxRetries,
    SubscriberBuffer,
    MaxUploadBytes,
    StorageBackend,
    StorageDir,
    MinioUrl,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    CleanupCron,
    RetentionSecs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::WorkerCount => "WORKER_COUNT",
            EnvKey::MaxQueueDepth => "MAX_QUEUE_DEPTH",
            EnvKey::ConvertMaxRetries => "CONVERT_MAX_RETRIES",
            EnvKey::CompressMaxRetries => "COMPRESS_MAX_RETRIES",
            EnvKey::SubscriberBuffer => "SUBSCRIBER_BUFFER",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::StorageBackend => "STORAGE_BACKEND",
            EnvKey::StorageDir => "STORAGE_DIR",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::CleanupCron => "CLEANUP_CRON",
            EnvKey::RetentionSecs => "RETENTION_SECS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Parses the variable, falling back to `default` when it is unset. A value
/// that is set but unparsable is an error rather than silently ignored.
pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> Result<T, String> {
    let name = key.as_str();
    match get(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|_| format!("{} has an invalid value: {:?}", name, val)),
        Err(_) => Ok(default),
    }
}
