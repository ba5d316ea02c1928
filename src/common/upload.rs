use axum::body::Bytes;
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use thiserror::Error;
use tracing::{error, info};

use crate::infrastructure::storage::local::LocalWriter;
use crate::infrastructure::storage::s3::S3Storage;
use crate::infrastructure::storage::{StorageError, StorageService, validate_key};

// Minimum part size for S3 is 5MB. We use 6MB to be safe.
const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Upload stream interrupted: {0}")]
    Interrupted(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub struct MultipartUploader<'a> {
    storage: &'a S3Storage,
    key: String,
    upload_id: String,
    parts: Vec<aws_sdk_s3::types::CompletedPart>,
    part_number: i32,
    buffer: Vec<u8>,
}

impl<'a> MultipartUploader<'a> {
    pub async fn new(storage: &'a S3Storage, key: String, content_type: &str) -> Result<Self, StorageError> {
        let upload_id = storage.create_multipart_upload(&key, content_type).await?;

        Ok(Self {
            storage,
            key,
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn flush_part(&mut self) -> Result<(), StorageError> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let body = Bytes::from(std::mem::replace(&mut self.buffer, Vec::with_capacity(MIN_PART_SIZE)));

        let part = self
            .storage
            .upload_part(&self.key, &self.upload_id, self.part_number, body)
            .await?;

        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    pub async fn finish(mut self) -> Result<(), StorageError> {
        // Upload remaining buffer as last part
        if !self.buffer.is_empty() {
            self.flush_part().await?;
        }

        self.storage
            .complete_multipart_upload(&self.key, &self.upload_id, self.parts)
            .await
    }

    pub async fn abort(&self) -> Result<(), StorageError> {
        self.storage
            .abort_multipart_upload(&self.key, &self.upload_id)
            .await
    }
}

enum UploadSink<'a> {
    Local(LocalWriter),
    S3(MultipartUploader<'a>),
}

impl<'a> UploadSink<'a> {
    async fn open(storage: &'a StorageService, key: &str, content_type: &str) -> Result<Self, StorageError> {
        match storage {
            StorageService::Local(local) => Ok(UploadSink::Local(local.writer(key).await?)),
            StorageService::S3(s3) => Ok(UploadSink::S3(
                MultipartUploader::new(s3, key.to_string(), content_type).await?,
            )),
        }
    }

    async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), StorageError> {
        match self {
            UploadSink::Local(writer) => writer.write(&chunk).await,
            UploadSink::S3(uploader) => uploader.write_chunk(chunk).await,
        }
    }

    async fn finish(self) -> Result<(), StorageError> {
        match self {
            UploadSink::Local(writer) => writer.finish().await,
            UploadSink::S3(uploader) => uploader.finish().await,
        }
    }

    async fn abort(self) {
        let result = match self {
            UploadSink::Local(writer) => {
                writer.abort().await;
                Ok(())
            }
            UploadSink::S3(uploader) => uploader.abort().await,
        };
        if let Err(e) = result {
            error!("Failed to abort upload: {}", e);
        }
    }
}

/// Streams a request body into storage under `key` without buffering the
/// whole file. Returns the number of bytes stored.
///
/// Anything over `max_bytes` or an empty body is rejected and the partial
/// object is discarded.
pub async fn stream_to_storage<S, E>(
    storage: &StorageService,
    body: S,
    key: &str,
    content_type: &str,
    max_bytes: u64,
) -> Result<u64, UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Display,
{
    validate_key(key)?;
    let mut body = std::pin::pin!(body);
    let mut sink = UploadSink::open(storage, key, content_type).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Stream error: {}", e);
                sink.abort().await;
                return Err(UploadError::Interrupted(e.to_string()));
            }
        };

        written += chunk.len() as u64;
        if written > max_bytes {
            sink.abort().await;
            return Err(UploadError::TooLarge { limit: max_bytes });
        }

        if let Err(e) = sink.write_chunk(chunk).await {
            error!("Upload error: {}", e);
            sink.abort().await;
            return Err(e.into());
        }
    }

    if written == 0 {
        sink.abort().await;
        return Err(UploadError::Empty);
    }

    sink.finish().await?;
    info!(key, bytes = written, "⬆️ Upload stored");
    Ok(written)
}
