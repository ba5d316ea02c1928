use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::Bytes;
use tracing::info;

use super::{ByteReader, StorageError};

#[derive(Clone, Debug)]
pub struct S3Storage {
    pub client: Client,
    pub bucket: String,
}

fn backend(err: impl std::error::Error) -> StorageError {
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

impl S3Storage {
    pub async fn new(endpoint: &str, bucket: &str, access_key: &str, secret_key: &str) -> Self {
        let credentials = Credentials::new(access_key, secret_key, None, None, "static");

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        let client = Client::from_conf(config);

        info!("✅ Connected to S3 (MinIO) bucket {}", bucket);

        Self {
            client,
            bucket: bucket.to_string(),
        }
    }

    pub async fn put_object(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    pub async fn get_object(&self, key: &str) -> Result<Bytes, StorageError> {
        let (reader, _) = self.fetch(key).await?;
        let data = reader.collect().await.map_err(backend)?;
        Ok(data.into_bytes())
    }

    pub async fn open_object(&self, key: &str) -> Result<(ByteReader, u64), StorageError> {
        let (body, len) = self.fetch(key).await?;
        Ok((Box::pin(body.into_async_read()), len))
    }

    async fn fetch(&self, key: &str) -> Result<(ByteStream, u64), StorageError> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let err = err.into_service_error();
                if err.is_no_such_key() {
                    return Err(StorageError::NotFound(key.to_string()));
                }
                return Err(backend(err));
            }
        };
        let len = output.content_length().unwrap_or(0).max(0) as u64;
        Ok((output.body, len))
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    pub async fn head_object(&self, key: &str) -> Result<bool, StorageError> {
        match self.client.head_object().bucket(&self.bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = err.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(backend(err))
                }
            }
        }
    }

    /// Keys under `prefix` last modified before `cutoff_secs` (unix seconds).
    pub async fn list_older_than(&self, prefix: &str, cutoff_secs: i64) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(backend)?;

            for object in output.contents() {
                let stale = object.last_modified().is_some_and(|at| at.secs() < cutoff_secs);
                if let (true, Some(key)) = (stale, object.key()) {
                    keys.push(key.to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    pub async fn create_multipart_upload(&self, key: &str, content_type: &str) -> Result<String, StorageError> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(backend)?;

        result
            .upload_id
            .ok_or_else(|| StorageError::Backend(format!("No upload id returned for {}", key)))
    }

    pub async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart, StorageError> {
        let result = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(backend)?;

        let e_tag = result
            .e_tag
            .ok_or_else(|| StorageError::Backend(format!("No ETag for part {} of {}", part_number, key)))?;

        Ok(CompletedPart::builder()
            .e_tag(e_tag)
            .part_number(part_number)
            .build())
    }

    pub async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<(), StorageError> {
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(backend)?;

        Ok(())
    }

    pub async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<(), StorageError> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(backend)?;

        Ok(())
    }
}
