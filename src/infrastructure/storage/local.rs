use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::{ByteReader, StorageError};

/// Filesystem backend rooted at one directory. Keys map to relative paths.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub async fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!("✅ Local storage ready at {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn not_found(key: &str, err: std::io::Error) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(err)
        }
    }

    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let mut writer = self.writer(key).await?;
        if let Err(e) = writer.write(&data).await {
            writer.abort().await;
            return Err(e);
        }
        writer.finish().await
    }

    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        fs::read(self.path(key))
            .await
            .map(Bytes::from)
            .map_err(|e| Self::not_found(key, e))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.path(key)).await?)
    }

    pub async fn open(&self, key: &str) -> Result<(ByteReader, u64), StorageError> {
        let file = fs::File::open(self.path(key))
            .await
            .map_err(|e| Self::not_found(key, e))?;
        let len = file.metadata().await?.len();
        Ok((Box::pin(file), len))
    }

    /// Files directly under `prefix` last modified before `cutoff`.
    pub async fn list_older_than(&self, prefix: &str, cutoff: SystemTime) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(self.path(prefix)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_file() || metadata.modified()? >= cutoff {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(format!("{}/{}", prefix.trim_end_matches('/'), name));
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Writer that only becomes visible under `key` once finished.
    pub async fn writer(&self, key: &str) -> Result<LocalWriter, StorageError> {
        let target = self.path(key);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut partial = target.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);
        let file = fs::File::create(&partial).await?;
        Ok(LocalWriter {
            file,
            partial,
            target,
        })
    }
}

pub struct LocalWriter {
    file: fs::File,
    partial: PathBuf,
    target: PathBuf,
}

impl LocalWriter {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StorageError> {
        self.file.write_all(chunk).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<(), StorageError> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        fs::rename(&self.partial, &self.target).await?;
        Ok(())
    }

    pub async fn abort(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.partial).await;
    }
}
