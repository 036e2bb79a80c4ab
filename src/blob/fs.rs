//! Filesystem blob store rooted at `BLOB_ROOT`.
//!
//! Chunks are appended to `<path>.part` and the file is renamed into place
//! after the final chunk. The router serves the same root under `/blobs`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{content_version, public_url, BlobError, BlobMeta, BlobPath, BlobStore, UploadProgress};

pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
    chunk_bytes: usize,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>, chunk_bytes: usize) -> Self {
        Self { root: root.into(), base_url: base_url.into(), chunk_bytes: chunk_bytes.max(1) }
    }

    fn resolve(&self, path: &BlobPath) -> PathBuf {
        path.as_str()
            .split('/')
            .fold(self.root.clone(), |acc, seg| acc.join(seg))
    }

    /// Write `bytes` to `partial` chunk by chunk, then rename it to `target`.
    async fn write_and_commit(
        &self,
        partial: &Path,
        target: &Path,
        bytes: &[u8],
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> std::io::Result<()> {
        let total_bytes = bytes.len() as u64;
        let mut file = tokio::fs::File::create(partial).await?;
        let mut transferred = 0u64;
        for chunk in bytes.chunks(self.chunk_bytes) {
            file.write_all(chunk).await?;
            transferred += chunk.len() as u64;
            on_progress(UploadProgress { bytes_transferred: transferred, total_bytes });
        }
        if bytes.is_empty() {
            on_progress(UploadProgress { bytes_transferred: 0, total_bytes: 0 });
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(partial, target).await
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload_resumable(
        &self,
        path: &BlobPath,
        bytes: &[u8],
        content_type: &str,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<BlobMeta, BlobError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut partial = target.clone().into_os_string();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        let total_bytes = bytes.len() as u64;
        if let Err(e) = self.write_and_commit(&partial, &target, bytes, on_progress).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(%path, error = %cleanup, "failed to remove partial blob");
                }
            }
            return Err(e.into());
        }

        debug!(%path, size = total_bytes, content_type, "blob stored");
        Ok(BlobMeta {
            path: path.clone(),
            size: total_bytes,
            content_type: content_type.to_owned(),
            version: content_version(bytes),
        })
    }

    async fn download_url(&self, path: &BlobPath) -> Result<String, BlobError> {
        let bytes = match tokio::fs::read(self.resolve(path)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlobError::NotFound(path.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(public_url(&self.base_url, path, &content_version(&bytes)))
    }
}

#[cfg(test)]
#[path = "fs_test.rs"]
mod tests;
