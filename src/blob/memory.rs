//! In-process blob store for dev mode and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{content_version, public_url, BlobError, BlobMeta, BlobPath, BlobStore, UploadProgress};

pub struct MemoryBlobStore {
    base_url: String,
    chunk_bytes: usize,
    blobs: RwLock<HashMap<BlobPath, (Vec<u8>, String)>>,
    failure: Mutex<Option<String>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>, chunk_bytes: usize) -> Self {
        Self {
            base_url: base_url.into(),
            chunk_bytes: chunk_bytes.max(1),
            blobs: RwLock::new(HashMap::new()),
            failure: Mutex::new(None),
        }
    }

    /// Fail every later upload with `message`.
    pub fn fail_uploads(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.failure.lock() {
            *slot = Some(message.into());
        }
    }

    /// Stored bytes and content type, if any.
    pub async fn get(&self, path: &BlobPath) -> Option<(Vec<u8>, String)> {
        self.blobs.read().await.get(path).cloned()
    }

    fn injected_failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|slot| slot.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_resumable(
        &self,
        path: &BlobPath,
        bytes: &[u8],
        content_type: &str,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<BlobMeta, BlobError> {
        if let Some(message) = self.injected_failure() {
            return Err(BlobError::Unavailable(message));
        }
        let total_bytes = bytes.len() as u64;
        let mut staged = Vec::with_capacity(bytes.len());
        for chunk in bytes.chunks(self.chunk_bytes) {
            staged.extend_from_slice(chunk);
            on_progress(UploadProgress { bytes_transferred: staged.len() as u64, total_bytes });
        }
        if bytes.is_empty() {
            on_progress(UploadProgress { bytes_transferred: 0, total_bytes: 0 });
        }
        self.blobs
            .write()
            .await
            .insert(path.clone(), (staged, content_type.to_owned()));
        Ok(BlobMeta {
            path: path.clone(),
            size: total_bytes,
            content_type: content_type.to_owned(),
            version: content_version(bytes),
        })
    }

    async fn download_url(&self, path: &BlobPath) -> Result<String, BlobError> {
        let blobs = self.blobs.read().await;
        let (bytes, _) = blobs
            .get(path)
            .ok_or_else(|| BlobError::NotFound(path.to_string()))?;
        Ok(public_url(&self.base_url, path, &content_version(bytes)))
    }
}
