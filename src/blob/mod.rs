//! Blob storage for avatars and chat media.
//!
//! DESIGN
//! ======
//! Uploads are resumable in the sense the dashboard cares about: bytes are
//! written in fixed-size chunks and the caller's progress callback fires once
//! per chunk with the running total. The blob becomes visible at its path only
//! after the last chunk lands, so readers never observe a partial object.
//!
//! Download URLs carry a content-derived `v=` query parameter. Re-uploading
//! different bytes to the same path yields a new URL, which busts caches that
//! keyed on the old one.

pub mod fs;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::services::session::bytes_to_hex;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("invalid blob path: {0:?}")]
    InvalidPath(String),
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob storage unavailable: {0}")]
    Unavailable(String),
}

/// Relative, slash-separated object key. Never absolute, never escapes the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobPath(String);

impl BlobPath {
    /// # Errors
    ///
    /// Returns [`BlobError::InvalidPath`] for empty, absolute or traversing paths.
    pub fn parse(raw: &str) -> Result<Self, BlobError> {
        let valid = !raw.is_empty()
            && !raw.starts_with('/')
            && !raw.contains('\\')
            && raw
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
        if valid { Ok(Self(raw.to_owned())) } else { Err(BlobError::InvalidPath(raw.to_owned())) }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed per-user avatar location. Each upload overwrites the previous one.
#[must_use]
pub fn avatar_path(uid: Uuid) -> BlobPath {
    BlobPath(format!("profile_pictures/{uid}/profile.png"))
}

#[must_use]
pub fn chat_media_path(channel_id: &str, message_id: Uuid, extension: &str) -> BlobPath {
    let channel: String = channel_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    BlobPath(format!("chat_media/{channel}/{message_id}.{extension}"))
}

/// Running upload totals reported after each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completion in percent, 0.0..=100.0.
    #[must_use]
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.bytes_transferred as f64 / self.total_bytes as f64;
        ratio * 100.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub path: BlobPath,
    pub size: u64,
    pub content_type: String,
    /// Short content hash used as the download URL version.
    pub version: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `path` chunk by chunk, invoking `on_progress` after each chunk.
    async fn upload_resumable(
        &self,
        path: &BlobPath,
        bytes: &[u8],
        content_type: &str,
        on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
    ) -> Result<BlobMeta, BlobError>;

    /// Public, cache-busting URL for a stored blob.
    async fn download_url(&self, path: &BlobPath) -> Result<String, BlobError>;
}

pub(crate) fn content_version(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    bytes_to_hex(&digest[..6])
}

pub(crate) fn public_url(base_url: &str, path: &BlobPath, version: &str) -> String {
    format!("{base_url}/blobs/{path}?v={version}")
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
