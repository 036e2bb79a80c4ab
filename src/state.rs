//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. The
//! backends sit behind trait objects so the memory and Postgres stores, and
//! the filesystem and memory blob stores, are interchangeable at startup.
//!
//! Chat mutations publish a [`ChatEvent`] on a broadcast channel; websocket
//! listeners re-read their snapshot when one arrives.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::mail::Mailer;
use crate::store::Store;

const CHAT_EVENT_CAPACITY: usize = 256;

/// Something changed in `channel_id` (new, edited or deleted message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub channel_id: String,
}

// =============================================================================
// UPLOAD TRACKER
// =============================================================================

/// Per-user "upload in flight" flags. At most one avatar upload per user.
#[derive(Clone, Default)]
pub struct UploadTracker {
    active: Arc<Mutex<HashSet<Uuid>>>,
}

impl UploadTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an upload as started. `None` if one is already running for `uid`.
    #[must_use]
    pub fn begin(&self, uid: Uuid) -> Option<UploadGuard> {
        let mut active = self.active.lock().ok()?;
        if !active.insert(uid) {
            return None;
        }
        Some(UploadGuard { active: Arc::clone(&self.active), uid })
    }

    #[must_use]
    pub fn is_uploading(&self, uid: Uuid) -> bool {
        self.active.lock().is_ok_and(|active| active.contains(&uid))
    }
}

/// Clears the in-flight flag when dropped, on success and failure alike.
pub struct UploadGuard {
    active: Arc<Mutex<HashSet<Uuid>>>,
    uid: Uuid,
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.uid);
        }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
    pub chat_events: broadcast::Sender<ChatEvent>,
    pub uploads: UploadTracker,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, mailer: Arc<dyn Mailer>, config: Config) -> Self {
        let (chat_events, _) = broadcast::channel(CHAT_EVENT_CAPACITY);
        Self { store, blobs, mailer, config: Arc::new(config), chat_events, uploads: UploadTracker::new() }
    }

    /// Notify listeners; having none is not an error.
    pub fn publish_chat_event(&self, channel_id: &str) {
        let _ = self.chat_events.send(ChatEvent { channel_id: channel_id.to_owned() });
    }
}

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
