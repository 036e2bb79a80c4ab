//! Document and identity back-end seam.
//!
//! DESIGN
//! ======
//! The dashboard treats its backend as a managed document store: per-user
//! profile documents, per-role mirror documents, chat channels/messages,
//! leads and notification settings. Each concern is a small async trait;
//! [`Store`] is the umbrella every back-end implements.
//!
//! - [`pg::PgStore`] maps the documents onto Postgres tables via sqlx.
//! - [`memory::MemoryStore`] keeps everything in process (dev mode, tests).
//!
//! ERROR HANDLING
//! ==============
//! Mutations on a missing document return [`StoreError::NotFound`] so that
//! services can distinguish "nothing to update" from transport failures.
//! No operation retries; the caller surfaces the failure.

pub mod memory;
pub mod pg;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{ChatChannel, ChatMessage, Lead, NotificationSettings, Team, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} document not found: {id}")]
    NotFound { collection: &'static str, id: String },
    #[error("{collection} document already exists: {id}")]
    Conflict { collection: &'static str, id: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn not_found(collection: &'static str, id: impl ToString) -> Self {
        Self::NotFound { collection, id: id.to_string() }
    }
}

/// A user row together with the credential the identity provider holds.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: Option<String>,
}

// =============================================================================
// USERS & MIRRORS
// =============================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User, password_hash: Option<&str>) -> Result<(), StoreError>;

    async fn user(&self, uid: Uuid) -> Result<Option<User>, StoreError>;

    /// Look up by normalized (lowercase) email.
    async fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, StoreError>;

    async fn set_display_name(&self, uid: Uuid, display_name: &str) -> Result<(), StoreError>;

    async fn set_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError>;

    async fn set_password_hash(&self, uid: Uuid, password_hash: &str) -> Result<(), StoreError>;

    async fn closer_exists(&self, uid: Uuid) -> Result<bool, StoreError>;

    async fn insert_closer(&self, uid: Uuid, name: &str) -> Result<(), StoreError>;

    async fn set_closer_name(&self, uid: Uuid, name: &str) -> Result<(), StoreError>;

    async fn set_closer_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError>;

    async fn upsert_team(&self, team: &Team) -> Result<(), StoreError>;

    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError>;
}

// =============================================================================
// SESSIONS & RESET TOKENS
// =============================================================================

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, token: &str, uid: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError>;

    /// Resolve a session token that has not expired at `now`.
    async fn session_user(&self, token: &str, now: OffsetDateTime) -> Result<Option<User>, StoreError>;

    async fn delete_session(&self, token: &str) -> Result<(), StoreError>;

    async fn delete_user_sessions(&self, uid: Uuid) -> Result<u64, StoreError>;

    /// Store a hashed reset token, replacing any outstanding one for the user.
    async fn create_reset_token(
        &self,
        token_hash: &str,
        uid: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Consume a reset token atomically, returning its user if still valid at `now`.
    async fn consume_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<Uuid>, StoreError>;
}

// =============================================================================
// CHAT
// =============================================================================

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChatChannel>, StoreError>;

    /// Insert the channel if absent. Returns the stored channel either way.
    async fn ensure_channel(&self, channel: &ChatChannel) -> Result<ChatChannel, StoreError>;

    /// Recompute `member_count` for every channel. Users without a team count
    /// toward `default_region`.
    async fn refresh_member_counts(&self, default_region: &str) -> Result<(), StoreError>;

    /// All messages of a channel, oldest first.
    async fn messages(&self, channel_id: &str) -> Result<Vec<ChatMessage>, StoreError>;

    async fn message(&self, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError>;

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    async fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn delete_message(&self, message_id: Uuid) -> Result<(), StoreError>;

    async fn set_last_message(
        &self,
        channel_id: &str,
        content: &str,
        sender: &str,
        at: OffsetDateTime,
    ) -> Result<(), StoreError>;
}

// =============================================================================
// LEADS
// =============================================================================

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError>;

    /// Leads whose appointment falls in `[from, until)`, optionally scoped to a team.
    async fn scheduled_leads(
        &self,
        team_id: Option<&str>,
        from: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Lead>, StoreError>;
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn notification_settings(&self, uid: Uuid) -> Result<Option<NotificationSettings>, StoreError>;

    /// Persist preference flags. Device tokens are managed separately.
    async fn put_notification_settings(&self, uid: Uuid, settings: &NotificationSettings) -> Result<(), StoreError>;

    async fn add_device_token(&self, uid: Uuid, token: &str) -> Result<(), StoreError>;

    async fn remove_device_token(&self, uid: Uuid, token: &str) -> Result<bool, StoreError>;
}

/// Everything the dashboard needs from its backend.
pub trait Store: UserStore + SessionStore + ChatStore + LeadStore + NotificationStore {}

impl<T> Store for T where T: UserStore + SessionStore + ChatStore + LeadStore + NotificationStore {}
