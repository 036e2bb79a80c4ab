//! Postgres back-end.
//!
//! Each document collection maps onto one table (see `src/db/migrations`).
//! Queries are runtime-checked (`sqlx::query` + `Row::get`) so the crate
//! builds without a live database.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ChatStore, Credentials, LeadStore, NotificationStore, SessionStore, StoreError, UserStore};
use crate::model::{
    ChannelKind, ChatChannel, ChatMessage, Lead, MediaMetadata, MessageType, NotificationSettings, Role, Team, User,
};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn conflict_or(err: sqlx::Error, collection: &'static str, id: impl ToString) -> StoreError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if unique { StoreError::Conflict { collection, id: id.to_string() } } else { StoreError::Database(err) }
}

fn ensure_affected(rows: u64, collection: &'static str, id: impl ToString) -> Result<(), StoreError> {
    if rows == 0 { Err(StoreError::not_found(collection, id)) } else { Ok(()) }
}

// =============================================================================
// ROW MAPPING
// =============================================================================

const USER_COLUMNS: &str = "uid, display_name, email, role, team_id, avatar_url";

fn user_from_row(row: &PgRow) -> User {
    let role: String = row.get("role");
    User {
        uid: row.get("uid"),
        display_name: row.get("display_name"),
        email: row.get("email"),
        role: Role::parse(&role),
        team_id: row.get("team_id"),
        avatar_url: row.get("avatar_url"),
    }
}

const CHANNEL_COLUMNS: &str =
    "id, name, kind, scope_id, member_count, last_message_content, last_message_sender, last_message_at";

fn channel_from_row(row: &PgRow) -> ChatChannel {
    let kind: String = row.get("kind");
    ChatChannel {
        id: row.get("id"),
        name: row.get("name"),
        kind: ChannelKind::parse(&kind).unwrap_or(ChannelKind::Team),
        scope_id: row.get("scope_id"),
        member_count: row.get("member_count"),
        last_message_content: row.get("last_message_content"),
        last_message_sender: row.get("last_message_sender"),
        last_message_at: row.get("last_message_at"),
    }
}

const MESSAGE_COLUMNS: &str = "id, channel_id, sender_id, sender_name, sender_role, sender_avatar, content, \
                               message_type, media_url, media_metadata, sent_at, edited_at, reply_to";

fn message_from_row(row: &PgRow) -> ChatMessage {
    let sender_role: String = row.get("sender_role");
    let message_type: String = row.get("message_type");
    let metadata: Option<serde_json::Value> = row.get("media_metadata");
    ChatMessage {
        id: row.get("id"),
        channel_id: row.get("channel_id"),
        sender_id: row.get("sender_id"),
        sender_name: row.get("sender_name"),
        sender_role: Role::parse(&sender_role),
        sender_avatar: row.get("sender_avatar"),
        content: row.get("content"),
        message_type: MessageType::parse(&message_type),
        media_url: row.get("media_url"),
        media_metadata: metadata.and_then(|v| serde_json::from_value::<MediaMetadata>(v).ok()),
        timestamp: row.get("sent_at"),
        edited_at: row.get("edited_at"),
        reply_to: row.get("reply_to"),
    }
}

fn lead_from_row(row: &PgRow) -> Lead {
    Lead {
        id: row.get("id"),
        customer_name: row.get("customer_name"),
        scheduled_appointment_time: row.get("scheduled_appointment_time"),
        team_id: row.get("team_id"),
        status: row.get("status"),
        extra: row.get("extra"),
    }
}

// =============================================================================
// USERS
// =============================================================================

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User, password_hash: Option<&str>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (uid, display_name, email, role, team_id, avatar_url, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.uid)
        .bind(&user.display_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.team_id)
        .bind(&user.avatar_url)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "users", user.uid))?;
        Ok(())
    }

    async fn user(&self, uid: Uuid) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, password_hash FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Credentials { user: user_from_row(&r), password_hash: r.get("password_hash") }))
    }

    async fn set_display_name(&self, uid: Uuid, display_name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET display_name = $2 WHERE uid = $1")
            .bind(uid)
            .bind(display_name)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "users", uid)
    }

    async fn set_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET avatar_url = $2 WHERE uid = $1")
            .bind(uid)
            .bind(avatar_url)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "users", uid)
    }

    async fn set_password_hash(&self, uid: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE uid = $1")
            .bind(uid)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "users", uid)
    }

    async fn closer_exists(&self, uid: Uuid) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM closers WHERE uid = $1) AS present")
            .bind(uid)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("present"))
    }

    async fn insert_closer(&self, uid: Uuid, name: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO closers (uid, name) VALUES ($1, $2) ON CONFLICT (uid) DO UPDATE SET name = $2")
            .bind(uid)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_closer_name(&self, uid: Uuid, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE closers SET name = $2 WHERE uid = $1")
            .bind(uid)
            .bind(name)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "closers", uid)
    }

    async fn set_closer_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE closers SET avatar_url = $2 WHERE uid = $1")
            .bind(uid)
            .bind(avatar_url)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "closers", uid)
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO teams (id, name, region_id) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, region_id = EXCLUDED.region_id",
        )
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.region_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        let row = sqlx::query("SELECT id, name, region_id FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| Team { id: r.get("id"), name: r.get("name"), region_id: r.get("region_id") }))
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, token: &str, uid: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sessions (token, uid, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(uid)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn session_user(&self, token: &str, now: OffsetDateTime) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            "SELECT u.uid, u.display_name, u.email, u.role, u.team_id, u.avatar_url
             FROM sessions s
             JOIN users u ON u.uid = s.uid
             WHERE s.token = $1 AND s.expires_at > $2",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(user_from_row))
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_user_sessions(&self, uid: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE uid = $1")
            .bind(uid)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_reset_token(
        &self,
        token_hash: &str,
        uid: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO password_reset_tokens (token_hash, uid, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (uid) DO UPDATE SET token_hash = EXCLUDED.token_hash, expires_at = EXCLUDED.expires_at",
        )
        .bind(token_hash)
        .bind(uid)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query("DELETE FROM password_reset_tokens WHERE token_hash = $1 RETURNING uid, expires_at")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .filter(|r| r.get::<OffsetDateTime, _>("expires_at") > now)
            .map(|r| r.get("uid")))
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[async_trait]
impl ChatStore for PgStore {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChatChannel>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CHANNEL_COLUMNS} FROM chat_channels WHERE id = $1"))
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    async fn ensure_channel(&self, channel: &ChatChannel) -> Result<ChatChannel, StoreError> {
        sqlx::query(
            "INSERT INTO chat_channels (id, name, kind, scope_id) VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&channel.id)
        .bind(&channel.name)
        .bind(channel.kind.as_str())
        .bind(&channel.scope_id)
        .execute(&self.pool)
        .await?;
        self.channel(&channel.id)
            .await?
            .ok_or_else(|| StoreError::not_found("chat_channels", &channel.id))
    }

    async fn refresh_member_counts(&self, default_region: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE chat_channels c SET member_count = (
                 SELECT count(*)
                 FROM users u
                 LEFT JOIN teams t ON t.id = u.team_id
                 WHERE CASE
                     WHEN c.kind = 'team' THEN u.team_id = c.scope_id
                     ELSE COALESCE(t.region_id, $1) = c.scope_id
                 END
             )",
        )
        .bind(default_region)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn messages(&self, channel_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE channel_id = $1 ORDER BY sent_at ASC, id ASC"
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    async fn message(&self, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM chat_messages WHERE id = $1"))
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(message_from_row))
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        let metadata = message
            .media_metadata
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok());
        sqlx::query(
            "INSERT INTO chat_messages
                 (id, channel_id, sender_id, sender_name, sender_role, sender_avatar, content,
                  message_type, media_url, media_metadata, sent_at, edited_at, reply_to)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(message.id)
        .bind(&message.channel_id)
        .bind(message.sender_id)
        .bind(&message.sender_name)
        .bind(message.sender_role.as_str())
        .bind(&message.sender_avatar)
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(&message.media_url)
        .bind(metadata)
        .bind(message.timestamp)
        .bind(message.edited_at)
        .bind(message.reply_to)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE chat_messages SET content = $2, edited_at = $3 WHERE id = $1")
            .bind(message_id)
            .bind(content)
            .bind(edited_at)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "chat_messages", message_id)
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        ensure_affected(result.rows_affected(), "chat_messages", message_id)
    }

    async fn set_last_message(
        &self,
        channel_id: &str,
        content: &str,
        sender: &str,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE chat_channels
             SET last_message_content = $2, last_message_sender = $3, last_message_at = $4
             WHERE id = $1",
        )
        .bind(channel_id)
        .bind(content)
        .bind(sender)
        .bind(at)
        .execute(&self.pool)
        .await?;
        ensure_affected(result.rows_affected(), "chat_channels", channel_id)
    }
}

// =============================================================================
// LEADS
// =============================================================================

#[async_trait]
impl LeadStore for PgStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO leads (id, customer_name, scheduled_appointment_time, team_id, status, extra)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&lead.id)
        .bind(&lead.customer_name)
        .bind(lead.scheduled_appointment_time)
        .bind(&lead.team_id)
        .bind(&lead.status)
        .bind(&lead.extra)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, "leads", &lead.id))?;
        Ok(())
    }

    async fn scheduled_leads(
        &self,
        team_id: Option<&str>,
        from: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Lead>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, customer_name, scheduled_appointment_time, team_id, status, extra
             FROM leads
             WHERE scheduled_appointment_time >= $1
               AND scheduled_appointment_time < $2
               AND ($3::text IS NULL OR team_id = $3)
             ORDER BY scheduled_appointment_time ASC, id ASC",
        )
        .bind(from)
        .bind(until)
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(lead_from_row).collect())
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[async_trait]
impl NotificationStore for PgStore {
    async fn notification_settings(&self, uid: Uuid) -> Result<Option<NotificationSettings>, StoreError> {
        let row = sqlx::query(
            "SELECT enabled, new_leads, appointment_reminders, team_updates, chat_messages
             FROM notification_settings WHERE uid = $1",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;
        let device_tokens: Vec<String> =
            sqlx::query("SELECT token FROM notification_devices WHERE uid = $1 ORDER BY created_at ASC")
                .bind(uid)
                .fetch_all(&self.pool)
                .await?
                .iter()
                .map(|r| r.get("token"))
                .collect();

        let settings = match row {
            Some(r) => NotificationSettings {
                enabled: r.get("enabled"),
                new_leads: r.get("new_leads"),
                appointment_reminders: r.get("appointment_reminders"),
                team_updates: r.get("team_updates"),
                chat_messages: r.get("chat_messages"),
                device_tokens,
            },
            None if device_tokens.is_empty() => return Ok(None),
            None => NotificationSettings { device_tokens, ..NotificationSettings::default() },
        };
        Ok(Some(settings))
    }

    async fn put_notification_settings(&self, uid: Uuid, settings: &NotificationSettings) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO notification_settings
                 (uid, enabled, new_leads, appointment_reminders, team_updates, chat_messages)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (uid) DO UPDATE SET
                 enabled = EXCLUDED.enabled,
                 new_leads = EXCLUDED.new_leads,
                 appointment_reminders = EXCLUDED.appointment_reminders,
                 team_updates = EXCLUDED.team_updates,
                 chat_messages = EXCLUDED.chat_messages",
        )
        .bind(uid)
        .bind(settings.enabled)
        .bind(settings.new_leads)
        .bind(settings.appointment_reminders)
        .bind(settings.team_updates)
        .bind(settings.chat_messages)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_device_token(&self, uid: Uuid, token: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO notification_devices (uid, token) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(uid)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_device_token(&self, uid: Uuid, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM notification_devices WHERE uid = $1 AND token = $2")
            .bind(uid)
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[path = "pg_test.rs"]
mod tests;
