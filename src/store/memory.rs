//! In-process document store.
//!
//! Backs `LEADFLOW_BACKEND=memory` and the service tests. All collections
//! live behind one `RwLock`; write failures can be injected to exercise
//! the transport-error paths of the flows above it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatStore, Credentials, LeadStore, NotificationStore, SessionStore, StoreError, UserStore};
use crate::model::{ChannelKind, ChatChannel, ChatMessage, Lead, NotificationSettings, Team, User};

#[derive(Debug, Clone, Default)]
struct CloserDoc {
    name: String,
    avatar_url: Option<String>,
}

#[derive(Default)]
struct Collections {
    users: HashMap<Uuid, (User, Option<String>)>,
    closers: HashMap<Uuid, CloserDoc>,
    teams: HashMap<String, Team>,
    sessions: HashMap<String, (Uuid, OffsetDateTime)>,
    reset_tokens: HashMap<String, (Uuid, OffsetDateTime)>,
    channels: HashMap<String, ChatChannel>,
    /// Insertion order; reads sort by timestamp.
    messages: Vec<ChatMessage>,
    leads: Vec<Lead>,
    notifications: HashMap<Uuid, NotificationSettings>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    write_failure: Mutex<Option<String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent document write fail with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.write_failure.lock() {
            *slot = Some(message.into());
        }
    }

    /// Undo [`MemoryStore::fail_writes`].
    pub fn restore_writes(&self) {
        if let Ok(mut slot) = self.write_failure.lock() {
            *slot = None;
        }
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        match self.write_failure.lock() {
            Ok(slot) => match slot.as_ref() {
                Some(message) => Err(StoreError::Unavailable(message.clone())),
                None => Ok(()),
            },
            Err(_) => Err(StoreError::Unavailable("memory store poisoned".into())),
        }
    }
}

fn region_of(user: &User, teams: &HashMap<String, Team>, default_region: &str) -> String {
    user.team_id
        .as_deref()
        .and_then(|team_id| teams.get(team_id))
        .map_or_else(|| default_region.to_owned(), |team| team.region_id.clone())
}

// =============================================================================
// USERS
// =============================================================================

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User, password_hash: Option<&str>) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let email_taken = inner
            .users
            .values()
            .any(|(existing, _)| existing.email.eq_ignore_ascii_case(&user.email));
        if inner.users.contains_key(&user.uid) || email_taken {
            return Err(StoreError::Conflict { collection: "users", id: user.uid.to_string() });
        }
        inner
            .users
            .insert(user.uid, (user.clone(), password_hash.map(str::to_owned)));
        Ok(())
    }

    async fn user(&self, uid: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&uid).map(|(user, _)| user.clone()))
    }

    async fn credentials_by_email(&self, email: &str) -> Result<Option<Credentials>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|(user, _)| user.email.eq_ignore_ascii_case(email))
            .map(|(user, hash)| Credentials { user: user.clone(), password_hash: hash.clone() }))
    }

    async fn set_display_name(&self, uid: Uuid, display_name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let (user, _) = inner
            .users
            .get_mut(&uid)
            .ok_or_else(|| StoreError::not_found("users", uid))?;
        display_name.clone_into(&mut user.display_name);
        Ok(())
    }

    async fn set_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let (user, _) = inner
            .users
            .get_mut(&uid)
            .ok_or_else(|| StoreError::not_found("users", uid))?;
        user.avatar_url = Some(avatar_url.to_owned());
        Ok(())
    }

    async fn set_password_hash(&self, uid: Uuid, password_hash: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let (_, hash) = inner
            .users
            .get_mut(&uid)
            .ok_or_else(|| StoreError::not_found("users", uid))?;
        *hash = Some(password_hash.to_owned());
        Ok(())
    }

    async fn closer_exists(&self, uid: Uuid) -> Result<bool, StoreError> {
        Ok(self.inner.read().await.closers.contains_key(&uid))
    }

    async fn insert_closer(&self, uid: Uuid, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner
            .write()
            .await
            .closers
            .insert(uid, CloserDoc { name: name.to_owned(), avatar_url: None });
        Ok(())
    }

    async fn set_closer_name(&self, uid: Uuid, name: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let closer = inner
            .closers
            .get_mut(&uid)
            .ok_or_else(|| StoreError::not_found("closers", uid))?;
        name.clone_into(&mut closer.name);
        Ok(())
    }

    async fn set_closer_avatar_url(&self, uid: Uuid, avatar_url: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let closer = inner
            .closers
            .get_mut(&uid)
            .ok_or_else(|| StoreError::not_found("closers", uid))?;
        closer.avatar_url = Some(avatar_url.to_owned());
        Ok(())
    }

    async fn upsert_team(&self, team: &Team) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner
            .write()
            .await
            .teams
            .insert(team.id.clone(), team.clone());
        Ok(())
    }

    async fn team(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        Ok(self.inner.read().await.teams.get(team_id).cloned())
    }
}

// =============================================================================
// SESSIONS
// =============================================================================

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, token: &str, uid: Uuid, expires_at: OffsetDateTime) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .sessions
            .insert(token.to_owned(), (uid, expires_at));
        Ok(())
    }

    async fn session_user(&self, token: &str, now: OffsetDateTime) -> Result<Option<User>, StoreError> {
        let inner = self.inner.read().await;
        let Some((uid, expires_at)) = inner.sessions.get(token) else {
            return Ok(None);
        };
        if *expires_at <= now {
            return Ok(None);
        }
        Ok(inner.users.get(uid).map(|(user, _)| user.clone()))
    }

    async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        self.inner.write().await.sessions.remove(token);
        Ok(())
    }

    async fn delete_user_sessions(&self, uid: Uuid) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|_, (owner, _)| *owner != uid);
        Ok((before - inner.sessions.len()) as u64)
    }

    async fn create_reset_token(
        &self,
        token_hash: &str,
        uid: Uuid,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.reset_tokens.retain(|_, (owner, _)| *owner != uid);
        inner
            .reset_tokens
            .insert(token_hash.to_owned(), (uid, expires_at));
        Ok(())
    }

    async fn consume_reset_token(&self, token_hash: &str, now: OffsetDateTime) -> Result<Option<Uuid>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .reset_tokens
            .remove(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(uid, _)| uid))
    }
}

// =============================================================================
// CHAT
// =============================================================================

#[async_trait]
impl ChatStore for MemoryStore {
    async fn channel(&self, channel_id: &str) -> Result<Option<ChatChannel>, StoreError> {
        Ok(self.inner.read().await.channels.get(channel_id).cloned())
    }

    async fn ensure_channel(&self, channel: &ChatChannel) -> Result<ChatChannel, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let stored = inner
            .channels
            .entry(channel.id.clone())
            .or_insert_with(|| channel.clone());
        Ok(stored.clone())
    }

    async fn refresh_member_counts(&self, default_region: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let Collections { users, teams, channels, .. } = &mut *inner;
        for channel in channels.values_mut() {
            let count = users
                .values()
                .filter(|(user, _)| match channel.kind {
                    ChannelKind::Region => region_of(user, teams, default_region) == channel.scope_id,
                    ChannelKind::Team => user.team_id.as_deref() == Some(channel.scope_id.as_str()),
                })
                .count();
            channel.member_count = i64::try_from(count).unwrap_or(i64::MAX);
        }
        Ok(())
    }

    async fn messages(&self, channel_id: &str) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let mut messages: Vec<ChatMessage> = inner
            .messages
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    async fn message(&self, message_id: Uuid) -> Result<Option<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        if !inner.channels.contains_key(&message.channel_id) {
            return Err(StoreError::not_found("chat_channels", &message.channel_id));
        }
        inner.messages.push(message.clone());
        Ok(())
    }

    async fn update_message_content(
        &self,
        message_id: Uuid,
        content: &str,
        edited_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| StoreError::not_found("chat_messages", message_id))?;
        content.clone_into(&mut message.content);
        message.edited_at = Some(edited_at);
        Ok(())
    }

    async fn delete_message(&self, message_id: Uuid) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let before = inner.messages.len();
        inner.messages.retain(|m| m.id != message_id);
        if inner.messages.len() == before {
            return Err(StoreError::not_found("chat_messages", message_id));
        }
        Ok(())
    }

    async fn set_last_message(
        &self,
        channel_id: &str,
        content: &str,
        sender: &str,
        at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let channel = inner
            .channels
            .get_mut(channel_id)
            .ok_or_else(|| StoreError::not_found("chat_channels", channel_id))?;
        channel.last_message_content = Some(content.to_owned());
        channel.last_message_sender = Some(sender.to_owned());
        channel.last_message_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// LEADS
// =============================================================================

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<(), StoreError> {
        self.check_writable()?;
        self.inner.write().await.leads.push(lead.clone());
        Ok(())
    }

    async fn scheduled_leads(
        &self,
        team_id: Option<&str>,
        from: OffsetDateTime,
        until: OffsetDateTime,
    ) -> Result<Vec<Lead>, StoreError> {
        let inner = self.inner.read().await;
        let mut leads: Vec<Lead> = inner
            .leads
            .iter()
            .filter(|lead| team_id.is_none_or(|team| lead.team_id.as_deref() == Some(team)))
            .filter(|lead| {
                lead.scheduled_appointment_time
                    .is_some_and(|at| at >= from && at < until)
            })
            .cloned()
            .collect();
        leads.sort_by_key(|lead| lead.scheduled_appointment_time);
        Ok(leads)
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn notification_settings(&self, uid: Uuid) -> Result<Option<NotificationSettings>, StoreError> {
        Ok(self.inner.read().await.notifications.get(&uid).cloned())
    }

    async fn put_notification_settings(&self, uid: Uuid, settings: &NotificationSettings) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let entry = inner.notifications.entry(uid).or_default();
        let devices = std::mem::take(&mut entry.device_tokens);
        *entry = NotificationSettings { device_tokens: devices, ..settings.clone() };
        Ok(())
    }

    async fn add_device_token(&self, uid: Uuid, token: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let entry = inner.notifications.entry(uid).or_default();
        if !entry.device_tokens.iter().any(|t| t == token) {
            entry.device_tokens.push(token.to_owned());
        }
        Ok(())
    }

    async fn remove_device_token(&self, uid: Uuid, token: &str) -> Result<bool, StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.write().await;
        let Some(entry) = inner.notifications.get_mut(&uid) else {
            return Ok(false);
        };
        let before = entry.device_tokens.len();
        entry.device_tokens.retain(|t| t != token);
        Ok(entry.device_tokens.len() != before)
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
