//! Domain records shared by the store back-ends, services and routes.
//!
//! Timestamps serialize as RFC 3339 strings on the wire.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// USERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Agent,
    Closer,
    Manager,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Closer => "closer",
            Self::Manager => "manager",
            Self::Admin => "admin",
        }
    }

    /// Parse a stored role. Unknown values fall back to `agent`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "closer" => Self::Closer,
            "manager" => Self::Manager,
            "admin" => Self::Admin,
            _ => Self::Agent,
        }
    }

    /// Roles whose profile is mirrored into the `closers` collection.
    #[must_use]
    pub fn has_mirror_record(self) -> bool {
        matches!(self, Self::Closer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: Uuid,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub team_id: Option<String>,
    pub avatar_url: Option<String>,
}

impl User {
    /// Name shown on chat messages when the profile has none.
    #[must_use]
    pub fn sender_name(&self) -> &str {
        if self.display_name.trim().is_empty() { "Unknown User" } else { &self.display_name }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub region_id: String,
}

// =============================================================================
// LEADS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub customer_name: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub scheduled_appointment_time: Option<OffsetDateTime>,
    pub team_id: Option<String>,
    pub status: String,
    /// Fields owned by other parts of the dashboard; passed through untouched.
    #[serde(default)]
    pub extra: serde_json::Value,
}

// =============================================================================
// CHAT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Region,
    Team,
}

impl ChannelKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Team => "team",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "region" => Some(Self::Region),
            "team" => Some(Self::Team),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChannel {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    /// Region or team the channel is scoped to.
    pub scope_id: String,
    pub member_count: i64,
    pub last_message_content: Option<String>,
    pub last_message_sender: Option<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_message_at: Option<OffsetDateTime>,
}

impl ChatChannel {
    /// Deterministic channel id for a region or team scope.
    #[must_use]
    pub fn id_for(kind: ChannelKind, scope_id: &str) -> String {
        format!("{}-{scope_id}", kind.as_str())
    }

    #[must_use]
    pub fn new(kind: ChannelKind, scope_id: &str, name: impl Into<String>) -> Self {
        Self {
            id: Self::id_for(kind, scope_id),
            name: name.into(),
            kind,
            scope_id: scope_id.to_owned(),
            member_count: 0,
            last_message_content: None,
            last_message_sender: None,
            last_message_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Gif,
    Sticker,
}

impl MessageType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Gif => "gif",
            Self::Sticker => "sticker",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "image" => Self::Image,
            "gif" => Self::Gif,
            "sticker" => Self::Sticker,
            _ => Self::Text,
        }
    }
}

/// Display hints captured client-side before a media message is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub width: u32,
    pub height: u32,
    pub file_name: String,
    pub alt_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub channel_id: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub sender_avatar: Option<String>,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
    pub media_metadata: Option<MediaMetadata>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub edited_at: Option<OffsetDateTime>,
    pub reply_to: Option<Uuid>,
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub new_leads: bool,
    pub appointment_reminders: bool,
    pub team_updates: bool,
    pub chat_messages: bool,
    #[serde(default)]
    pub device_tokens: Vec<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            new_leads: true,
            appointment_reminders: true,
            team_updates: true,
            chat_messages: false,
            device_tokens: Vec::new(),
        }
    }
}
