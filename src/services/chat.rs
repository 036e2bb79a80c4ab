//! Team and region group chat.
//!
//! DESIGN
//! ======
//! Every user sees exactly two kinds of channel: the channel of their
//! region (from their team, or the default region without one) and, when
//! they have a team, that team's channel. Channel ids are derived from the
//! scope (`region-west`, `team-t42`) and the documents are created on first
//! access.
//!
//! Every mutation returns a fresh re-fetch of the channel's message list and
//! publishes a [`crate::state::ChatEvent`] so websocket listeners refresh too.
//! Callers never patch local state from their own writes.
//!
//! ERROR HANDLING
//! ==============
//! Access to a channel outside the caller's scope is `NotAMember`. Store and
//! blob failures are passed through unchanged; nothing is retried.

use std::io::Cursor;

use image::ImageReader;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::blob::{self, BlobError, UploadProgress};
use crate::frame::ErrorCode;
use crate::model::{ChannelKind, ChatChannel, ChatMessage, MediaMetadata, MessageType, User};
use crate::state::AppState;
use crate::store::{ChatStore, StoreError, UserStore};

/// Largest accepted media attachment.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

const MEDIA_TYPES: &[(&str, &str)] =
    &[("image/jpeg", "jpg"), ("image/png", "png"), ("image/gif", "gif"), ("image/webp", "webp")];

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("channel not available: {0}")]
    NotAMember(String),
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),
    #[error("only the sender can change this message")]
    NotSender,
    #[error("message is empty")]
    EmptyMessage,
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("media exceeds the 5 MB limit ({size} bytes)")]
    MediaTooLarge { size: usize },
    #[error("unreadable image: {0}")]
    Image(#[from] image::ImageError),
    #[error("unreadable image: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotAMember(_) => "E_CHANNEL_FORBIDDEN",
            Self::MessageNotFound(_) => "E_MESSAGE_NOT_FOUND",
            Self::NotSender => "E_NOT_SENDER",
            Self::EmptyMessage => "E_EMPTY_MESSAGE",
            Self::UnsupportedMedia(_) => "E_UNSUPPORTED_MEDIA",
            Self::MediaTooLarge { .. } => "E_MEDIA_TOO_LARGE",
            Self::Image(_) | Self::Io(_) => "E_BAD_IMAGE",
            Self::Blob(_) => "E_BLOB",
            Self::Store(_) => "E_STORE",
        }
    }
}

/// A channel's messages, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageList {
    pub channel_id: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageDraft {
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<Uuid>,
}

/// An image or GIF picked by the user.
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub file_name: String,
    /// Draft text typed alongside the attachment.
    pub caption: Option<String>,
}

// =============================================================================
// CHANNEL SCOPE
// =============================================================================

/// "north-east" → "North East Region".
fn region_channel_name(region_id: &str) -> String {
    let words: Vec<String> = region_id
        .split(['-', '_', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
            })
        })
        .collect();
    format!("{} Region", words.join(" "))
}

/// The channels `user` may see, region first. Not yet persisted.
async fn scoped_channels(state: &AppState, user: &User) -> Result<Vec<ChatChannel>, ChatError> {
    let team = match user.team_id.as_deref() {
        Some(team_id) => state.store.team(team_id).await?,
        None => None,
    };
    let region = team
        .as_ref()
        .map_or_else(|| state.config.default_region.clone(), |t| t.region_id.clone());

    let mut scoped = vec![ChatChannel::new(ChannelKind::Region, &region, region_channel_name(&region))];
    if let Some(team_id) = user.team_id.as_deref() {
        let name = team.map_or_else(|| team_id.to_owned(), |t| t.name);
        scoped.push(ChatChannel::new(ChannelKind::Team, team_id, name));
    }
    Ok(scoped)
}

/// Ids of the channels visible to `user`.
pub async fn visible_channel_ids(state: &AppState, user: &User) -> Result<Vec<String>, ChatError> {
    Ok(scoped_channels(state, user)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

/// Resolve `channel_id` if it is in the caller's scope, creating it if needed.
async fn member_channel(state: &AppState, user: &User, channel_id: &str) -> Result<ChatChannel, ChatError> {
    let wanted = scoped_channels(state, user)
        .await?
        .into_iter()
        .find(|c| c.id == channel_id);
    let Some(wanted) = wanted else {
        warn!(uid = %user.uid, %channel_id, "chat: channel outside caller scope");
        return Err(ChatError::NotAMember(channel_id.to_owned()));
    };
    Ok(state.store.ensure_channel(&wanted).await?)
}

// =============================================================================
// CHANNELS
// =============================================================================

/// Recompute member counts of every channel.
pub async fn refresh_member_counts(state: &AppState) -> Result<(), ChatError> {
    state
        .store
        .refresh_member_counts(&state.config.default_region)
        .await?;
    debug!("chat: member counts refreshed");
    Ok(())
}

/// The caller's channels, region first, creating missing ones.
pub async fn user_channels(state: &AppState, user: &User) -> Result<Vec<ChatChannel>, ChatError> {
    let mut channels = Vec::new();
    for wanted in scoped_channels(state, user).await? {
        channels.push(state.store.ensure_channel(&wanted).await?);
    }
    // The caller is a member of each of these, so zero means the channel was
    // just created and has never been counted.
    if channels.iter().any(|c| c.member_count == 0) {
        refresh_member_counts(state).await?;
        let mut refreshed = Vec::with_capacity(channels.len());
        for channel in channels {
            refreshed.push(state.store.channel(&channel.id).await?.unwrap_or(channel));
        }
        channels = refreshed;
    }
    Ok(channels)
}

// =============================================================================
// MESSAGES
// =============================================================================

async fn fetch(state: &AppState, channel_id: &str) -> Result<MessageList, ChatError> {
    let messages = state.store.messages(channel_id).await?;
    Ok(MessageList { channel_id: channel_id.to_owned(), messages })
}

pub async fn channel_messages(state: &AppState, user: &User, channel_id: &str) -> Result<MessageList, ChatError> {
    member_channel(state, user, channel_id).await?;
    fetch(state, channel_id).await
}

fn new_message(user: &User, channel_id: &str, content: String, message_type: MessageType) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        channel_id: channel_id.to_owned(),
        sender_id: user.uid,
        sender_name: user.sender_name().to_owned(),
        sender_role: user.role,
        sender_avatar: user.avatar_url.clone(),
        content,
        message_type,
        media_url: None,
        media_metadata: None,
        timestamp: OffsetDateTime::now_utc(),
        edited_at: None,
        reply_to: None,
    }
}

async fn commit(state: &AppState, message: &ChatMessage) -> Result<MessageList, ChatError> {
    state.store.insert_message(message).await?;
    state
        .store
        .set_last_message(&message.channel_id, &message.content, &message.sender_name, message.timestamp)
        .await?;
    state.publish_chat_event(&message.channel_id);
    info!(
        channel_id = %message.channel_id,
        message_id = %message.id,
        sender = %message.sender_id,
        kind = message.message_type.as_str(),
        "chat: message sent"
    );
    fetch(state, &message.channel_id).await
}

pub async fn send_message(
    state: &AppState,
    user: &User,
    channel_id: &str,
    draft: MessageDraft,
) -> Result<MessageList, ChatError> {
    let content = draft.content.trim();
    if content.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    member_channel(state, user, channel_id).await?;

    if let Some(reply_to) = draft.reply_to {
        let parent = state.store.message(reply_to).await?;
        if parent.is_none_or(|m| m.channel_id != channel_id) {
            return Err(ChatError::MessageNotFound(reply_to));
        }
    }

    let mut message = new_message(user, channel_id, content.to_owned(), MessageType::Text);
    message.reply_to = draft.reply_to;
    commit(state, &message).await
}

fn media_extension(content_type: &str) -> Option<&'static str> {
    MEDIA_TYPES
        .iter()
        .find(|(mime, _)| mime.eq_ignore_ascii_case(content_type.trim()))
        .map(|(_, ext)| *ext)
}

/// Validate type and size, then read the pixel dimensions.
///
/// # Errors
///
/// Returns an error for unsupported types, oversize files or undecodable data.
pub fn inspect_media(upload: &MediaUpload) -> Result<(MessageType, &'static str, u32, u32), ChatError> {
    let extension =
        media_extension(&upload.content_type).ok_or_else(|| ChatError::UnsupportedMedia(upload.content_type.clone()))?;
    if upload.bytes.len() > MAX_MEDIA_BYTES {
        return Err(ChatError::MediaTooLarge { size: upload.bytes.len() });
    }
    let (width, height) = ImageReader::new(Cursor::new(&upload.bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    let message_type = if extension == "gif" { MessageType::Gif } else { MessageType::Image };
    Ok((message_type, extension, width, height))
}

pub async fn send_media(
    state: &AppState,
    user: &User,
    channel_id: &str,
    upload: MediaUpload,
) -> Result<MessageList, ChatError> {
    let (message_type, extension, width, height) = inspect_media(&upload)?;
    member_channel(state, user, channel_id).await?;

    let kind = message_type.as_str();
    let content = upload
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map_or_else(|| format!("Shared a {kind}"), str::to_owned);
    let mut message = new_message(user, channel_id, content, message_type);

    let path = blob::chat_media_path(channel_id, message.id, extension);
    let message_id = message.id;
    let on_progress = move |progress: UploadProgress| {
        debug!(%message_id, bytes_transferred = progress.bytes_transferred, total_bytes = progress.total_bytes, "chat media upload progress");
    };
    state
        .blobs
        .upload_resumable(&path, &upload.bytes, &upload.content_type, &on_progress)
        .await?;

    message.media_url = Some(state.blobs.download_url(&path).await?);
    message.media_metadata = Some(MediaMetadata {
        width,
        height,
        file_name: upload.file_name,
        alt_text: format!("{kind} shared by {}", user.sender_name()),
    });
    commit(state, &message).await
}

/// Load a message the caller sent, in a channel the caller can still see.
async fn own_message(state: &AppState, user: &User, message_id: Uuid) -> Result<ChatMessage, ChatError> {
    let message = state
        .store
        .message(message_id)
        .await?
        .ok_or(ChatError::MessageNotFound(message_id))?;
    member_channel(state, user, &message.channel_id).await?;
    if message.sender_id != user.uid {
        warn!(uid = %user.uid, %message_id, "chat: change attempted by non-sender");
        return Err(ChatError::NotSender);
    }
    Ok(message)
}

/// Replace the text of one's own message. Empty or unchanged text is a no-op.
pub async fn edit_message(
    state: &AppState,
    user: &User,
    message_id: Uuid,
    content: &str,
) -> Result<MessageList, ChatError> {
    let message = own_message(state, user, message_id).await?;
    let content = content.trim();
    if content.is_empty() || content == message.content {
        debug!(%message_id, "chat: edit skipped, content empty or unchanged");
        return fetch(state, &message.channel_id).await;
    }

    state
        .store
        .update_message_content(message_id, content, OffsetDateTime::now_utc())
        .await?;
    state.publish_chat_event(&message.channel_id);
    info!(channel_id = %message.channel_id, %message_id, "chat: message edited");
    fetch(state, &message.channel_id).await
}

pub async fn delete_message(state: &AppState, user: &User, message_id: Uuid) -> Result<MessageList, ChatError> {
    let message = own_message(state, user, message_id).await?;
    state.store.delete_message(message_id).await?;
    state.publish_chat_event(&message.channel_id);
    info!(channel_id = %message.channel_id, %message_id, "chat: message deleted");
    fetch(state, &message.channel_id).await
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
