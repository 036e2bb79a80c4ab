//! Team/region group-chat widget state.
//!
//! DESIGN
//! ======
//! `ChatWidget` owns the channel list, the active channel, its messages and
//! the compose draft. Switching channels clears the message list before the
//! fetch, so a channel with no messages renders the empty state instead of
//! the previous channel's history. Sending text clears the draft before the
//! call; sending media uses the draft as caption and clears it on success.
//!
//! A response is applied only if it belongs to the channel that is active
//! when it arrives.

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::model::{ChannelKind, ChatChannel, ChatMessage, User};
use crate::services::chat::{self, ChatError, MediaUpload, MessageDraft, MessageList};
use crate::state::AppState;

pub const EMPTY_TITLE: &str = "Start the group conversation";

/// Backend calls the widget needs, scoped to the signed-in user.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn refresh_member_counts(&self) -> Result<(), ChatError>;
    async fn user_channels(&self) -> Result<Vec<ChatChannel>, ChatError>;
    async fn channel_messages(&self, channel_id: &str) -> Result<MessageList, ChatError>;
    async fn send_text(&self, channel_id: &str, draft: MessageDraft) -> Result<MessageList, ChatError>;
    async fn send_media(&self, channel_id: &str, upload: MediaUpload) -> Result<MessageList, ChatError>;
    async fn edit(&self, message_id: Uuid, content: &str) -> Result<MessageList, ChatError>;
    async fn delete(&self, message_id: Uuid) -> Result<MessageList, ChatError>;
}

/// [`ChatApi`] backed directly by the chat service.
pub struct LocalChatApi {
    state: AppState,
    user: User,
}

impl LocalChatApi {
    #[must_use]
    pub fn new(state: AppState, user: User) -> Self {
        Self { state, user }
    }
}

#[async_trait]
impl ChatApi for LocalChatApi {
    async fn refresh_member_counts(&self) -> Result<(), ChatError> {
        chat::refresh_member_counts(&self.state).await
    }

    async fn user_channels(&self) -> Result<Vec<ChatChannel>, ChatError> {
        chat::user_channels(&self.state, &self.user).await
    }

    async fn channel_messages(&self, channel_id: &str) -> Result<MessageList, ChatError> {
        chat::channel_messages(&self.state, &self.user, channel_id).await
    }

    async fn send_text(&self, channel_id: &str, draft: MessageDraft) -> Result<MessageList, ChatError> {
        chat::send_message(&self.state, &self.user, channel_id, draft).await
    }

    async fn send_media(&self, channel_id: &str, upload: MediaUpload) -> Result<MessageList, ChatError> {
        chat::send_media(&self.state, &self.user, channel_id, upload).await
    }

    async fn edit(&self, message_id: Uuid, content: &str) -> Result<MessageList, ChatError> {
        chat::edit_message(&self.state, &self.user, message_id, content).await
    }

    async fn delete(&self, message_id: Uuid) -> Result<MessageList, ChatError> {
        chat::delete_message(&self.state, &self.user, message_id).await
    }
}

// =============================================================================
// WIDGET
// =============================================================================

/// What the message pane should render.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatView<'a> {
    /// No channel is visible to the user yet.
    NoChannel,
    Loading { channel: &'a ChatChannel },
    Empty { channel: &'a ChatChannel, title: &'static str, subtitle: &'static str },
    Messages { channel: &'a ChatChannel, messages: &'a [ChatMessage] },
}

pub struct ChatWidget<A> {
    api: A,
    /// Channels visible to the user, region first.
    pub channels: Vec<ChatChannel>,
    /// Id of the selected channel.
    pub active: Option<String>,
    /// Messages of the active channel, oldest first.
    pub messages: Vec<ChatMessage>,
    pub draft: String,
    pub reply_to: Option<Uuid>,
    /// True while the active channel's messages are being fetched.
    pub loading: bool,
    /// Message of the most recent failed action, cleared on the next success.
    pub last_error: Option<String>,
}

impl<A: ChatApi> ChatWidget<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            channels: Vec::new(),
            active: None,
            messages: Vec::new(),
            draft: String::new(),
            reply_to: None,
            loading: false,
            last_error: None,
        }
    }

    #[must_use]
    pub fn active_channel(&self) -> Option<&ChatChannel> {
        let active = self.active.as_deref()?;
        self.channels.iter().find(|c| c.id == active)
    }

    /// Refresh member counts, load the channel list and select the first
    /// channel when none is active.
    pub async fn open(&mut self) -> Result<(), ChatError> {
        if let Err(e) = self.api.refresh_member_counts().await {
            warn!(error = %e, "member count refresh failed");
        }
        let channels = self.record(self.api.user_channels().await)?;
        self.apply_channels(channels).await
    }

    /// Replace the channel list with a fresh snapshot (from `open` or a
    /// listener). Falls back to the first channel if the active one vanished.
    pub async fn apply_channels(&mut self, channels: Vec<ChatChannel>) -> Result<(), ChatError> {
        self.channels = channels;
        let still_visible = self.active_channel().is_some();
        if still_visible {
            return Ok(());
        }
        match self.channels.first().map(|c| c.id.clone()) {
            Some(first) => self.select_channel(&first).await,
            None => {
                self.active = None;
                self.messages.clear();
                Ok(())
            }
        }
    }

    pub async fn select_channel(&mut self, channel_id: &str) -> Result<(), ChatError> {
        self.active = Some(channel_id.to_owned());
        self.messages.clear();
        self.reply_to = None;
        self.loading = true;
        let result = self.api.channel_messages(channel_id).await;
        self.loading = false;
        let list = self.record(result)?;
        self.apply(list);
        Ok(())
    }

    /// Re-fetch the active channel, e.g. after a change notification.
    pub async fn reload(&mut self) -> Result<(), ChatError> {
        let Some(active) = self.active.clone() else {
            return Ok(());
        };
        let list = self.record(self.api.channel_messages(&active).await)?;
        self.apply(list);
        Ok(())
    }

    /// Send the draft. Blank drafts and a missing channel are ignored.
    pub async fn send(&mut self) -> Result<(), ChatError> {
        let Some(active) = self.active.clone() else {
            return Ok(());
        };
        if self.draft.trim().is_empty() {
            return Ok(());
        }
        let content = std::mem::take(&mut self.draft);
        let draft = MessageDraft { content, reply_to: self.reply_to.take() };
        let list = self.record(self.api.send_text(&active, draft).await)?;
        self.apply(list);
        Ok(())
    }

    /// Send an attachment. The draft becomes its caption unless one is
    /// given, and is cleared once the send succeeds.
    pub async fn send_media(&mut self, mut upload: MediaUpload) -> Result<(), ChatError> {
        let Some(active) = self.active.clone() else {
            return Ok(());
        };
        if upload.caption.is_none() && !self.draft.trim().is_empty() {
            upload.caption = Some(self.draft.clone());
        }
        let list = self.record(self.api.send_media(&active, upload).await)?;
        self.draft.clear();
        self.apply(list);
        Ok(())
    }

    pub async fn edit(&mut self, message_id: Uuid, content: &str) -> Result<(), ChatError> {
        let list = self.record(self.api.edit(message_id, content).await)?;
        self.apply(list);
        Ok(())
    }

    pub async fn delete(&mut self, message_id: Uuid) -> Result<(), ChatError> {
        let list = self.record(self.api.delete(message_id).await)?;
        self.apply(list);
        Ok(())
    }

    pub fn insert_emoji(&mut self, emoji: &str) {
        self.draft.push_str(emoji);
    }

    #[must_use]
    pub fn view(&self) -> ChatView<'_> {
        let Some(channel) = self.active_channel() else {
            return ChatView::NoChannel;
        };
        if !self.messages.is_empty() {
            return ChatView::Messages { channel, messages: &self.messages };
        }
        if self.loading {
            return ChatView::Loading { channel };
        }
        let subtitle = match channel.kind {
            ChannelKind::Region => "Be the first to message your regional group!",
            ChannelKind::Team => "Be the first to message your team group!",
        };
        ChatView::Empty { channel, title: EMPTY_TITLE, subtitle }
    }

    fn apply(&mut self, list: MessageList) {
        if self.active.as_deref() == Some(list.channel_id.as_str()) {
            self.messages = list.messages;
        }
    }

    fn record<T>(&mut self, result: Result<T, ChatError>) -> Result<T, ChatError> {
        match result {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, channel = ?self.active, "chat action failed");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "chat_widget_test.rs"]
mod tests;
