use super::*;
use crate::model::Role;
use crate::state::test_helpers::{TestApp, seed_team, seed_user, test_app};
use crate::store::{ChatStore, StoreError};

async fn widget_for(app: &TestApp) -> (ChatWidget<LocalChatApi>, User) {
    seed_team(&app.store, "t1", "Closers", "west").await;
    let dana = seed_user(&app.store, "Dana Reyes", Role::Agent, Some("t1")).await;
    (ChatWidget::new(LocalChatApi::new(app.state.clone(), dana.clone())), dana)
}

/// Serves fixed channels and fails every write.
struct ReadOnlyApi {
    channels: Vec<ChatChannel>,
}

#[async_trait]
impl ChatApi for ReadOnlyApi {
    async fn refresh_member_counts(&self) -> Result<(), ChatError> {
        Err(ChatError::Store(StoreError::Unavailable("offline".into())))
    }

    async fn user_channels(&self) -> Result<Vec<ChatChannel>, ChatError> {
        Ok(self.channels.clone())
    }

    async fn channel_messages(&self, channel_id: &str) -> Result<MessageList, ChatError> {
        Ok(MessageList { channel_id: channel_id.into(), messages: Vec::new() })
    }

    async fn send_text(&self, _: &str, _: MessageDraft) -> Result<MessageList, ChatError> {
        Err(ChatError::Store(StoreError::Unavailable("offline".into())))
    }

    async fn send_media(&self, _: &str, _: MediaUpload) -> Result<MessageList, ChatError> {
        Err(ChatError::Store(StoreError::Unavailable("offline".into())))
    }

    async fn edit(&self, id: Uuid, _: &str) -> Result<MessageList, ChatError> {
        Err(ChatError::MessageNotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<MessageList, ChatError> {
        Err(ChatError::MessageNotFound(id))
    }
}

// =============================================================================
// open / select
// =============================================================================

#[tokio::test]
async fn open_selects_first_channel() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;

    widget.open().await.unwrap();
    let ids: Vec<&str> = widget.channels.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["region-west", "team-t1"]);
    assert_eq!(widget.active.as_deref(), Some("region-west"));
    assert!(!widget.loading);
}

#[tokio::test]
async fn open_keeps_existing_selection() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.select_channel("team-t1").await.unwrap();

    widget.open().await.unwrap();
    assert_eq!(widget.active.as_deref(), Some("team-t1"));
}

#[tokio::test]
async fn open_survives_count_refresh_failure() {
    let channel = ChatChannel::new(ChannelKind::Team, "t9", "Night Shift");
    let mut widget = ChatWidget::new(ReadOnlyApi { channels: vec![channel] });

    widget.open().await.unwrap();
    assert_eq!(widget.active.as_deref(), Some("team-t9"));
    assert!(widget.last_error.is_none());
}

#[tokio::test]
async fn switching_to_empty_channel_shows_empty_state() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.draft = "hello west".into();
    widget.send().await.unwrap();
    assert!(matches!(widget.view(), ChatView::Messages { messages, .. } if messages.len() == 1));

    widget.select_channel("team-t1").await.unwrap();
    assert!(widget.messages.is_empty());
    match widget.view() {
        ChatView::Empty { channel, title, subtitle } => {
            assert_eq!(channel.id, "team-t1");
            assert_eq!(title, "Start the group conversation");
            assert_eq!(subtitle, "Be the first to message your team group!");
        }
        other => panic!("expected empty state, got {other:?}"),
    }
}

#[test]
fn no_channels_renders_nothing_selected() {
    let widget = ChatWidget::new(ReadOnlyApi { channels: Vec::new() });
    assert_eq!(widget.view(), ChatView::NoChannel);
}

// =============================================================================
// compose
// =============================================================================

#[tokio::test]
async fn send_clears_draft_and_refetches() {
    let app = test_app();
    let (mut widget, dana) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.draft = "  see you at 5 ".into();
    widget.insert_emoji("👍");

    widget.send().await.unwrap();
    assert!(widget.draft.is_empty());
    assert_eq!(widget.messages.len(), 1);
    assert_eq!(widget.messages[0].content, "see you at 5 👍");
    assert_eq!(widget.messages[0].sender_id, dana.uid);
}

#[tokio::test]
async fn blank_draft_is_not_sent() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.draft = "   ".into();

    widget.send().await.unwrap();
    assert!(app.store.messages("region-west").await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_send_keeps_draft_cleared_and_records_error() {
    let channel = ChatChannel::new(ChannelKind::Region, "west", "West Region");
    let mut widget = ChatWidget::new(ReadOnlyApi { channels: vec![channel] });
    widget.open().await.unwrap();
    widget.draft = "lost".into();

    assert!(widget.send().await.is_err());
    assert!(widget.draft.is_empty());
    assert!(widget.last_error.as_deref().is_some_and(|e| e.contains("offline")));
    assert!(widget.messages.is_empty());
}

#[tokio::test]
async fn edit_and_delete_refresh_messages() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.draft = "typo".into();
    widget.send().await.unwrap();
    let id = widget.messages[0].id;

    widget.edit(id, "fixed").await.unwrap();
    assert_eq!(widget.messages[0].content, "fixed");
    assert!(widget.messages[0].edited_at.is_some());

    widget.delete(id).await.unwrap();
    assert!(widget.messages.is_empty());
}

#[tokio::test]
async fn reload_picks_up_other_senders() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    let sam = seed_user(&app.store, "Sam Closer", Role::Closer, Some("t1")).await;
    chat::send_message(&app.state, &sam, "region-west", MessageDraft { content: "hey".into(), reply_to: None })
        .await
        .unwrap();

    widget.reload().await.unwrap();
    assert_eq!(widget.messages.len(), 1);
    assert_eq!(widget.messages[0].sender_name, "Sam Closer");
}

fn png_upload(caption: Option<&str>) -> MediaUpload {
    let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([9, 9, 9, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
    MediaUpload {
        bytes: buf.into_inner(),
        content_type: "image/png".into(),
        file_name: "door.png".into(),
        caption: caption.map(str::to_owned),
    }
}

#[tokio::test]
async fn media_send_uses_draft_as_caption_and_clears_it() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();
    widget.draft = "look at this".into();

    widget.send_media(png_upload(None)).await.unwrap();
    assert_eq!(widget.messages[0].content, "look at this");
    assert!(widget.draft.is_empty());
}

#[tokio::test]
async fn media_send_without_draft_uses_default_content() {
    let app = test_app();
    let (mut widget, _) = widget_for(&app).await;
    widget.open().await.unwrap();

    widget.send_media(png_upload(None)).await.unwrap();
    assert_eq!(widget.messages[0].content, "Shared a image");
}

#[tokio::test]
async fn failed_media_send_keeps_draft() {
    let channel = ChatChannel::new(ChannelKind::Region, "west", "West Region");
    let mut widget = ChatWidget::new(ReadOnlyApi { channels: vec![channel] });
    widget.open().await.unwrap();
    widget.draft = "caption".into();

    assert!(widget.send_media(png_upload(None)).await.is_err());
    assert_eq!(widget.draft, "caption");
}
