use time::macros::datetime;
use time::Duration;

use super::*;
use crate::model::{MessageType, Role};

fn user(team_id: Option<&str>, email: &str) -> User {
    User {
        uid: Uuid::new_v4(),
        display_name: "Dana Reyes".into(),
        email: email.into(),
        role: Role::Agent,
        team_id: team_id.map(str::to_owned),
        avatar_url: None,
    }
}

fn message(channel_id: &str, sender: &User, at: OffsetDateTime, content: &str) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        channel_id: channel_id.into(),
        sender_id: sender.uid,
        sender_name: sender.display_name.clone(),
        sender_role: sender.role,
        sender_avatar: None,
        content: content.into(),
        message_type: MessageType::Text,
        media_url: None,
        media_metadata: None,
        timestamp: at,
        edited_at: None,
        reply_to: None,
    }
}

// =============================================================================
// users
// =============================================================================

#[tokio::test]
async fn insert_user_rejects_duplicate_email_case_insensitively() {
    let store = MemoryStore::new();
    store.insert_user(&user(None, "dana@example.com"), None).await.unwrap();
    let err = store
        .insert_user(&user(None, "DANA@example.com"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict { collection: "users", .. }));
}

#[tokio::test]
async fn credentials_by_email_returns_hash() {
    let store = MemoryStore::new();
    let u = user(None, "dana@example.com");
    store.insert_user(&u, Some("hash")).await.unwrap();
    let creds = store.credentials_by_email("dana@example.com").await.unwrap().unwrap();
    assert_eq!(creds.user.uid, u.uid);
    assert_eq!(creds.password_hash.as_deref(), Some("hash"));
}

#[tokio::test]
async fn set_display_name_on_missing_user_is_not_found() {
    let store = MemoryStore::new();
    let err = store.set_display_name(Uuid::new_v4(), "Dana").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { collection: "users", .. }));
}

#[tokio::test]
async fn closer_mirror_updates_require_existing_document() {
    let store = MemoryStore::new();
    let uid = Uuid::new_v4();
    assert!(!store.closer_exists(uid).await.unwrap());
    assert!(store.set_closer_name(uid, "Dana").await.is_err());

    store.insert_closer(uid, "Dana").await.unwrap();
    assert!(store.closer_exists(uid).await.unwrap());
    store.set_closer_name(uid, "Dana R").await.unwrap();
    store.set_closer_avatar_url(uid, "http://x/a.png").await.unwrap();
}

#[tokio::test]
async fn injected_write_failure_surfaces_as_unavailable() {
    let store = MemoryStore::new();
    let u = user(None, "dana@example.com");
    store.insert_user(&u, None).await.unwrap();

    store.fail_writes("network down");
    let err = store.set_avatar_url(u.uid, "http://x/a.png").await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(ref m) if m == "network down"));

    store.restore_writes();
    store.set_avatar_url(u.uid, "http://x/a.png").await.unwrap();
    let stored = store.user(u.uid).await.unwrap().unwrap();
    assert_eq!(stored.avatar_url.as_deref(), Some("http://x/a.png"));
}

// =============================================================================
// sessions & reset tokens
// =============================================================================

#[tokio::test]
async fn expired_session_resolves_to_none() {
    let store = MemoryStore::new();
    let u = user(None, "dana@example.com");
    store.insert_user(&u, None).await.unwrap();
    let now = datetime!(2025-03-10 12:00 UTC);
    store.create_session("tok", u.uid, now + Duration::hours(1)).await.unwrap();

    assert!(store.session_user("tok", now).await.unwrap().is_some());
    assert!(store.session_user("tok", now + Duration::hours(2)).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_user_sessions_counts_removed() {
    let store = MemoryStore::new();
    let uid = Uuid::new_v4();
    let other = Uuid::new_v4();
    let exp = datetime!(2030-01-01 0:00 UTC);
    store.create_session("a", uid, exp).await.unwrap();
    store.create_session("b", uid, exp).await.unwrap();
    store.create_session("c", other, exp).await.unwrap();

    assert_eq!(store.delete_user_sessions(uid).await.unwrap(), 2);
    assert_eq!(store.delete_user_sessions(uid).await.unwrap(), 0);
}

#[tokio::test]
async fn reset_token_is_single_use_and_replaces_previous() {
    let store = MemoryStore::new();
    let uid = Uuid::new_v4();
    let now = datetime!(2025-03-10 12:00 UTC);
    store.create_reset_token("first", uid, now + Duration::hours(1)).await.unwrap();
    store.create_reset_token("second", uid, now + Duration::hours(1)).await.unwrap();

    assert_eq!(store.consume_reset_token("first", now).await.unwrap(), None);
    assert_eq!(store.consume_reset_token("second", now).await.unwrap(), Some(uid));
    assert_eq!(store.consume_reset_token("second", now).await.unwrap(), None);
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let store = MemoryStore::new();
    let uid = Uuid::new_v4();
    let now = datetime!(2025-03-10 12:00 UTC);
    store.create_reset_token("tok", uid, now).await.unwrap();
    assert_eq!(store.consume_reset_token("tok", now).await.unwrap(), None);
}

// =============================================================================
// chat
// =============================================================================

#[tokio::test]
async fn ensure_channel_keeps_existing_document() {
    let store = MemoryStore::new();
    let first = ChatChannel::new(ChannelKind::Team, "t1", "Closers");
    store.ensure_channel(&first).await.unwrap();
    let again = store
        .ensure_channel(&ChatChannel::new(ChannelKind::Team, "t1", "Renamed"))
        .await
        .unwrap();
    assert_eq!(again.name, "Closers");
}

#[tokio::test]
async fn member_counts_follow_team_and_region() {
    let store = MemoryStore::new();
    store
        .upsert_team(&Team { id: "t1".into(), name: "Closers".into(), region_id: "west".into() })
        .await
        .unwrap();
    store.insert_user(&user(Some("t1"), "a@example.com"), None).await.unwrap();
    store.insert_user(&user(Some("t1"), "b@example.com"), None).await.unwrap();
    store.insert_user(&user(None, "c@example.com"), None).await.unwrap();

    store.ensure_channel(&ChatChannel::new(ChannelKind::Team, "t1", "Closers")).await.unwrap();
    store.ensure_channel(&ChatChannel::new(ChannelKind::Region, "west", "West")).await.unwrap();
    store.ensure_channel(&ChatChannel::new(ChannelKind::Region, "global", "Global")).await.unwrap();
    store.refresh_member_counts("global").await.unwrap();

    let count = |id: &'static str| {
        let store = &store;
        async move { store.channel(id).await.unwrap().unwrap().member_count }
    };
    assert_eq!(count("team-t1").await, 2);
    assert_eq!(count("region-west").await, 2);
    assert_eq!(count("region-global").await, 1);
}

#[tokio::test]
async fn messages_come_back_oldest_first() {
    let store = MemoryStore::new();
    let sender = user(None, "dana@example.com");
    store.ensure_channel(&ChatChannel::new(ChannelKind::Team, "t1", "T")).await.unwrap();
    let later = message("team-t1", &sender, datetime!(2025-03-10 12:05 UTC), "second");
    let earlier = message("team-t1", &sender, datetime!(2025-03-10 12:00 UTC), "first");
    store.insert_message(&later).await.unwrap();
    store.insert_message(&earlier).await.unwrap();

    let contents: Vec<String> = store
        .messages("team-t1")
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["first", "second"]);
}

#[tokio::test]
async fn insert_message_into_unknown_channel_fails() {
    let store = MemoryStore::new();
    let sender = user(None, "dana@example.com");
    let msg = message("team-nope", &sender, datetime!(2025-03-10 12:00 UTC), "hi");
    assert!(matches!(
        store.insert_message(&msg).await,
        Err(StoreError::NotFound { collection: "chat_channels", .. })
    ));
}

#[tokio::test]
async fn edit_and_delete_message() {
    let store = MemoryStore::new();
    let sender = user(None, "dana@example.com");
    store.ensure_channel(&ChatChannel::new(ChannelKind::Team, "t1", "T")).await.unwrap();
    let msg = message("team-t1", &sender, datetime!(2025-03-10 12:00 UTC), "hi");
    store.insert_message(&msg).await.unwrap();

    let edited_at = datetime!(2025-03-10 12:01 UTC);
    store.update_message_content(msg.id, "hello", edited_at).await.unwrap();
    let stored = store.message(msg.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "hello");
    assert_eq!(stored.edited_at, Some(edited_at));

    store.delete_message(msg.id).await.unwrap();
    assert!(store.message(msg.id).await.unwrap().is_none());
    assert!(store.delete_message(msg.id).await.is_err());
}

// =============================================================================
// leads
// =============================================================================

fn lead(id: &str, team: Option<&str>, at: Option<OffsetDateTime>) -> Lead {
    Lead {
        id: id.into(),
        customer_name: format!("Customer {id}"),
        scheduled_appointment_time: at,
        team_id: team.map(str::to_owned),
        status: "scheduled".into(),
        extra: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn scheduled_leads_filters_window_and_team() {
    let store = MemoryStore::new();
    let from = datetime!(2025-03-10 0:00 UTC);
    let until = datetime!(2025-03-24 0:00 UTC);
    store.insert_lead(&lead("late", Some("t1"), Some(datetime!(2025-03-12 15:00 UTC)))).await.unwrap();
    store.insert_lead(&lead("early", Some("t1"), Some(datetime!(2025-03-11 9:00 UTC)))).await.unwrap();
    store.insert_lead(&lead("other-team", Some("t2"), Some(datetime!(2025-03-11 9:00 UTC)))).await.unwrap();
    store.insert_lead(&lead("unscheduled", Some("t1"), None)).await.unwrap();
    store.insert_lead(&lead("at-end", Some("t1"), Some(until))).await.unwrap();

    let ids: Vec<String> = store
        .scheduled_leads(Some("t1"), from, until)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.id)
        .collect();
    assert_eq!(ids, vec!["early", "late"]);

    let all = store.scheduled_leads(None, from, until).await.unwrap();
    assert_eq!(all.len(), 3);
}

// =============================================================================
// notifications
// =============================================================================

#[tokio::test]
async fn device_tokens_survive_settings_update() {
    let store = MemoryStore::new();
    let uid = Uuid::new_v4();
    store.add_device_token(uid, "device-1").await.unwrap();
    store.add_device_token(uid, "device-1").await.unwrap();

    let settings = NotificationSettings { enabled: true, ..NotificationSettings::default() };
    store.put_notification_settings(uid, &settings).await.unwrap();

    let stored = store.notification_settings(uid).await.unwrap().unwrap();
    assert!(stored.enabled);
    assert_eq!(stored.device_tokens, vec!["device-1".to_owned()]);

    assert!(store.remove_device_token(uid, "device-1").await.unwrap());
    assert!(!store.remove_device_token(uid, "device-1").await.unwrap());
}
