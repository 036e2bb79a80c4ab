use super::*;

#[test]
fn upload_tracker_rejects_concurrent_upload() {
    let tracker = UploadTracker::new();
    let uid = Uuid::new_v4();

    let guard = tracker.begin(uid).expect("first upload starts");
    assert!(tracker.is_uploading(uid));
    assert!(tracker.begin(uid).is_none());
    assert!(tracker.begin(Uuid::new_v4()).is_some());

    drop(guard);
    assert!(!tracker.is_uploading(uid));
    assert!(tracker.begin(uid).is_some());
}

#[test]
fn upload_tracker_clones_share_flags() {
    let tracker = UploadTracker::new();
    let clone = tracker.clone();
    let uid = Uuid::new_v4();
    let _guard = tracker.begin(uid).unwrap();
    assert!(clone.is_uploading(uid));
}

#[tokio::test]
async fn publish_without_listeners_is_silent() {
    let state = test_helpers::test_app_state();
    state.publish_chat_event("team-t1");

    let mut rx = state.chat_events.subscribe();
    state.publish_chat_event("team-t1");
    assert_eq!(rx.recv().await.unwrap(), ChatEvent { channel_id: "team-t1".into() });
}
