use image::{ImageFormat, Rgba, RgbaImage};

use super::*;
use crate::model::{MessageType, Role, User};
use crate::routes::test_support::multipart;
use crate::state::test_helpers::{TestApp, seed_team, seed_user, test_app};
use crate::store::StoreError;

async fn member(app: &TestApp) -> User {
    seed_team(&app.store, "t1", "Closers", "west").await;
    seed_user(&app.store, "Dana Reyes", Role::Agent, Some("t1")).await
}

fn auth(user: &User) -> AuthUser {
    AuthUser { user: user.clone(), token: String::new() }
}

fn gif_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 6, Rgba([1, 2, 3, 255])));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Gif).unwrap();
    buf.into_inner()
}

#[test]
fn chat_errors_map_to_statuses() {
    assert_eq!(chat_error_to_status(&ChatError::NotAMember("team-x".into())), StatusCode::FORBIDDEN);
    assert_eq!(chat_error_to_status(&ChatError::NotSender), StatusCode::FORBIDDEN);
    assert_eq!(chat_error_to_status(&ChatError::MessageNotFound(Uuid::nil())), StatusCode::NOT_FOUND);
    assert_eq!(chat_error_to_status(&ChatError::EmptyMessage), StatusCode::BAD_REQUEST);
    assert_eq!(
        chat_error_to_status(&ChatError::UnsupportedMedia("video/mp4".into())),
        StatusCode::UNSUPPORTED_MEDIA_TYPE
    );
    assert_eq!(chat_error_to_status(&ChatError::MediaTooLarge { size: 1 }), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        chat_error_to_status(&ChatError::Store(StoreError::not_found("chat_messages", "m1"))),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn channel_list_includes_counts() {
    let app = test_app();
    let dana = member(&app).await;
    seed_user(&app.store, "Sam Closer", Role::Closer, Some("t1")).await;

    let Json(channels) = list_channels(State(app.state.clone()), auth(&dana)).await.unwrap();
    let counts: Vec<(&str, i64)> = channels.iter().map(|c| (c.id.as_str(), c.member_count)).collect();
    assert_eq!(counts, vec![("region-west", 2), ("team-t1", 2)]);
}

#[tokio::test]
async fn send_edit_delete_through_routes() {
    let app = test_app();
    let dana = member(&app).await;
    let state = || State(app.state.clone());

    let draft = MessageDraft { content: "door 14 booked".into(), reply_to: None };
    let (status, Json(list)) = send_message(state(), auth(&dana), Path("team-t1".into()), Json(draft))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    let id = list.messages[0].id;

    let body = EditMessageBody { content: "door 16 booked".into() };
    let Json(list) = edit_message(state(), auth(&dana), Path(id), Json(body)).await.unwrap();
    assert_eq!(list.messages[0].content, "door 16 booked");

    let Json(list) = delete_message(state(), auth(&dana), Path(id)).await.unwrap();
    assert!(list.messages.is_empty());

    let Json(list) = list_messages(state(), auth(&dana), Path("team-t1".into())).await.unwrap();
    assert!(list.messages.is_empty());
}

#[tokio::test]
async fn foreign_channel_is_forbidden() {
    let app = test_app();
    let dana = member(&app).await;

    let Err((status, Json(payload))) =
        list_messages(State(app.state.clone()), auth(&dana), Path("team-t2".into())).await
    else {
        panic!("listing should fail");
    };
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(payload["error"], "channel not available: team-t2");
}

#[tokio::test]
async fn media_form_carries_type_name_and_caption() {
    let gif = gif_bytes();
    let form = multipart(&[("caption", None, b"nice".as_slice()), ("file", Some(("party.gif", "image/gif")), gif.as_slice())])
        .await;

    let upload = read_media_form(form).await.unwrap();
    assert_eq!(upload.content_type, "image/gif");
    assert_eq!(upload.file_name, "party.gif");
    assert_eq!(upload.caption.as_deref(), Some("nice"));
    assert_eq!(upload.bytes, gif);
}

#[tokio::test]
async fn media_form_without_file_is_rejected() {
    let form = multipart(&[("caption", None, b"nothing attached".as_slice())]).await;
    let Err((status, _)) = read_media_form(form).await else {
        panic!("form should be rejected");
    };
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn media_route_sends_gif_message() {
    let app = test_app();
    let dana = member(&app).await;
    let gif = gif_bytes();
    let form = multipart(&[("file", Some(("party.gif", "image/gif")), gif.as_slice())]).await;

    let (status, Json(list)) = send_media(State(app.state.clone()), auth(&dana), Path("region-west".into()), form)
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(list.messages[0].message_type, MessageType::Gif);
    assert_eq!(list.messages[0].content, "Shared a gif");
    let meta = list.messages[0].media_metadata.as_ref().unwrap();
    assert_eq!((meta.width, meta.height), (8, 6));
}

#[tokio::test]
async fn unsupported_media_type_is_415() {
    let app = test_app();
    let dana = member(&app).await;
    let form = multipart(&[("file", Some(("clip.mp4", "video/mp4")), b"\x00\x00\x00\x18ftyp".as_slice())]).await;

    let Err((status, _)) = send_media(State(app.state.clone()), auth(&dana), Path("team-t1".into()), form).await else {
        panic!("upload should fail");
    };
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}
