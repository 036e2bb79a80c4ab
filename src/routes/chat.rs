//! Chat routes. Every write answers with the channel's re-fetched messages.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::auth::AuthUser;
use super::{ApiError, api_error, bad_request, store_error_to_status};
use crate::model::ChatChannel;
use crate::services::chat::{self as chat_svc, ChatError, MediaUpload, MessageDraft, MessageList};
use crate::state::AppState;

fn chat_error(err: ChatError) -> ApiError {
    api_error(chat_error_to_status(&err), &err)
}

/// `GET /api/chat/channels`: refresh member counts, then list visible channels.
pub async fn list_channels(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<ChatChannel>>, ApiError> {
    if let Err(e) = chat_svc::refresh_member_counts(&state).await {
        warn!(error = %e, "chat: member count refresh failed");
    }
    chat_svc::user_channels(&state, &auth.user)
        .await
        .map(Json)
        .map_err(chat_error)
}

/// `GET /api/chat/channels/{id}/messages`
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
) -> Result<Json<MessageList>, ApiError> {
    chat_svc::channel_messages(&state, &auth.user, &channel_id)
        .await
        .map(Json)
        .map_err(chat_error)
}

/// `POST /api/chat/channels/{id}/messages`
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<(StatusCode, Json<MessageList>), ApiError> {
    let list = chat_svc::send_message(&state, &auth.user, &channel_id, draft)
        .await
        .map_err(chat_error)?;
    Ok((StatusCode::CREATED, Json(list)))
}

/// Multipart form of a media message: `file` plus optional `caption`.
pub(crate) async fn read_media_form(mut multipart: Multipart) -> Result<MediaUpload, ApiError> {
    let mut upload: Option<MediaUpload> = None;
    let mut caption = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let content_type = field.content_type().unwrap_or_default().to_owned();
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let bytes = field.bytes().await.map_err(bad_request)?;
                upload = Some(MediaUpload { bytes: bytes.to_vec(), content_type, file_name, caption: None });
            }
            Some("caption") => caption = Some(field.text().await.map_err(bad_request)?),
            _ => {}
        }
    }

    let mut upload = upload.ok_or_else(|| bad_request("file field is required"))?;
    upload.caption = caption;
    Ok(upload)
}

/// `POST /api/chat/channels/{id}/media`
pub async fn send_media(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(channel_id): Path<String>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MessageList>), ApiError> {
    let upload = read_media_form(multipart).await?;
    let list = chat_svc::send_media(&state, &auth.user, &channel_id, upload)
        .await
        .map_err(chat_error)?;
    Ok((StatusCode::CREATED, Json(list)))
}

#[derive(Deserialize)]
pub struct EditMessageBody {
    pub content: String,
}

/// `PATCH /api/chat/messages/{id}`
pub async fn edit_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageBody>,
) -> Result<Json<MessageList>, ApiError> {
    chat_svc::edit_message(&state, &auth.user, message_id, &body.content)
        .await
        .map(Json)
        .map_err(chat_error)
}

/// `DELETE /api/chat/messages/{id}`
pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageList>, ApiError> {
    chat_svc::delete_message(&state, &auth.user, message_id)
        .await
        .map(Json)
        .map_err(chat_error)
}

pub(crate) fn chat_error_to_status(err: &ChatError) -> StatusCode {
    match err {
        ChatError::NotAMember(_) | ChatError::NotSender => StatusCode::FORBIDDEN,
        ChatError::MessageNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::EmptyMessage => StatusCode::BAD_REQUEST,
        ChatError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ChatError::MediaTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ChatError::Image(_) | ChatError::Io(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ChatError::Blob(_) => StatusCode::BAD_GATEWAY,
        ChatError::Store(e) => store_error_to_status(e),
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
