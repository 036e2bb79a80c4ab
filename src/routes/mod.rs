//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON API, the chat websocket and the blob download
//! directory under a single Axum router. Every API route lives under `/api`
//! and authenticates through the `session_token` cookie.
//!
//! ERROR HANDLING
//! ==============
//! Each route module maps its service error enum to a status code with a
//! `*_error_to_status` function. Bodies are always `{"error": "..."}`. Server
//! side failures are logged here, once, with `tracing::error!`.

pub mod auth;
pub mod chat;
pub mod leads;
pub mod notifications;
pub mod profile;
pub mod ws;

use std::fmt::Display;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, patch, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::services::password_reset;
use crate::state::AppState;
use crate::store::StoreError;

/// Multipart bodies carry a full-size photo plus form fields.
pub const UPLOAD_BODY_LIMIT: usize = 12 * 1024 * 1024;

pub type ApiError = (StatusCode, Json<serde_json::Value>);

pub(crate) fn api_error(status: StatusCode, err: &impl Display) -> ApiError {
    if status.is_server_error() {
        error!(status = status.as_u16(), error = %err, "request failed");
    }
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

/// Malformed request bodies and form fields.
pub(crate) fn bad_request(err: impl Display) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, &err)
}

pub(crate) fn store_error_to_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        StoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        StoreError::Unavailable(_) => StatusCode::BAD_GATEWAY,
    }
}

fn api_routes() -> Router<AppState> {
    let uploads = Router::new()
        .route("/api/profile/photo", post(profile::upload_photo))
        .route("/api/chat/channels/{id}/media", post(chat::send_media))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT));

    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password-reset", post(auth::request_password_reset))
        .route("/api/auth/password-reset/confirm", post(auth::confirm_password_reset))
        .route(password_reset::RESET_PAGE_PATH, get(auth::reset_password_page))
        .route("/api/profile", get(profile::get_profile).patch(profile::update_profile))
        .route("/api/profile/password-reset", post(profile::reset_password))
        .route(
            "/api/notifications/settings",
            get(notifications::get_settings).put(notifications::put_settings),
        )
        .route(
            "/api/notifications/devices",
            post(notifications::register_device).delete(notifications::unregister_device),
        )
        .route("/api/chat/channels", get(chat::list_channels))
        .route(
            "/api/chat/channels/{id}/messages",
            get(chat::list_messages).post(chat::send_message),
        )
        .route(
            "/api/chat/messages/{id}",
            patch(chat::edit_message).delete(chat::delete_message),
        )
        .route("/api/chat/ws", get(ws::handle_ws))
        .route("/api/leads/calendar", get(leads::calendar))
        .route("/healthz", get(healthz))
        .merge(uploads)
}

/// Full application router: API, websocket and `/blobs` downloads.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let blobs = ServeDir::new(&state.config.blob_root);

    api_routes()
        .with_state(state)
        .nest_service("/blobs", blobs)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "test_support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
