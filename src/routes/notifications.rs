//! Notification preference and device registration routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use super::auth::AuthUser;
use super::{ApiError, api_error, store_error_to_status};
use crate::model::NotificationSettings;
use crate::services::notifications::{self as notify_svc, NotificationError, PreferencesUpdate};
use crate::state::AppState;

fn notification_error(err: NotificationError) -> ApiError {
    api_error(notification_error_to_status(&err), &err)
}

/// `GET /api/notifications/settings`
pub async fn get_settings(State(state): State<AppState>, auth: AuthUser) -> Result<Json<NotificationSettings>, ApiError> {
    notify_svc::get_settings(&state, &auth.user)
        .await
        .map(Json)
        .map_err(notification_error)
}

/// `PUT /api/notifications/settings`
pub async fn put_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(update): Json<PreferencesUpdate>,
) -> Result<Json<NotificationSettings>, ApiError> {
    notify_svc::update_settings(&state, &auth.user, &update)
        .await
        .map(Json)
        .map_err(notification_error)
}

#[derive(Deserialize)]
pub struct DeviceBody {
    pub token: String,
}

/// `POST /api/notifications/devices`
pub async fn register_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<DeviceBody>,
) -> Result<Json<NotificationSettings>, ApiError> {
    notify_svc::register_device(&state, &auth.user, &body.token)
        .await
        .map(Json)
        .map_err(notification_error)
}

/// `DELETE /api/notifications/devices`
pub async fn unregister_device(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<DeviceBody>,
) -> Result<Json<NotificationSettings>, ApiError> {
    notify_svc::unregister_device(&state, &auth.user, &body.token)
        .await
        .map(Json)
        .map_err(notification_error)
}

pub(crate) fn notification_error_to_status(err: &NotificationError) -> StatusCode {
    match err {
        NotificationError::InvalidDeviceToken => StatusCode::BAD_REQUEST,
        NotificationError::UnknownDevice => StatusCode::NOT_FOUND,
        NotificationError::Store(e) => store_error_to_status(e),
    }
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
