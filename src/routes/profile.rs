//! Profile routes: display name, avatar photo, self-service password reset.

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::auth::{AuthUser, cleared_session_cookie, reset_error_to_status};
use super::{ApiError, api_error, bad_request, store_error_to_status};
use crate::model::User;
use crate::services::avatar::{self, AvatarError, AvatarRequest, AvatarUploaded};
use crate::services::password_reset;
use crate::services::profile::{self as profile_svc, Profile, ProfileError};
use crate::state::AppState;

/// `GET /api/profile`: current user plus the in-flight upload flag.
pub async fn get_profile(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Profile>, ApiError> {
    profile_svc::get_profile(&state, auth.user.uid)
        .await
        .map(Json)
        .map_err(|e| api_error(profile_error_to_status(&e), &e))
}

#[derive(Deserialize)]
pub struct UpdateProfileBody {
    pub display_name: String,
}

/// `PATCH /api/profile`: change the display name.
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileBody>,
) -> Result<Json<User>, ApiError> {
    profile_svc::update_display_name(&state, &auth.user, &body.display_name)
        .await
        .map(Json)
        .map_err(|e| api_error(profile_error_to_status(&e), &e))
}

/// Read the multipart form of a photo upload.
///
/// Fields: `file` (image bytes), `crop` and `geometry` (JSON). Missing
/// fields are left `None` so the avatar service reports which one.
pub(crate) async fn read_avatar_form(mut multipart: Multipart) -> Result<AvatarRequest, ApiError> {
    let mut request = AvatarRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await.map_err(bad_request)?;
                request.image = Some(bytes.to_vec());
            }
            Some("crop") => {
                let text = field.text().await.map_err(bad_request)?;
                request.crop = Some(serde_json::from_str(&text).map_err(bad_request)?);
            }
            Some("geometry") => {
                let text = field.text().await.map_err(bad_request)?;
                request.geometry = Some(serde_json::from_str(&text).map_err(bad_request)?);
            }
            _ => {}
        }
    }
    Ok(request)
}

/// `POST /api/profile/photo`: crop, rasterize and store a new avatar.
pub async fn upload_photo(
    State(state): State<AppState>,
    auth: AuthUser,
    multipart: Multipart,
) -> Result<Json<AvatarUploaded>, ApiError> {
    let request = read_avatar_form(multipart).await?;
    avatar::upload_avatar(&state, &auth.user, request)
        .await
        .map(Json)
        .map_err(|e| api_error(avatar_error_to_status(&e), &e))
}

/// `POST /api/profile/password-reset`: email a reset link to the caller,
/// then log them out.
pub async fn reset_password(State(state): State<AppState>, auth: AuthUser) -> Result<impl IntoResponse, ApiError> {
    password_reset::reset_own_password(&state, &auth.user, &auth.token)
        .await
        .map_err(|e| api_error(reset_error_to_status(&e), &e))?;

    let jar = CookieJar::new().add(cleared_session_cookie(state.config.cookie_secure));
    Ok((jar, Json(serde_json::json!({ "ok": true, "email": auth.user.email }))))
}

pub(crate) fn profile_error_to_status(err: &ProfileError) -> StatusCode {
    match err {
        ProfileError::InvalidDisplayName => StatusCode::BAD_REQUEST,
        ProfileError::NotFound(_) => StatusCode::NOT_FOUND,
        ProfileError::Store(e) => store_error_to_status(e),
    }
}

pub(crate) fn avatar_error_to_status(err: &AvatarError) -> StatusCode {
    match err {
        AvatarError::MissingImage
        | AvatarError::MissingCrop
        | AvatarError::InvalidGeometry(_)
        | AvatarError::CropTooSmall
        | AvatarError::NotSquare
        | AvatarError::OutOfBounds => StatusCode::BAD_REQUEST,
        AvatarError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AvatarError::AlreadyUploading => StatusCode::CONFLICT,
        AvatarError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AvatarError::Blob(_) => StatusCode::BAD_GATEWAY,
        AvatarError::Store(e) => store_error_to_status(e),
    }
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
