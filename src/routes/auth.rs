//! Auth routes: login/logout, current user, password reset by email.

use axum::extract::{FromRef, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use time::Duration;
use tracing::warn;

use super::{ApiError, api_error, store_error_to_status};
use crate::model::User;
use crate::services::auth::{self as auth_svc, AuthError};
use crate::services::password_reset::{self, ResetError};
use crate::services::session;
use crate::state::AppState;

pub(crate) const COOKIE_NAME: &str = "session_token";

pub(crate) fn session_cookie(token: String, secure: bool, max_age: Duration) -> Cookie<'static> {
    Cookie::build((COOKIE_NAME, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Expired, empty session cookie.
pub(crate) fn cleared_session_cookie(secure: bool) -> Cookie<'static> {
    session_cookie(String::new(), secure, Duration::ZERO)
}

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Authenticated user extracted from the session cookie.
/// Use as a handler parameter to require authentication.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut axum::http::request::Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(COOKIE_NAME).map(Cookie::value).unwrap_or_default();
        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        let app_state = AppState::from_ref(state);
        let user = session::validate_session(app_state.store.as_ref(), token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "session validation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            })?
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(Self { user, token: token.to_owned() })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// `POST /api/auth/login`: verify credentials, set session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, token) = auth_svc::login(&state, &body.email, &body.password)
        .await
        .map_err(|e| api_error(auth_error_to_status(&e), &e))?;

    let cookie = session_cookie(token, state.config.cookie_secure, state.config.session_ttl);
    Ok((jar.add(cookie), Json(user)))
}

/// `GET /api/auth/me`: return current user.
pub async fn me(auth: AuthUser) -> Json<User> {
    Json(auth.user)
}

/// `POST /api/auth/logout`: delete session, clear cookie.
pub async fn logout(State(state): State<AppState>, auth: AuthUser) -> impl IntoResponse {
    if let Err(e) = auth_svc::logout(&state, &auth.token).await {
        warn!(uid = %auth.user.uid, error = %e, "logout: session delete failed");
    }
    let jar = CookieJar::new().add(cleared_session_cookie(state.config.cookie_secure));
    (jar, StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ResetRequestBody {
    pub email: String,
}

/// `POST /api/auth/password-reset`: email a reset link if the address has an account.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetRequestBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    password_reset::request_password_reset(&state, &body.email)
        .await
        .map_err(|e| api_error(reset_error_to_status(&e), &e))?;
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "ok": true }))))
}

#[derive(Deserialize)]
pub struct ResetConfirmBody {
    pub token: String,
    pub password: String,
}

/// `POST /api/auth/password-reset/confirm`: set a new password from a reset link.
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(body): Json<ResetConfirmBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    password_reset::confirm_password_reset(&state, &body.token, &body.password)
        .await
        .map_err(|e| api_error(reset_error_to_status(&e), &e))?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Deserialize)]
pub struct ResetPageQuery {
    #[serde(default)]
    pub token: String,
}

/// `GET /reset-password?token=...`: form the emailed link opens.
pub async fn reset_password_page(Query(query): Query<ResetPageQuery>) -> Html<String> {
    Html(password_reset::render_reset_page(&query.token))
}

pub(crate) fn auth_error_to_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail | AuthError::WeakPassword => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        AuthError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::Store(e) => store_error_to_status(e),
    }
}

pub(crate) fn reset_error_to_status(err: &ResetError) -> StatusCode {
    match err {
        ResetError::InvalidEmail | ResetError::InvalidToken => StatusCode::BAD_REQUEST,
        ResetError::Auth(e) => auth_error_to_status(e),
        ResetError::Store(e) => store_error_to_status(e),
        ResetError::Mail(_) => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
