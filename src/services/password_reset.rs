//! Password reset by emailed link.
//!
//! DESIGN
//! ======
//! A reset request stores only the SHA-256 of a random token; the plaintext
//! token travels in the emailed link. Confirming consumes the token (single
//! use), replaces the password hash and ends every session of the user.
//!
//! Requests for unknown addresses succeed silently so the endpoint cannot be
//! used to probe which emails have accounts.

use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::{self, AuthError, normalize_email};
use super::session::{self, bytes_to_hex, generate_token};
use crate::mail::{MailError, OutgoingEmail};
use crate::model::User;
use crate::state::AppState;
use crate::store::{SessionStore, StoreError, UserStore};

const RESET_TEMPLATE: &str = include_str!("../../templates/password_reset.html");
const RESET_PAGE_TEMPLATE: &str = include_str!("../../templates/reset_password_form.html");
const RESET_SUBJECT: &str = "Reset your LeadFlow password";

/// Page the emailed link opens; it posts to the confirm endpoint.
pub const RESET_PAGE_PATH: &str = "/reset-password";

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("reset link is invalid or has expired")]
    InvalidToken,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

#[must_use]
pub fn hash_reset_token(token: &str) -> String {
    bytes_to_hex(&Sha256::digest(token.trim().as_bytes()))
}

#[must_use]
pub fn reset_link(base_url: &str, token: &str) -> String {
    format!("{base_url}{RESET_PAGE_PATH}?token={token}")
}

pub(crate) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[must_use]
pub fn render_reset_template(email: &str, link: &str, ttl_minutes: i64) -> String {
    RESET_TEMPLATE
        .replace("{{EMAIL}}", &escape_html(email))
        .replace("{{LINK}}", &escape_html(link))
        .replace("{{TTL_MINUTES}}", &ttl_minutes.to_string())
}

/// The new-password form behind [`reset_link`].
#[must_use]
pub fn render_reset_page(token: &str) -> String {
    RESET_PAGE_TEMPLATE.replace("{{TOKEN}}", &escape_html(token))
}

/// Email a reset link to `email` if it belongs to an account.
pub async fn request_password_reset(state: &AppState, email: &str) -> Result<(), ResetError> {
    let email = normalize_email(email).ok_or(ResetError::InvalidEmail)?;
    let Some(credentials) = state.store.credentials_by_email(&email).await? else {
        warn!(%email, "password reset requested for unknown address");
        return Ok(());
    };
    send_reset_email(state, &credentials.user).await
}

/// Profile-page flow: email a reset link to the caller's own address, then
/// end the session that asked for it.
pub async fn reset_own_password(state: &AppState, user: &User, session_token: &str) -> Result<(), ResetError> {
    send_reset_email(state, user).await?;
    session::delete_session(state.store.as_ref(), session_token).await?;
    info!(uid = %user.uid, "session closed after password reset dispatch");
    Ok(())
}

async fn send_reset_email(state: &AppState, user: &User) -> Result<(), ResetError> {
    let token = generate_token();
    let ttl = state.config.password_reset_ttl;
    state
        .store
        .create_reset_token(&hash_reset_token(&token), user.uid, OffsetDateTime::now_utc() + ttl)
        .await?;

    let link = reset_link(&state.config.public_base_url, &token);
    let html = render_reset_template(&user.email, &link, ttl.whole_minutes());
    state
        .mailer
        .send(OutgoingEmail { to: user.email.clone(), subject: RESET_SUBJECT.into(), html })
        .await?;
    info!(uid = %user.uid, "password reset email dispatched");
    Ok(())
}

/// Consume `token` and set `new_password`. Returns the affected user id.
pub async fn confirm_password_reset(state: &AppState, token: &str, new_password: &str) -> Result<Uuid, ResetError> {
    let password_hash = auth::hash_password(new_password)?;
    let uid = state
        .store
        .consume_reset_token(&hash_reset_token(token), OffsetDateTime::now_utc())
        .await?
        .ok_or(ResetError::InvalidToken)?;

    state.store.set_password_hash(uid, &password_hash).await?;
    let closed = state.store.delete_user_sessions(uid).await?;
    info!(%uid, sessions_closed = closed, "password reset completed");
    Ok(uid)
}

#[cfg(test)]
#[path = "password_reset_test.rs"]
mod tests;
