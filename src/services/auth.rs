//! Email/password sign-in.
//!
//! Password hashes are argon2id PHC strings kept next to the user record.
//! Login failures never reveal whether the address exists.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::{info, warn};

use super::session;
use crate::model::User;
use crate::state::AppState;
use crate::store::{StoreError, UserStore};

/// Minimum accepted password length on reset.
pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email")]
    InvalidEmail,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    WeakPassword,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

/// # Errors
///
/// Returns [`AuthError::WeakPassword`] for short passwords, or a hashing failure.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword);
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .to_string();
    Ok(hash)
}

#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

/// Check credentials and open a session. Returns the user and session token.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(User, String), AuthError> {
    let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
    let credentials = state.store.credentials_by_email(&email).await?;

    let Some(credentials) = credentials else {
        warn!(%email, "login: unknown address");
        return Err(AuthError::InvalidCredentials);
    };
    let verified = credentials
        .password_hash
        .as_deref()
        .is_some_and(|hash| verify_password(password, hash));
    if !verified {
        warn!(uid = %credentials.user.uid, "login: wrong password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = session::create_session(state.store.as_ref(), credentials.user.uid, state.config.session_ttl).await?;
    info!(uid = %credentials.user.uid, role = credentials.user.role.as_str(), "login succeeded");
    Ok((credentials.user, token))
}

pub async fn logout(state: &AppState, token: &str) -> Result<(), AuthError> {
    session::delete_session(state.store.as_ref(), token).await?;
    Ok(())
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
