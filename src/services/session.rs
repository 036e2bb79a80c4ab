//! Session token management.
//!
//! ARCHITECTURE
//! ============
//! HTTP auth uses opaque random tokens carried in the `session_token` cookie.
//! Tokens map to a user and an expiry in the session store; validation reads
//! the user record through the same lookup so a deleted user loses access.

use std::fmt::Write;

use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::User;
use crate::store::{SessionStore, StoreError};

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex token.
#[must_use]
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

/// Create a session for the given user, returning the token.
pub async fn create_session(
    store: &(impl SessionStore + ?Sized),
    uid: Uuid,
    ttl: time::Duration,
) -> Result<String, StoreError> {
    let token = generate_token();
    store
        .create_session(&token, uid, OffsetDateTime::now_utc() + ttl)
        .await?;
    Ok(token)
}

/// Validate a session token and return the associated user.
pub async fn validate_session(store: &(impl SessionStore + ?Sized), token: &str) -> Result<Option<User>, StoreError> {
    store.session_user(token, OffsetDateTime::now_utc()).await
}

pub async fn delete_session(store: &(impl SessionStore + ?Sized), token: &str) -> Result<(), StoreError> {
    store.delete_session(token).await
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
