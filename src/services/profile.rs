//! Profile reads and display-name updates.
//!
//! Role-specific mirror documents (`closers/{uid}`) follow the user record
//! when they exist; they are never created from here.

use tracing::{info, warn};
use uuid::Uuid;

use crate::model::User;
use crate::state::AppState;
use crate::store::{StoreError, UserStore};

pub const DISPLAY_NAME_MIN: usize = 2;
pub const DISPLAY_NAME_MAX: usize = 50;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("display name must be between {DISPLAY_NAME_MIN} and {DISPLAY_NAME_MAX} characters")]
    InvalidDisplayName,
    #[error("user not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    /// An avatar upload is in flight for this user.
    pub uploading: bool,
}

/// Trimmed display name if its length is within bounds.
///
/// # Errors
///
/// Returns [`ProfileError::InvalidDisplayName`] otherwise.
pub fn validate_display_name(raw: &str) -> Result<&str, ProfileError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if (DISPLAY_NAME_MIN..=DISPLAY_NAME_MAX).contains(&len) {
        Ok(trimmed)
    } else {
        Err(ProfileError::InvalidDisplayName)
    }
}

pub async fn get_profile(state: &AppState, uid: Uuid) -> Result<Profile, ProfileError> {
    let user = state.store.user(uid).await?.ok_or(ProfileError::NotFound(uid))?;
    Ok(Profile { user, uploading: state.uploads.is_uploading(uid) })
}

/// Validate and store a new display name, returning the updated user.
pub async fn update_display_name(state: &AppState, user: &User, raw: &str) -> Result<User, ProfileError> {
    let display_name = match validate_display_name(raw) {
        Ok(name) => name,
        Err(e) => {
            warn!(uid = %user.uid, len = raw.trim().chars().count(), "rejected display name");
            return Err(e);
        }
    };

    state.store.set_display_name(user.uid, display_name).await?;
    if user.role.has_mirror_record() && state.store.closer_exists(user.uid).await? {
        state.store.set_closer_name(user.uid, display_name).await?;
    }
    info!(uid = %user.uid, "display name updated");

    state.store.user(user.uid).await?.ok_or(ProfileError::NotFound(user.uid))
}

#[cfg(test)]
#[path = "profile_test.rs"]
mod tests;
