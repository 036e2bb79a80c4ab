//! Notification preferences and push device registration.
//!
//! Users without a stored document get [`NotificationSettings::default`]:
//! notifications off, lead/appointment/team toggles on, chat off.

use serde::Deserialize;
use tracing::{info, warn};

use crate::model::{NotificationSettings, User};
use crate::state::AppState;
use crate::store::{NotificationStore, StoreError};

pub const MAX_DEVICE_TOKEN_LEN: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("device token must be 1 to {MAX_DEVICE_TOKEN_LEN} characters")]
    InvalidDeviceToken,
    #[error("device token not registered")]
    UnknownDevice,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Preference flags accepted on update. Omitted flags keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesUpdate {
    pub enabled: Option<bool>,
    pub new_leads: Option<bool>,
    pub appointment_reminders: Option<bool>,
    pub team_updates: Option<bool>,
    pub chat_messages: Option<bool>,
}

impl PreferencesUpdate {
    fn apply(&self, settings: &mut NotificationSettings) {
        let flags = [
            (self.enabled, &mut settings.enabled),
            (self.new_leads, &mut settings.new_leads),
            (self.appointment_reminders, &mut settings.appointment_reminders),
            (self.team_updates, &mut settings.team_updates),
            (self.chat_messages, &mut settings.chat_messages),
        ];
        for (value, slot) in flags {
            if let Some(value) = value {
                *slot = value;
            }
        }
    }
}

fn validate_token(raw: &str) -> Result<&str, NotificationError> {
    let token = raw.trim();
    if token.is_empty() || token.len() > MAX_DEVICE_TOKEN_LEN {
        return Err(NotificationError::InvalidDeviceToken);
    }
    Ok(token)
}

pub async fn get_settings(state: &AppState, user: &User) -> Result<NotificationSettings, NotificationError> {
    Ok(state.store.notification_settings(user.uid).await?.unwrap_or_default())
}

pub async fn update_settings(
    state: &AppState,
    user: &User,
    update: &PreferencesUpdate,
) -> Result<NotificationSettings, NotificationError> {
    let mut settings = get_settings(state, user).await?;
    update.apply(&mut settings);
    state.store.put_notification_settings(user.uid, &settings).await?;
    info!(uid = %user.uid, enabled = settings.enabled, "notification settings updated");
    get_settings(state, user).await
}

/// Register a push token for the user. Registering twice is a no-op.
pub async fn register_device(
    state: &AppState,
    user: &User,
    raw_token: &str,
) -> Result<NotificationSettings, NotificationError> {
    let token = validate_token(raw_token).inspect_err(|_| {
        warn!(uid = %user.uid, len = raw_token.len(), "rejected device token");
    })?;
    state.store.add_device_token(user.uid, token).await?;
    info!(uid = %user.uid, "device registered");
    get_settings(state, user).await
}

pub async fn unregister_device(
    state: &AppState,
    user: &User,
    raw_token: &str,
) -> Result<NotificationSettings, NotificationError> {
    let token = validate_token(raw_token)?;
    if !state.store.remove_device_token(user.uid, token).await? {
        return Err(NotificationError::UnknownDevice);
    }
    info!(uid = %user.uid, "device unregistered");
    get_settings(state, user).await
}

#[cfg(test)]
#[path = "notifications_test.rs"]
mod tests;
