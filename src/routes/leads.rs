//! Scheduled-leads calendar route.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;

use super::auth::AuthUser;
use super::{ApiError, api_error, bad_request, store_error_to_status};
use crate::services::calendar::{self, CalendarError, CalendarView};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    /// Caller's offset in minutes east of UTC. Defaults to UTC.
    pub tz_offset_minutes: Option<i32>,
    /// Selected day as `yyyy-mm-dd`. Defaults to today.
    pub day: Option<String>,
}

/// `GET /api/leads/calendar?tz_offset_minutes=-300&day=2025-03-12`
pub async fn calendar(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarView>, ApiError> {
    let day = match query.day.as_deref() {
        Some(raw) => Some(calendar::parse_day(raw).ok_or_else(|| bad_request(format!("invalid day: {raw}")))?),
        None => None,
    };
    calendar::calendar(&state, &auth.user, query.tz_offset_minutes.unwrap_or(0), day)
        .await
        .map(Json)
        .map_err(|e| api_error(calendar_error_to_status(&e), &e))
}

pub(crate) fn calendar_error_to_status(err: &CalendarError) -> StatusCode {
    match err {
        CalendarError::InvalidOffset(_) | CalendarError::DayOutOfRange(_) => StatusCode::BAD_REQUEST,
        CalendarError::Format(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CalendarError::Store(e) => store_error_to_status(e),
    }
}

#[cfg(test)]
#[path = "leads_test.rs"]
mod tests;
