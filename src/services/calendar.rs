//! Scheduled-leads calendar.
//!
//! DESIGN
//! ======
//! The calendar covers fourteen consecutive days starting at "today" in the
//! caller's UTC offset. Leads are bucketed by the calendar date of their
//! appointment in that same offset, so an appointment at 23:30 local time
//! never drifts into the next day's bucket. The cursor can move one day at a
//! time and never leaves the window.

use std::collections::BTreeMap;

use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::model::{Lead, User};
use crate::state::AppState;
use crate::store::{LeadStore, StoreError};

pub const WINDOW_DAYS: usize = 14;

const DATE_KEY: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const LONG_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:short] [day padding:none], [year]");
const SHORT_DATE: &[BorrowedFormatItem<'static>] = format_description!("[month repr:short] [day padding:none]");
const WEEKDAY: &[BorrowedFormatItem<'static>] = format_description!("[weekday]");
const WEEKDAY_SHORT: &[BorrowedFormatItem<'static>] = format_description!("[weekday repr:short]");
const DAY_OF_MONTH: &[BorrowedFormatItem<'static>] = format_description!("[day padding:none]");
const CLOCK_TIME: &[BorrowedFormatItem<'static>] =
    format_description!("[hour repr:12 padding:none]:[minute] [period]");

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("utc offset out of range: {0} minutes")]
    InvalidOffset(i32),
    #[error("day {0} is outside the calendar window")]
    DayOutOfRange(String),
    #[error("date formatting failed: {0}")]
    Format(#[from] time::error::Format),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Offset from minutes east of UTC (`+60` for UTC+1).
///
/// # Errors
///
/// Returns [`CalendarError::InvalidOffset`] outside ±25:59.
pub fn offset_from_minutes(minutes: i32) -> Result<UtcOffset, CalendarError> {
    minutes
        .checked_mul(60)
        .and_then(|secs| UtcOffset::from_whole_seconds(secs).ok())
        .ok_or(CalendarError::InvalidOffset(minutes))
}

#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn window(today: Date) -> [Date; WINDOW_DAYS] {
    std::array::from_fn(|i| today + Duration::days(i as i64))
}

/// Bucket leads by local appointment date; each bucket sorted by time.
/// Leads without a scheduled time are left out.
#[must_use]
pub fn group_by_day(leads: Vec<Lead>, offset: UtcOffset) -> BTreeMap<Date, Vec<Lead>> {
    let mut groups: BTreeMap<Date, Vec<Lead>> = BTreeMap::new();
    for lead in leads {
        let Some(at) = lead.scheduled_appointment_time else {
            continue;
        };
        groups.entry(at.to_offset(offset).date()).or_default().push(lead);
    }
    for bucket in groups.values_mut() {
        bucket.sort_by_key(|lead| lead.scheduled_appointment_time);
    }
    groups
}

// =============================================================================
// CURSOR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarCursor {
    days: [Date; WINDOW_DAYS],
    index: usize,
}

impl CalendarCursor {
    /// Cursor on `today`, the first day of its window.
    #[must_use]
    pub fn new(today: Date) -> Self {
        Self { days: window(today), index: 0 }
    }

    #[must_use]
    pub fn days(&self) -> &[Date; WINDOW_DAYS] {
        &self.days
    }

    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn selected(&self) -> Date {
        self.days[self.index]
    }

    #[must_use]
    pub fn can_go_previous(&self) -> bool {
        self.index > 0
    }

    #[must_use]
    pub fn can_go_next(&self) -> bool {
        self.index + 1 < WINDOW_DAYS
    }

    /// Step back one day. Returns false at the start of the window.
    pub fn previous(&mut self) -> bool {
        if !self.can_go_previous() {
            return false;
        }
        self.index -= 1;
        true
    }

    /// Step forward one day. Returns false at the end of the window.
    pub fn next(&mut self) -> bool {
        if !self.can_go_next() {
            return false;
        }
        self.index += 1;
        true
    }

    /// Jump to `date` if it lies in the window.
    pub fn select(&mut self, date: Date) -> bool {
        match self.days.iter().position(|d| *d == date) {
            Some(index) => {
                self.index = index;
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// VIEW
// =============================================================================

/// One cell of the day strip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaySummary {
    pub date: String,
    /// `Today` or the short weekday name.
    pub label: String,
    pub day_of_month: String,
    pub lead_count: usize,
    pub is_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledLead {
    #[serde(flatten)]
    pub lead: Lead,
    pub time_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayDetail {
    pub date: String,
    /// `Today` or the full weekday name.
    pub label: String,
    pub formatted_date: String,
    pub can_go_previous: bool,
    pub can_go_next: bool,
    pub leads: Vec<ScheduledLead>,
    /// Shown when `leads` is empty.
    pub empty_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarView {
    pub days: Vec<DaySummary>,
    pub selected: DayDetail,
    pub total_leads: usize,
}

/// Assemble the calendar for a cursor position from already-fetched leads.
///
/// # Errors
///
/// Returns a formatting error (not expected for in-range dates).
pub fn build_view(cursor: &CalendarCursor, offset: UtcOffset, leads: Vec<Lead>) -> Result<CalendarView, CalendarError> {
    let today = cursor.days()[0];
    let mut groups = group_by_day(leads, offset);

    let mut days = Vec::with_capacity(WINDOW_DAYS);
    for (i, date) in cursor.days().iter().enumerate() {
        let label = if *date == today { "Today".to_owned() } else { date.format(WEEKDAY_SHORT)? };
        days.push(DaySummary {
            date: date.format(DATE_KEY)?,
            label,
            day_of_month: date.format(DAY_OF_MONTH)?,
            lead_count: groups.get(date).map_or(0, Vec::len),
            is_selected: i == cursor.index(),
        });
    }
    let total_leads = days.iter().map(|d| d.lead_count).sum();

    let selected = cursor.selected();
    let mut leads = Vec::new();
    for lead in groups.remove(&selected).unwrap_or_default() {
        let time_label = match lead.scheduled_appointment_time {
            Some(at) => at.to_offset(offset).format(CLOCK_TIME)?,
            None => String::new(),
        };
        leads.push(ScheduledLead { lead, time_label });
    }
    let empty_message = if leads.is_empty() {
        Some(format!("No appointments for {}", selected.format(SHORT_DATE)?))
    } else {
        None
    };

    Ok(CalendarView {
        days,
        selected: DayDetail {
            date: selected.format(DATE_KEY)?,
            label: if selected == today { "Today".to_owned() } else { selected.format(WEEKDAY)? },
            formatted_date: selected.format(LONG_DATE)?,
            can_go_previous: cursor.can_go_previous(),
            can_go_next: cursor.can_go_next(),
            leads,
            empty_message,
        },
        total_leads,
    })
}

/// Parse a `yyyy-mm-dd` day key.
#[must_use]
pub fn parse_day(raw: &str) -> Option<Date> {
    Date::parse(raw.trim(), DATE_KEY).ok()
}

/// Calendar for `user` as of `now`, in the caller's offset. Team members see
/// their team's leads; users without a team see every scheduled lead.
#[allow(clippy::cast_possible_wrap)]
pub async fn calendar_at(
    state: &AppState,
    user: &User,
    now: OffsetDateTime,
    tz_offset_minutes: i32,
    day: Option<Date>,
) -> Result<CalendarView, CalendarError> {
    let offset = offset_from_minutes(tz_offset_minutes)?;
    let mut cursor = CalendarCursor::new(now.to_offset(offset).date());
    if let Some(day) = day {
        if !cursor.select(day) {
            return Err(CalendarError::DayOutOfRange(day.to_string()));
        }
    }

    let days = cursor.days();
    let from = days[0].midnight().assume_offset(offset);
    let until = from + Duration::days(WINDOW_DAYS as i64);
    let leads = state
        .store
        .scheduled_leads(user.team_id.as_deref(), from, until)
        .await?;
    debug!(uid = %user.uid, count = leads.len(), %from, %until, "calendar leads fetched");

    build_view(&cursor, offset, leads)
}

pub async fn calendar(
    state: &AppState,
    user: &User,
    tz_offset_minutes: i32,
    day: Option<Date>,
) -> Result<CalendarView, CalendarError> {
    calendar_at(state, user, OffsetDateTime::now_utc(), tz_offset_minutes, day).await
}

#[cfg(test)]
#[path = "calendar_test.rs"]
mod tests;
