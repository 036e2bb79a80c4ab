use time::{Duration, OffsetDateTime};

use super::*;
use crate::model::{Lead, Role};
use crate::state::test_helpers::{seed_user, test_app};
use crate::store::{LeadStore, StoreError};

fn query(tz: Option<i32>, day: Option<&str>) -> Query<CalendarQuery> {
    Query(CalendarQuery { tz_offset_minutes: tz, day: day.map(str::to_owned) })
}

#[test]
fn calendar_errors_map_to_statuses() {
    assert_eq!(calendar_error_to_status(&CalendarError::InvalidOffset(9999)), StatusCode::BAD_REQUEST);
    assert_eq!(
        calendar_error_to_status(&CalendarError::DayOutOfRange("2030-01-01".into())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        calendar_error_to_status(&CalendarError::Store(StoreError::Unavailable("down".into()))),
        StatusCode::BAD_GATEWAY
    );
}

#[tokio::test]
async fn calendar_defaults_to_today_in_utc() {
    let app = test_app();
    let user = seed_user(&app.store, "Dana Reyes", Role::Agent, None).await;
    let soon = OffsetDateTime::now_utc() + Duration::days(3);
    app.store
        .insert_lead(&Lead {
            id: "lead-1".into(),
            customer_name: "Pat Homeowner".into(),
            scheduled_appointment_time: Some(soon),
            team_id: None,
            status: "scheduled".into(),
            extra: serde_json::Value::Null,
        })
        .await
        .unwrap();

    let auth = AuthUser { user, token: String::new() };
    let Json(view) = calendar(State(app.state.clone()), auth, query(None, None)).await.unwrap();
    assert_eq!(view.days.len(), 14);
    assert_eq!(view.selected.label, "Today");
    assert_eq!(view.total_leads, 1);
}

#[tokio::test]
async fn malformed_day_is_bad_request() {
    let app = test_app();
    let user = seed_user(&app.store, "Dana Reyes", Role::Agent, None).await;
    let auth = AuthUser { user, token: String::new() };

    let Err((status, Json(payload))) = calendar(State(app.state.clone()), auth, query(None, Some("tomorrow"))).await
    else {
        panic!("calendar should fail");
    };
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"], "invalid day: tomorrow");
}

#[tokio::test]
async fn out_of_range_offset_is_bad_request() {
    let app = test_app();
    let user = seed_user(&app.store, "Dana Reyes", Role::Agent, None).await;
    let auth = AuthUser { user, token: String::new() };

    let Err((status, _)) = calendar(State(app.state.clone()), auth, query(Some(100_000), None)).await else {
        panic!("calendar should fail");
    };
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
