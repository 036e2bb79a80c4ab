use axum::body::{Body, to_bytes};
use axum::http::Request;
use tower::ServiceExt;

use super::*;
use crate::model::Role;
use crate::state::test_helpers::{seed_user, test_app};

#[test]
fn store_errors_map_to_statuses() {
    assert_eq!(store_error_to_status(&StoreError::not_found("users", "u1")), StatusCode::NOT_FOUND);
    assert_eq!(store_error_to_status(&StoreError::Unavailable("down".into())), StatusCode::BAD_GATEWAY);
    assert_eq!(
        store_error_to_status(&StoreError::Database(sqlx::Error::PoolClosed)),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn error_bodies_carry_message() {
    let (status, Json(body)) = bad_request("missing file field");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, serde_json::json!({ "error": "missing file field" }));

    let (status, Json(body)) = api_error(StatusCode::BAD_GATEWAY, &"mail relay refused");
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "mail relay refused");
}

#[tokio::test]
async fn healthz_is_ok() {
    assert_eq!(healthz().await, StatusCode::OK);
}

#[tokio::test]
async fn app_router_builds_over_memory_state() {
    let test = test_app();
    let _router: Router = app(test.state.clone());
}

#[test]
fn conflicts_map_to_409() {
    let err = StoreError::Conflict { collection: "users", id: "dana@example.com".into() };
    assert_eq!(store_error_to_status(&err), StatusCode::CONFLICT);
}

#[tokio::test]
async fn emailed_reset_link_opens_the_reset_form() {
    let test = test_app();
    let user = seed_user(&test.store, "Dana Reyes", Role::Agent, None).await;
    password_reset::request_password_reset(&test.state, &user.email).await.unwrap();

    let sent = test.mailer.sent().await;
    let start = sent[0].html.find("href=\"").unwrap() + "href=\"".len();
    let link: String = sent[0].html[start..].chars().take_while(|c| *c != '"').collect();
    let path = link.strip_prefix(&test.state.config.public_base_url).unwrap().to_owned();
    assert!(path.starts_with("/reset-password?token="));
    let token = path.trim_start_matches("/reset-password?token=").to_owned();

    let response = app(test.state.clone())
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(body.to_vec()).unwrap();
    assert!(html.contains(&format!("value=\"{token}\"")));
    assert!(html.contains("/api/auth/password-reset/confirm"));
}
