use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use chrona::auth::JwtConfig;
use chrona::http::{self, AppState, REVALIDATE_HEADER};
use chrona::store::MemoryStore;

fn app() -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        JwtConfig::new("test_secret_key_for_jwt_token_testing", 3600, "chrona"),
    );
    http::router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<String>, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let revalidate = response
        .headers()
        .get(REVALIDATE_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, revalidate, value)
}

async fn sign_up(app: &Router, email: &str, name: &str) -> (String, String) {
    let (status, _, body) = send(
        app,
        Method::POST,
        "/auth/signup",
        None,
        Some(json!({ "email": email, "password": "secret1", "full_name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_requests_without_session_are_rejected() {
    let app = app();
    let (status, _, body) = send(&app, Method::GET, "/api/dashboard", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _, _) = send(&app, Method::GET, "/api/projects", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_up_sign_in_and_me() {
    let app = app();
    let (token, user_id) = sign_up(&app, "ada@example.com", "Ada").await;

    let (status, _, body) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], user_id);
    assert_eq!(body["profile"]["role"], "admin");

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/auth/signin",
        None,
        Some(json!({ "email": "ada@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, _, _) = send(&app, Method::POST, "/auth/signout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _, _) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_timesheet_approval_over_http() {
    let app = app();
    let (admin, _) = sign_up(&app, "ada@example.com", "Ada").await;
    let (freelancer, freelancer_id) = sign_up(&app, "bob@example.com", "Bob").await;

    // freelancer has no organization until assigned
    let (status, _, _) = send(&app, Method::GET, "/api/entries", Some(&freelancer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, revalidate, _) = send(
        &app,
        Method::POST,
        "/api/users/assign",
        Some(&admin),
        Some(json!({ "email": "bob@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revalidate.as_deref(), Some("/app/users"));

    let (status, _, project) = send(
        &app,
        Method::POST,
        "/api/projects",
        Some(&admin),
        Some(json!({ "name": "Website" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let project_id = project["id"].as_str().unwrap().to_string();

    let (status, _, _) = send(
        &app,
        Method::POST,
        &format!("/api/projects/{}/members", project_id),
        Some(&admin),
        Some(json!({ "user_id": freelancer_id, "hourly_rate": 40.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, revalidate, _) = send(
        &app,
        Method::POST,
        "/api/entries",
        Some(&freelancer),
        Some(json!({ "project_id": project_id, "date": "2024-01-02", "hours": 1.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(revalidate.as_deref(), Some("/app/time,/app/dashboard"));

    let (status, _, week) = send(
        &app,
        Method::GET,
        "/api/timesheets/week/2024-01-03",
        Some(&freelancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(week["aggregate"]["total_minutes"], 90);
    assert_eq!(week["timesheet"]["week_start"], "2024-01-01");
    let timesheet_id = week["timesheet"]["id"].as_str().unwrap().to_string();

    let (status, revalidate, body) = send(
        &app,
        Method::POST,
        &format!("/api/timesheets/{}/submit", timesheet_id),
        Some(&freelancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "submitted");
    assert_eq!(revalidate.as_deref(), Some("/app/timesheets,/app/dashboard"));

    let (status, _, body) = send(
        &app,
        Method::POST,
        &format!("/api/timesheets/{}/approve", timesheet_id),
        Some(&freelancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _, body) = send(
        &app,
        Method::POST,
        &format!("/api/timesheets/{}/approve", timesheet_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");

    let (status, _, body) = send(
        &app,
        Method::POST,
        &format!("/api/timesheets/{}/request-changes", timesheet_id),
        Some(&admin),
        Some(json!({ "comment": "Too late" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");

    let (status, _, body) = send(
        &app,
        Method::GET,
        &format!("/api/timesheets/{}/export", timesheet_id),
        Some(&freelancer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body.as_str(),
        Some("Date,Project,Hours,Description,Deliverable URL\n\"Jan 2, 2024\",\"Website\",\"1h 30m\",\"\",\"\"")
    );
}

#[tokio::test]
async fn test_entry_validation_errors_are_unprocessable() {
    let app = app();
    let (admin, _) = sign_up(&app, "ada@example.com", "Ada").await;

    let (status, _, body) = send(
        &app,
        Method::POST,
        "/api/entries",
        Some(&admin),
        Some(json!({ "project_id": "", "date": "2024-01-02", "hours": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Please select a project");
}
