//! HTTP API tests
//!
//! Tests cover:
//! - Health endpoint (no identity required)
//! - Caller identity from header or query string
//! - Catalog listing and unknown courses
//! - Session create/list/detail and ownership
//! - Answer updates, error bodies and the retry endpoint
//! - Leaderboard, metrics and the event stream handshake

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use flashq_server::build_router;
use helpers::{seed_cards, setup, TestContext, ALICE, BOB, COURSE};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot`

async fn setup_app(cards: i64) -> (TestContext, Router) {
    let ctx = setup(None).await;
    seed_cards(&ctx.repo, cards).await;
    let app = build_router(ctx.state.clone());
    (ctx, app)
}

fn request(method: &str, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("Should parse JSON")
    };
    (status, body)
}

async fn create_session(app: &Router, user: i64) -> Value {
    let (status, body) = send(
        app,
        request(
            "POST",
            "/api/test-sessions",
            Some(user),
            Some(json!({ "course_slug": COURSE })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

// =============================================================================
// Health and identity
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_no_identity_required() {
    let (_ctx, app) = setup_app(0).await;

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "flashq-server");
    assert!(body["version"].is_string());
    assert_eq!(body["connections"], 0);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (_ctx, app) = setup_app(2).await;

    let (status, body) = send(&app, request("GET", "/api/test-sessions", None, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let uri = format!("/api/test-sessions?user_id={}", ALICE);
    let (status, _) = send(&app, request("GET", &uri, None, None)).await;
    assert_eq!(status, StatusCode::OK);
}

// =============================================================================
// Catalog
// =============================================================================

#[tokio::test]
async fn test_catalog_endpoints() {
    let (_ctx, app) = setup_app(4).await;

    let (status, courses) = send(&app, request("GET", "/api/courses", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(courses[0]["slug"], COURSE);
    assert_eq!(courses[0]["name"], "Machine Learning 101");

    let uri = format!("/api/modules?course_slug={}", COURSE);
    let (status, modules) = send(&app, request("GET", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = modules
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Nets", "Trees"]);

    let uri = format!("/api/cards?course_slug={}", COURSE);
    let (status, cards) = send(&app, request("GET", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cards.as_array().unwrap().len(), 4);
    assert_eq!(cards[0]["uid"], 1);

    let (status, body) = send(
        &app,
        request("GET", "/api/modules?course_slug=unknown", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

// =============================================================================
// Sessions and answers
// =============================================================================

#[tokio::test]
async fn test_session_create_list_and_detail() {
    let (_ctx, app) = setup_app(3).await;

    let created = create_session(&app, ALICE).await;
    assert_eq!(created["is_active"], true);
    assert_eq!(created["user_id"], ALICE);
    let id = created["id"].as_str().unwrap().to_string();

    let (status, list) = send(&app, request("GET", "/api/test-sessions", Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["count_null"], 3);

    let uri = format!("/api/test-sessions/{}", id);
    let (status, detail) = send(&app, request("GET", &uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["id"], id.as_str());
    let answers = detail["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0]["uid"], 1);
    assert_eq!(answers[0]["status"], "null");
    assert_eq!(answers[0]["question"], "Question 1?");

    let (status, body) = send(&app, request("GET", &uri, Some(BOB), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(
        &app,
        request("GET", "/api/test-sessions/not-a-uuid", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_session_rejections() {
    let (_ctx, app) = setup_app(2).await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/api/test-sessions",
            Some(ALICE),
            Some(json!({ "course_slug": "unknown" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/api/test-sessions",
            Some(ALICE),
            Some(json!({ "course_slug": COURSE, "module_ids": [424242] })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_answer_flow_over_http() {
    let (ctx, app) = setup_app(2).await;
    let created = create_session(&app, ALICE).await;
    let id = created["id"].as_str().unwrap().to_string();

    let uri = format!("/api/test-sessions/{}", id);
    let (_, detail) = send(&app, request("GET", &uri, Some(ALICE), None)).await;
    let first = detail["answers"][0]["id"].as_str().unwrap().to_string();
    let second = detail["answers"][1]["id"].as_str().unwrap().to_string();

    let first_uri = format!("/api/user-answers/{}", first);
    let (status, _) = send(
        &app,
        request("PATCH", &first_uri, Some(ALICE), Some(json!({ "status": "maybe" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        request("PATCH", &first_uri, Some(BOB), Some(json!({ "status": "remember" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        request("PATCH", &first_uri, Some(ALICE), Some(json!({ "status": "remember" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"]["status"], "remember");
    assert_eq!(body["session"]["is_active"], true);

    let (status, _) = send(
        &app,
        request("PATCH", &first_uri, Some(ALICE), Some(json!({ "status": "forgot" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Retrying an active session is refused
    let retry_uri = format!("/api/test-sessions/{}/recommendation", id);
    let (status, _) = send(&app, request("POST", &retry_uri, Some(ALICE), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let second_uri = format!("/api/user-answers/{}", second);
    let (status, body) = send(
        &app,
        request("PATCH", &second_uri, Some(ALICE), Some(json!({ "status": "forgot" }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session"]["is_active"], false);

    let snapshot = ctx.state.metrics.snapshot();
    assert_eq!(snapshot.sessions_created, 1);
    assert_eq!(snapshot.answers_updated, 2);
}

#[tokio::test]
async fn test_unknown_answer_is_not_found() {
    let (_ctx, app) = setup_app(1).await;
    let uri = format!("/api/user-answers/{}", uuid::Uuid::now_v7());

    let (status, _) = send(
        &app,
        request("PATCH", &uri, Some(ALICE), Some(json!({ "status": "remember" }))),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Leaderboard, metrics and events
// =============================================================================

#[tokio::test]
async fn test_leaderboard_and_metrics() {
    let (_ctx, app) = setup_app(2).await;
    create_session(&app, ALICE).await;
    create_session(&app, BOB).await;

    let (status, board) = send(
        &app,
        request("GET", "/api/leaderboard?limit=1", Some(ALICE), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board.as_array().unwrap().len(), 1);
    assert_eq!(board[0]["started_sessions"], 1);

    let (status, metrics) = send(&app, request("GET", "/api/metrics", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["sessions_created"], 2);

    let responses = metrics["responses"].as_array().unwrap();
    let created = responses
        .iter()
        .find(|r| r["route"] == "/api/test-sessions" && r["status"] == 201)
        .expect("create responses are counted");
    assert_eq!(created["count"], 2);
}

#[tokio::test]
async fn test_event_stream_starts_with_pong() {
    let (ctx, app) = setup_app(0).await;
    let uri = format!("/api/events?user_id={}", ALICE);

    let response = app
        .clone()
        .oneshot(request("GET", &uri, None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    assert!(ctx.state.events.is_registered(ALICE));

    let mut body = response.into_body();
    let frame = body
        .frame()
        .await
        .expect("first frame")
        .expect("frame ok")
        .into_data()
        .expect("data frame");
    let text = String::from_utf8(frame.to_vec()).unwrap();
    assert!(text.contains("event: pong"), "unexpected first frame: {}", text);

    drop(body);
    assert!(!ctx.state.events.is_registered(ALICE));
}
