use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use courtside::api;
use courtside::engine::Engine;
use courtside::notify::NotifyHub;

// ── Test infrastructure ──────────────────────────────────────

fn test_app_with_hub() -> (Router, Arc<NotifyHub>) {
    let dir = std::env::temp_dir().join(format!("courtside_api_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(dir.join("courtside.wal"), notify.clone()).unwrap();
    (api::router(Arc::new(engine)), notify)
}

fn test_app() -> Router {
    test_app_with_hub().0
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_venue(app: &Router, name: &str, max_courts: u32) -> String {
    let (status, body) = send(app, "POST", "/venues", Some(json!({ "name": name, "maxCourts": max_courts }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

async fn book(app: &Router, venue: &str, court: &str, start: &str, end: &str, who: &str) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/bookings",
        Some(json!({
            "venueId": venue,
            "courtNumber": court,
            "startTime": start,
            "endTime": end,
            "bookedBy": who,
        })),
    )
    .await
}

// ── Scenarios ────────────────────────────────────────────────

#[tokio::test]
async fn arena_a_over_http() {
    let app = test_app();
    let arena = create_venue(&app, "Arena A", 2).await;

    let (status, alice) = book(&app, &arena, "Court 1", "2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "Alice").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(alice["startTime"], "2026-01-01T10:00:00.000Z");
    assert_eq!(alice["courtNumber"], "Court 1");

    let (status, err) = book(&app, &arena, "Court 1", "2026-01-01T10:30:00Z", "2026-01-01T11:30:00Z", "Bob").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["kind"], "conflict");
    assert!(err["message"].as_str().unwrap().contains(alice["id"].as_str().unwrap()));

    let (status, _) = book(&app, &arena, "Court 2", "2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "Bob").await;
    assert_eq!(status, StatusCode::CREATED);

    let uri = format!("/venues/{arena}/availability?start=2026-01-01T10:00:00Z&end=2026-01-01T11:00:00Z");
    let (status, avail) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(avail["bookedCourts"], 2);
    assert_eq!(avail["availableCourts"], 0);
    assert_eq!(avail["venueName"], "Arena A");
}

#[tokio::test]
async fn invalid_input_is_400() {
    let app = test_app();
    let arena = create_venue(&app, "Arena", 2).await;

    let (status, err) = book(&app, &arena, "Court 1", "2026-01-01T11:00:00Z", "2026-01-01T10:00:00Z", "Alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "invalid_input");

    let (status, _) = book(&app, &arena, "Court 1", "not a time", "2026-01-01T10:00:00Z", "Alice").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/bookings", Some(json!({ "venueId": arena }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/venues", Some(json!({ "name": "X", "maxCourts": 2, "extra": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/venues/not-a-ulid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", &format!("/venues/{arena}/availability?start=2026-01-01T10:00:00Z"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "GET", "/bookings?status=pending", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_ids_are_404() {
    let app = test_app();
    let ghost = Ulid::new();

    let (status, err) = send(&app, "GET", &format!("/venues/{ghost}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["kind"], "not_found");

    let (status, _) = send(&app, "DELETE", &format!("/bookings/{ghost}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = book(&app, &ghost.to_string(), "Court 1", "2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "Alice").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/slots/generate", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn venue_crud() {
    let app = test_app();
    let a = create_venue(&app, "Bravo", 2).await;
    create_venue(&app, "Alpha", 1).await;

    let (status, _) = send(&app, "POST", "/venues", Some(json!({ "name": "Bravo", "maxCourts": 3 }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, list) = send(&app, "GET", "/venues", None).await;
    let names: Vec<&str> = list.as_array().unwrap().iter().map(|v| v["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Alpha", "Bravo"]);

    let (status, updated) = send(&app, "PUT", &format!("/venues/{a}"), Some(json!({ "maxCourts": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Bravo");
    assert_eq!(updated["maxCourts"], 5);

    let (status, _) = send(&app, "PUT", &format!("/venues/{a}"), Some(json!({ "name": "Alpha" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, booking) = book(&app, &a, "Court 1", "2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "Alice").await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, "DELETE", &format!("/venues/{a}"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let booking_id = booking["id"].as_str().unwrap();
    let (status, removed) = send(&app, "DELETE", &format!("/bookings/{booking_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["bookedBy"], "Alice");

    let (status, body) = send(&app, "DELETE", &format!("/venues/{a}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
    let (status, _) = send(&app, "GET", &format!("/venues/{a}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_listing_and_lookup() {
    let app = test_app();
    let arena = create_venue(&app, "Arena", 2).await;

    let past_start = (Utc::now() - Duration::days(2)).to_rfc3339();
    let past_end = (Utc::now() - Duration::days(2) + Duration::hours(1)).to_rfc3339();
    let future_start = (Utc::now() + Duration::days(2)).to_rfc3339();
    let future_end = (Utc::now() + Duration::days(2) + Duration::hours(1)).to_rfc3339();

    let (_, old) = book(&app, &arena, "Court 1", &past_start, &past_end, "Alice").await;
    let (_, new) = book(&app, &arena, "Court 1", &future_start, &future_end, "Bob").await;

    let (status, expired) = send(&app, "GET", "/bookings?status=expired", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(expired.as_array().unwrap().len(), 1);
    assert_eq!(expired[0]["id"], old["id"]);
    assert_eq!(expired[0]["venue"]["name"], "Arena");

    let (_, active) = send(&app, "GET", "/bookings?status=active", None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["id"], new["id"]);

    let (_, all) = send(&app, "GET", &format!("/bookings?venueId={arena}"), None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);

    let id = new["id"].as_str().unwrap();
    let (status, one) = send(&app, "GET", &format!("/bookings/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(one["bookedBy"], "Bob");
    assert_eq!(one["venue"]["id"], arena.as_str());
}

#[tokio::test]
async fn slot_generation_over_http() {
    let app = test_app();
    let arena = create_venue(&app, "Arena", 2).await;

    let (status, first) = send(&app, "POST", "/slots/generate", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["createdCount"], 16);
    assert_eq!(first["skippedCount"], 0);
    assert_eq!(first["created"][0]["bookedBy"], "AUTO");

    let (_, second) = send(&app, "POST", "/slots/generate", None).await;
    assert_eq!(second["createdCount"], 0);
    assert_eq!(second["skippedCount"], 16);

    let (status, slots) = send(&app, "GET", &format!("/venues/{arena}/slots"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(slots.as_array().unwrap().len(), 16);
    assert!(slots.as_array().unwrap().iter().all(|s| s["isSlotBooked"] == false));
}

#[tokio::test]
async fn schedule_over_http() {
    let app = test_app();
    let arena = create_venue(&app, "Arena", 2).await;
    book(&app, &arena, "Court 1", "2026-01-01T10:00:00Z", "2026-01-01T11:00:00Z", "Alice").await;

    let uri = format!("/venues/{arena}/schedule?start=2026-01-01T09:00:00Z&end=2026-01-01T12:00:00Z");
    let (status, schedule) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(schedule.as_array().unwrap().len(), 2);
    assert_eq!(schedule[0]["courtNumber"], "Court 1");
    assert_eq!(schedule[0]["bookings"][0]["bookedBy"], "Alice");
    assert_eq!(schedule[0]["free"][0]["endTime"], "2026-01-01T10:00:00.000Z");
    assert_eq!(schedule[1]["free"][0]["startTime"], "2026-01-01T09:00:00.000Z");
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["venues"], 0);
}

#[tokio::test]
async fn events_for_unknown_venue_hold_no_channel() {
    let (app, notify) = test_app_with_hub();
    for _ in 0..20 {
        let (status, _) = send(&app, "GET", &format!("/venues/{}/events", Ulid::new()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    assert_eq!(notify.channel_count(), 0);

    let arena = create_venue(&app, "Arena", 1).await;
    send(&app, "DELETE", &format!("/venues/{arena}"), None).await;
    let (status, _) = send(&app, "GET", &format!("/venues/{arena}/events"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(notify.channel_count(), 0);
}
