//! Integration tests for the public ingest endpoints
//!
//! The ingest listener accepts tracking beacons from poll pages. These tests
//! verify that each beacon lands in the right event log with its visitor
//! context attached, and that the endpoints stay fail-open: a broken storage
//! backend never surfaces to the posting page.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use pollit::ingest::create_ingest_router;
use pollit::storage::{EventFilter, EventKind, SqliteStorage, Storage};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Safari/604.1";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Tracking beacon with the headers a real poll page would carry.
fn beacon(uri: &str, body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.9")
        .header("user-agent", IPHONE_UA)
        .header("x-vercel-ip-country", "DE")
        .body(Body::from(body))
        .unwrap()
}

async fn assert_accepted(app: &Router, request: Request<Body>) {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "accepted");
}

#[tokio::test]
async fn test_ingest_health_endpoint() {
    let app = create_ingest_router(create_test_storage().await);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "OK");
}

#[tokio::test]
async fn test_tracked_view_lands_with_visitor_context() {
    let storage = create_test_storage().await;
    let app = create_ingest_router(Arc::clone(&storage));

    assert_accepted(
        &app,
        beacon(
            "/track/view",
            r#"{"poll_id": "p1", "session_id": "s1", "referrer": "https://t.co/abc", "time_on_page": 42.5}"#
                .to_string(),
        ),
    )
    .await;

    let views = storage
        .raw_page_views("p1", &EventFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.session_id, "s1");
    assert_eq!(view.device_type, "mobile");
    assert_eq!(view.os_family, "ios");
    assert_eq!(view.country_code.as_deref(), Some("de"));
    assert_eq!(view.referrer_domain.as_deref(), Some("t.co"));
    assert_eq!(view.time_on_page, Some(42.5));
    assert_eq!(view.visitor_hash.len(), 64);
    assert!(!view.visitor_hash.contains("198.51.100.9"));

    // the view also materialized a summary row with its counter bumped
    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert_eq!(summary.total_views, 1);
    assert_eq!(summary.unique_viewers, 1);
}

#[tokio::test]
async fn test_every_event_kind_is_accepted_and_counted() {
    let storage = create_test_storage().await;
    let app = create_ingest_router(Arc::clone(&storage));

    assert_accepted(
        &app,
        beacon(
            "/track/view",
            r#"{"poll_id": "p1", "session_id": "s1"}"#.to_string(),
        ),
    )
    .await;
    assert_accepted(
        &app,
        beacon(
            "/track/vote",
            r#"{"poll_id": "p1", "vote_id": "v1", "option_index": 1, "session_id": "s1", "time_to_vote": 3.0}"#
                .to_string(),
        ),
    )
    .await;
    assert_accepted(
        &app,
        beacon(
            "/track/share",
            r#"{"poll_id": "p1", "platform": "twitter", "share_method": "button", "session_id": "s1"}"#
                .to_string(),
        ),
    )
    .await;
    assert_accepted(
        &app,
        beacon(
            "/track/click",
            r#"{"poll_id": "p1", "session_id": "s2", "converted_to_vote": true}"#.to_string(),
        ),
    )
    .await;

    assert_eq!(storage.count_events("p1", EventKind::PageView).await.unwrap(), 1);
    assert_eq!(storage.count_events("p1", EventKind::Vote).await.unwrap(), 1);
    assert_eq!(storage.count_events("p1", EventKind::Share).await.unwrap(), 1);
    assert_eq!(storage.count_events("p1", EventKind::Click).await.unwrap(), 1);

    let votes = storage
        .raw_votes("p1", &EventFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(votes[0].option_index, 1);
    assert_eq!(votes[0].time_to_vote, Some(3.0));

    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert_eq!(summary.total_views, 1);
    assert_eq!(summary.total_votes, 1);
    assert_eq!(summary.total_shares, 1);
    assert_eq!(summary.share_breakdown.get("twitter"), Some(&1));
}

#[tokio::test]
async fn test_ingest_stays_up_when_storage_is_broken() {
    // storage without init() has no tables, so every insert fails
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    let storage: Arc<dyn Storage> = Arc::new(storage);
    let app = create_ingest_router(Arc::clone(&storage));

    assert_accepted(
        &app,
        beacon(
            "/track/view",
            r#"{"poll_id": "p1", "session_id": "s1"}"#.to_string(),
        ),
    )
    .await;

    // the event was dropped, not queued
    storage.init().await.unwrap();
    assert_eq!(storage.count_events("p1", EventKind::PageView).await.unwrap(), 0);
}

#[tokio::test]
async fn test_malformed_beacon_is_rejected_without_side_effects() {
    let storage = create_test_storage().await;
    let app = create_ingest_router(Arc::clone(&storage));

    // missing poll_id and session_id
    let response = app
        .clone()
        .oneshot(beacon("/track/view", r#"{"nope": true}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // not JSON at all
    let response = app
        .oneshot(beacon("/track/view", "view p1".to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(storage.count_events("p1", EventKind::PageView).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cors_allows_any_poll_page_origin() {
    let app = create_ingest_router(create_test_storage().await);

    let preflight = Request::builder()
        .method("OPTIONS")
        .uri("/track/view")
        .header("origin", "https://polls.example.com")
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(preflight).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
}
