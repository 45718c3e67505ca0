//! Integration tests for the export pipeline
//!
//! These tests run real export requests through validation, rate limiting,
//! caching and serialization against an in-memory SQLite backend, and
//! assert on the bytes and metadata that come out.

use pollit::analytics::models::{PageViewEvent, VoteEvent};
use pollit::export::{
    ExportError, ExportFilters, ExportPipeline, ExportRequest, MemoryExportCache,
    TokenBucketLimiter,
};
use pollit::models::{Poll, PollType};
use pollit::storage::{SqliteStorage, Storage, SummaryCounter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 2023-11-15 00:00:00 UTC and the midnight after it.
const DAY0: i64 = 1_700_006_400;
const DAY1: i64 = DAY0 + 86_400;

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn pipeline(
    storage: &Arc<dyn Storage>,
    general_per_hour: u32,
    raw_per_hour: u32,
) -> ExportPipeline {
    ExportPipeline::new(
        Arc::clone(storage),
        Arc::new(MemoryExportCache::new(Duration::from_secs(60), 64)),
        Arc::new(TokenBucketLimiter::per_hour(general_per_hour)),
        Arc::new(TokenBucketLimiter::per_hour(raw_per_hour)),
        10_000,
    )
}

fn request(poll_id: &str, format: &str, granularity: &str) -> ExportRequest {
    ExportRequest {
        poll_id: poll_id.to_string(),
        format: format.to_string(),
        granularity: granularity.to_string(),
        filters: ExportFilters::default(),
    }
}

fn page_view(poll_id: &str, visitor: &str, created_at: i64) -> PageViewEvent {
    PageViewEvent {
        poll_id: poll_id.to_string(),
        visitor_hash: visitor.to_string(),
        session_id: "sess-1".to_string(),
        device_type: "mobile".to_string(),
        browser_family: "chrome".to_string(),
        os_family: "android".to_string(),
        country_code: Some("de".to_string()),
        region_code: None,
        referrer_domain: None,
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        time_on_page: Some(20.0),
        scroll_depth: None,
        created_at,
    }
}

/// Seed a poll with a couple of day-0 views and one vote so every
/// granularity has something to export.
async fn seed_poll(storage: &Arc<dyn Storage>, poll_id: &str) {
    storage
        .create_poll(&Poll {
            id: poll_id.to_string(),
            question: "Favorite color?".to_string(),
            options: vec!["red".to_string(), "blue".to_string()],
            poll_type: PollType::Single,
            hide_results: false,
            is_active: true,
            created_at: DAY0,
        })
        .await
        .unwrap();

    storage.ensure_summary(poll_id, DAY0).await.unwrap();
    for (visitor, ts) in [("h1", DAY0 + 100), ("h2", DAY0 + 200)] {
        storage
            .insert_page_view(&page_view(poll_id, visitor, ts))
            .await
            .unwrap();
        storage
            .increment_counter(poll_id, SummaryCounter::Views, ts)
            .await
            .unwrap();
    }

    storage
        .insert_vote_event(&VoteEvent {
            poll_id: poll_id.to_string(),
            vote_id: "v1".to_string(),
            option_index: 0,
            visitor_hash: "h1".to_string(),
            session_id: "sess-1".to_string(),
            device_type: "mobile".to_string(),
            browser_family: "chrome".to_string(),
            country_code: Some("de".to_string()),
            region_code: None,
            time_to_vote: Some(4.0),
            is_first_vote_in_session: true,
            previous_options_viewed: vec![],
            created_at: DAY0 + 300,
        })
        .await
        .unwrap();
    storage
        .increment_counter(poll_id, SummaryCounter::Votes, DAY0 + 300)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_summary_json_export_shape() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    let exports = pipeline(&storage, 5, 2);

    let completed = exports
        .export(request("p1", "json", "summary"), None, "198.51.100.1")
        .await
        .unwrap();

    assert!(!completed.from_cache);
    assert_eq!(completed.metadata.poll_id, "p1");
    assert_eq!(completed.metadata.record_count, 1);
    assert_eq!(completed.metadata.checksum.len(), 32);
    assert!(completed.metadata.export_id.starts_with("exp_"));

    let json: Value = serde_json::from_slice(&completed.body).unwrap();
    assert_eq!(json["poll"]["id"], "p1");
    assert_eq!(json["poll"]["question"], "Favorite color?");
    assert_eq!(json["summary"]["total_views"], 2);
    assert_eq!(json["summary"]["total_votes"], 1);
    // summary granularity carries no breakdown sections
    assert!(json.get("countries").is_none());
    assert!(json.get("devices").is_none());
    assert!(json.get("raw_events").is_none());
}

#[tokio::test]
async fn test_unknown_poll_is_not_found() {
    let storage = create_test_storage().await;
    let exports = pipeline(&storage, 5, 2);

    let err = exports
        .export(request("ghost", "json", "summary"), None, "198.51.100.1")
        .await
        .unwrap_err();

    match err {
        ExportError::NotFound(poll_id) => assert_eq!(poll_id, "ghost"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_validation_collects_every_error() {
    let storage = create_test_storage().await;
    let exports = pipeline(&storage, 5, 2);

    let err = exports
        .export(request("has spaces!", "pdf", "hourly"), None, "198.51.100.1")
        .await
        .unwrap_err();

    match err {
        ExportError::Validation(errors) => {
            assert_eq!(errors.len(), 3);
            assert!(errors.iter().any(|e| e.contains("poll id")));
            assert!(errors.iter().any(|e| e.contains("format")));
            assert!(errors.iter().any(|e| e.contains("granularity")));
        }
        other => panic!("expected Validation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rate_limit_applies_before_the_cache() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    let exports = pipeline(&storage, 5, 2);

    // cache hits still consume a token, so the sixth request is rejected
    // even though only the first one touched the database
    for _ in 0..5 {
        exports
            .export(request("p1", "json", "summary"), None, "198.51.100.1")
            .await
            .unwrap();
    }

    let err = exports
        .export(request("p1", "json", "summary"), None, "198.51.100.1")
        .await
        .unwrap_err();

    match err {
        ExportError::RateLimited { ms_before_next } => assert!(ms_before_next > 0),
        other => panic!("expected RateLimited, got {:?}", other),
    }

    // a different caller is unaffected
    exports
        .export(request("p1", "json", "summary"), None, "198.51.100.2")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_summary_exports_are_cached_raw_never_is() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    let exports = pipeline(&storage, 10, 10);

    let first = exports
        .export(request("p1", "csv", "summary"), None, "198.51.100.1")
        .await
        .unwrap();
    let second = exports
        .export(request("p1", "csv", "summary"), None, "198.51.100.1")
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.body, second.body);
    assert_eq!(first.metadata.checksum, second.metadata.checksum);

    let raw_a = exports
        .export(
            request("p1", "json", "raw"),
            Some("user-1".to_string()),
            "198.51.100.1",
        )
        .await
        .unwrap();
    let raw_b = exports
        .export(
            request("p1", "json", "raw"),
            Some("user-1".to_string()),
            "198.51.100.1",
        )
        .await
        .unwrap();

    assert!(!raw_a.from_cache);
    assert!(!raw_b.from_cache);
}

#[tokio::test]
async fn test_raw_exports_require_a_user_and_cap_rows() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    // three more views so the poll has five page-view rows
    for (visitor, ts) in [("h3", DAY0 + 400), ("h4", DAY0 + 500), ("h5", DAY0 + 600)] {
        storage
            .insert_page_view(&page_view("p1", visitor, ts))
            .await
            .unwrap();
    }
    let exports = pipeline(&storage, 10, 10);

    let err = exports
        .export(request("p1", "json", "raw"), None, "198.51.100.1")
        .await
        .unwrap_err();
    match err {
        ExportError::Validation(errors) => {
            assert!(errors.iter().any(|e| e.contains("user id")));
        }
        other => panic!("expected Validation, got {:?}", other),
    }

    let mut capped = request("p1", "json", "raw");
    capped.filters.max_rows = Some(2);
    let completed = exports
        .export(capped, Some("user-1".to_string()), "198.51.100.1")
        .await
        .unwrap();

    let json: Value = serde_json::from_slice(&completed.body).unwrap();
    assert_eq!(json["raw_events"]["page_views"].as_array().unwrap().len(), 2);
    // oldest rows win under the cap
    assert_eq!(json["raw_events"]["page_views"][0]["visitor_hash"], "h1");
    assert_eq!(json["raw_events"]["votes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_detailed_csv_carries_labeled_sections() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    let exports = pipeline(&storage, 10, 2);

    let completed = exports
        .export(request("p1", "csv", "detailed"), None, "198.51.100.1")
        .await
        .unwrap();

    let csv = String::from_utf8(completed.body).unwrap();
    assert!(csv.starts_with("Poll Analytics Export"));
    assert!(csv.contains("Summary"));
    assert!(csv.contains("Total Views,2"));
    assert!(csv.contains("Countries"));
    assert!(csv.contains("de,2,1"));
    assert!(csv.contains("Devices"));
    // the daily table only appears when a date range was requested
    assert!(!csv.contains("Daily"));

    let mut ranged = request("p1", "csv", "detailed");
    ranged.filters.start_date = Some("2023-11-15".to_string());
    ranged.filters.end_date = Some("2023-11-16".to_string());
    let completed = exports
        .export(ranged, None, "198.51.100.1")
        .await
        .unwrap();
    let csv = String::from_utf8(completed.body).unwrap();
    assert!(csv.contains("Daily"));
    assert!(csv.contains("2023-11-15"));
}

#[tokio::test]
async fn test_xlsx_export_is_a_zip_container() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    let exports = pipeline(&storage, 5, 2);

    let completed = exports
        .export(request("p1", "xlsx", "detailed"), None, "198.51.100.1")
        .await
        .unwrap();

    // xlsx is a zip archive; the container magic is stable
    assert!(completed.body.len() > 4);
    assert_eq!(&completed.body[..2], b"PK");
    assert!(completed.metadata.record_count >= 1);
}

#[tokio::test]
async fn test_date_filters_narrow_raw_exports() {
    let storage = create_test_storage().await;
    seed_poll(&storage, "p1").await;
    storage
        .insert_page_view(&page_view("p1", "h-next-day", DAY1 + 100))
        .await
        .unwrap();
    let exports = pipeline(&storage, 10, 10);

    let mut ranged = request("p1", "json", "raw");
    ranged.filters.start_date = Some("2023-11-16".to_string());
    ranged.filters.end_date = Some("2023-11-16".to_string());

    let completed = exports
        .export(ranged, Some("user-1".to_string()), "198.51.100.1")
        .await
        .unwrap();

    let json: Value = serde_json::from_slice(&completed.body).unwrap();
    let views = json["raw_events"]["page_views"].as_array().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0]["visitor_hash"], "h-next-day");
    assert_eq!(json["raw_events"]["votes"].as_array().unwrap().len(), 0);
}
