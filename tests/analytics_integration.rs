//! Integration tests for the analytics ingest pipeline
//!
//! These tests drive the event recorders the way the ingest handlers do,
//! with real request headers, then assert on the summary the metric
//! updaters leave behind. The recorders are fail-open: nothing here may
//! panic or error no matter what storage does.

use axum::http::HeaderMap;
use pollit::analytics::models::{PageViewData, ShareEventData, VoteEventData};
use pollit::analytics::{EventRecorder, MetricUpdater};
use pollit::storage::{EventFilter, EventKind, SqliteStorage, Storage};
use std::sync::Arc;

const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0 Safari/537.36";
const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Safari/604.1";

/// Helper to create test storage
async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 5).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn headers(ip: &str, user_agent: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert("x-forwarded-for", ip.parse().unwrap());
    h.insert("user-agent", user_agent.parse().unwrap());
    h
}

fn view(poll_id: &str, session_id: &str, time_on_page: Option<f64>) -> PageViewData {
    PageViewData {
        poll_id: poll_id.to_string(),
        session_id: session_id.to_string(),
        referrer: None,
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        time_on_page,
        scroll_depth: None,
    }
}

fn vote(poll_id: &str, vote_id: &str) -> VoteEventData {
    VoteEventData {
        poll_id: poll_id.to_string(),
        vote_id: vote_id.to_string(),
        option_index: 0,
        session_id: "sess-1".to_string(),
        time_to_vote: Some(5.0),
        is_first_vote_in_session: true,
        previous_options_viewed: vec![],
    }
}

fn share(poll_id: &str, platform: &str) -> ShareEventData {
    ShareEventData {
        poll_id: poll_id.to_string(),
        platform: platform.to_string(),
        share_method: "button".to_string(),
        session_id: "sess-1".to_string(),
        shared_url: None,
    }
}

#[tokio::test]
async fn test_views_and_votes_drive_the_summary() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));

    // three views from two visitors, then one vote
    let visitor_a = headers("203.0.113.7", DESKTOP_UA);
    let visitor_b = headers("203.0.113.8", DESKTOP_UA);

    recorder.track_page_view(&visitor_a, view("p1", "s1", None)).await;
    recorder.track_page_view(&visitor_a, view("p1", "s1", None)).await;
    recorder.track_page_view(&visitor_b, view("p1", "s2", None)).await;
    recorder.track_vote(&visitor_b, vote("p1", "v1")).await;

    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert_eq!(summary.total_views, 3);
    assert_eq!(summary.unique_viewers, 2);
    assert_eq!(summary.total_votes, 1);
    assert!((summary.completion_rate - 1.0 / 3.0).abs() < 1e-9);
    assert!((summary.interaction_rate - 1.0 / 3.0).abs() < 1e-9);

    // visitor a viewed twice, so half the unique viewers returned
    assert!((summary.return_visitor_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_vote_without_views_keeps_completion_at_zero() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));

    recorder
        .track_vote(&headers("203.0.113.7", DESKTOP_UA), vote("p1", "v1"))
        .await;

    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert_eq!(summary.total_votes, 1);
    assert_eq!(summary.total_views, 0);
    assert_eq!(summary.completion_rate, 0.0);
}

#[tokio::test]
async fn test_engagement_metrics_recompute() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));

    let phone = headers("203.0.113.7", IPHONE_UA);
    let desktop = headers("203.0.113.8", DESKTOP_UA);

    // one quick view and one long view from the phone, one view with no
    // dwell time from the desktop: two bounces out of three views
    recorder.track_page_view(&phone, view("p1", "s1", Some(4.0))).await;
    recorder.track_page_view(&phone, view("p1", "s1", Some(40.0))).await;
    recorder.track_page_view(&desktop, view("p1", "s2", None)).await;

    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert!((summary.bounce_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!((summary.avg_time_on_page - 22.0).abs() < 1e-9);
    assert!((summary.return_visitor_rate - 0.5).abs() < 1e-9);
    assert!(summary.peak_hour.is_some());

    assert_eq!(summary.device_breakdown.get("mobile"), Some(&2));
    assert_eq!(summary.device_breakdown.get("desktop"), Some(&1));
    assert_eq!(summary.browser_breakdown.get("safari"), Some(&2));
    assert_eq!(summary.browser_breakdown.get("chrome"), Some(&1));
    assert_eq!(summary.os_breakdown.get("ios"), Some(&2));
    assert_eq!(summary.os_breakdown.get("windows"), Some(&1));
}

#[tokio::test]
async fn test_share_and_click_ratios() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));
    let h = headers("203.0.113.7", DESKTOP_UA);

    recorder.track_vote(&h, vote("p1", "v1")).await;
    recorder.track_share(&h, share("p1", "twitter")).await;
    recorder.track_share(&h, share("p1", "whatsapp")).await;

    let click = pollit::analytics::models::ClickEventData {
        poll_id: "p1".to_string(),
        session_id: "sess-3".to_string(),
        referrer: Some("https://twitter.com/status/1".to_string()),
        utm_source: None,
        utm_medium: None,
        utm_campaign: None,
        converted_to_vote: true,
        time_to_conversion: Some(12.0),
    };
    recorder.track_click(&h, click).await;

    let summary = storage.get_poll_analytics("p1").await.unwrap().unwrap();
    assert_eq!(summary.total_shares, 2);
    // two shares per vote, one click-through for two shares
    assert!((summary.share_to_vote_ratio - 2.0).abs() < 1e-9);
    assert!((summary.viral_coefficient - 0.5).abs() < 1e-9);
    assert_eq!(summary.share_breakdown.get("twitter"), Some(&1));
    assert_eq!(summary.share_breakdown.get("whatsapp"), Some(&1));

    assert_eq!(storage.count_events("p1", EventKind::Click).await.unwrap(), 1);
}

#[tokio::test]
async fn test_visitor_context_reaches_the_event_row() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));

    let mut h = headers("203.0.113.7", IPHONE_UA);
    h.insert("x-vercel-ip-country", "DE".parse().unwrap());
    h.insert("x-vercel-ip-country-region", "BE".parse().unwrap());

    let mut data = view("p1", "s1", None);
    data.referrer = Some("https://News.Ycombinator.com/item?id=42".to_string());
    data.utm_source = Some("newsletter".to_string());
    recorder.track_page_view(&h, data).await;

    let rows = storage
        .raw_page_views("p1", &EventFilter::default(), 10)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];

    // referrer is reduced to its hostname; the full URL is never stored
    assert_eq!(row.referrer_domain.as_deref(), Some("news.ycombinator.com"));
    assert_eq!(row.utm_source.as_deref(), Some("newsletter"));
    assert_eq!(row.country_code.as_deref(), Some("de"));
    assert_eq!(row.region_code.as_deref(), Some("be"));
    assert_eq!(row.device_type, "mobile");
    assert_eq!(row.os_family, "ios");

    // the visitor hash is a hex digest, never the raw ip or user agent
    assert_eq!(row.visitor_hash.len(), 64);
    assert!(!row.visitor_hash.contains("203.0.113.7"));
}

#[tokio::test]
async fn test_metric_recompute_is_idempotent() {
    let storage = create_test_storage().await;
    let recorder = EventRecorder::new(Arc::clone(&storage));

    let a = headers("203.0.113.7", DESKTOP_UA);
    let b = headers("203.0.113.8", IPHONE_UA);
    recorder.track_page_view(&a, view("p1", "s1", Some(4.0))).await;
    recorder.track_page_view(&b, view("p1", "s2", Some(30.0))).await;
    recorder.track_vote(&a, vote("p1", "v1")).await;
    recorder.track_share(&a, share("p1", "twitter")).await;

    let updater = MetricUpdater::new(Arc::clone(&storage));
    updater.update_all("p1").await.unwrap();
    let first = storage.get_poll_analytics("p1").await.unwrap().unwrap();

    updater.update_all("p1").await.unwrap();
    updater.update_all("p1").await.unwrap();
    let second = storage.get_poll_analytics("p1").await.unwrap().unwrap();

    assert_eq!(first.unique_viewers, second.unique_viewers);
    assert_eq!(first.completion_rate, second.completion_rate);
    assert_eq!(first.bounce_rate, second.bounce_rate);
    assert_eq!(first.avg_time_on_page, second.avg_time_on_page);
    assert_eq!(first.share_to_vote_ratio, second.share_to_vote_ratio);
    assert_eq!(first.return_visitor_rate, second.return_visitor_rate);
    assert_eq!(first.device_breakdown, second.device_breakdown);
    assert_eq!(first.peak_hour, second.peak_hour);
}

#[tokio::test]
async fn test_recorders_fail_open_when_storage_is_broken() {
    // No init(): every insert hits a missing table
    let storage: Arc<dyn Storage> =
        Arc::new(SqliteStorage::new("sqlite::memory:", 5).await.unwrap());
    let recorder = EventRecorder::new(Arc::clone(&storage));
    let h = headers("203.0.113.7", DESKTOP_UA);

    // none of these may panic or surface an error
    recorder.track_page_view(&h, view("p1", "s1", None)).await;
    recorder.track_vote(&h, vote("p1", "v1")).await;
    recorder.track_share(&h, share("p1", "twitter")).await;
    recorder
        .track_click(
            &h,
            pollit::analytics::models::ClickEventData {
                poll_id: "p1".to_string(),
                session_id: "s1".to_string(),
                referrer: None,
                utm_source: None,
                utm_medium: None,
                utm_campaign: None,
                converted_to_vote: false,
                time_to_conversion: None,
            },
        )
        .await;

    // the dropped events are gone, not queued: after the schema appears,
    // every log is empty
    storage.init().await.unwrap();
    assert_eq!(storage.count_events("p1", EventKind::PageView).await.unwrap(), 0);
    assert_eq!(storage.count_events("p1", EventKind::Vote).await.unwrap(), 0);
    assert_eq!(storage.count_events("p1", EventKind::Share).await.unwrap(), 0);
    assert_eq!(storage.count_events("p1", EventKind::Click).await.unwrap(), 0);
}
