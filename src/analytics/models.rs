//! Data models for the poll analytics pipeline

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Ingest payloads (the client-supplied portion of each event)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct PageViewData {
    pub poll_id: String,
    pub session_id: String,
    /// Full referrer URL as sent by the client; reduced to its hostname
    /// before anything is stored.
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    /// Seconds the visitor spent on the page, if the client measured it.
    #[serde(default)]
    pub time_on_page: Option<f64>,
    /// Scroll depth percentage (0-100).
    #[serde(default)]
    pub scroll_depth: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoteEventData {
    pub poll_id: String,
    pub vote_id: String,
    pub option_index: i64,
    pub session_id: String,
    /// Seconds from page load to vote submission.
    #[serde(default)]
    pub time_to_vote: Option<f64>,
    #[serde(default)]
    pub is_first_vote_in_session: bool,
    #[serde(default)]
    pub previous_options_viewed: Vec<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareEventData {
    pub poll_id: String,
    pub platform: String,
    pub share_method: String,
    pub session_id: String,
    #[serde(default)]
    pub shared_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClickEventData {
    pub poll_id: String,
    pub session_id: String,
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub converted_to_vote: bool,
    #[serde(default)]
    pub time_to_conversion: Option<f64>,
}

// ---------------------------------------------------------------------------
// Stored events, one append-only table per variant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PageViewEvent {
    pub poll_id: String,
    pub visitor_hash: String,
    pub session_id: String,
    pub device_type: String,
    pub browser_family: String,
    pub os_family: String,
    pub country_code: Option<String>,
    pub region_code: Option<String>,
    pub referrer_domain: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub time_on_page: Option<f64>,
    pub scroll_depth: Option<f64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoteEvent {
    pub poll_id: String,
    pub vote_id: String,
    pub option_index: i64,
    pub visitor_hash: String,
    pub session_id: String,
    pub device_type: String,
    pub browser_family: String,
    pub country_code: Option<String>,
    pub region_code: Option<String>,
    pub time_to_vote: Option<f64>,
    pub is_first_vote_in_session: bool,
    pub previous_options_viewed: Vec<i64>,
    pub created_at: i64,
}

/// Database shape of [`VoteEvent`]: previously-viewed options are carried as
/// the raw JSON text of their column.
#[derive(Debug, FromRow)]
pub struct VoteEventRow {
    pub poll_id: String,
    pub vote_id: String,
    pub option_index: i64,
    pub visitor_hash: String,
    pub session_id: String,
    pub device_type: String,
    pub browser_family: String,
    pub country_code: Option<String>,
    pub region_code: Option<String>,
    pub time_to_vote: Option<f64>,
    pub is_first_vote_in_session: bool,
    pub previous_options_viewed: Option<String>,
    pub created_at: i64,
}

impl VoteEventRow {
    pub fn into_event(self) -> VoteEvent {
        let previous_options_viewed = self
            .previous_options_viewed
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();

        VoteEvent {
            poll_id: self.poll_id,
            vote_id: self.vote_id,
            option_index: self.option_index,
            visitor_hash: self.visitor_hash,
            session_id: self.session_id,
            device_type: self.device_type,
            browser_family: self.browser_family,
            country_code: self.country_code,
            region_code: self.region_code,
            time_to_vote: self.time_to_vote,
            is_first_vote_in_session: self.is_first_vote_in_session,
            previous_options_viewed,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ShareEvent {
    pub poll_id: String,
    pub platform: String,
    pub share_method: String,
    pub visitor_hash: String,
    pub session_id: String,
    pub device_type: String,
    pub browser_family: String,
    pub country_code: Option<String>,
    pub region_code: Option<String>,
    pub shared_url: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClickEvent {
    pub poll_id: String,
    pub referrer_domain: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub visitor_hash: String,
    pub session_id: String,
    pub device_type: String,
    pub browser_family: String,
    pub country_code: Option<String>,
    pub region_code: Option<String>,
    pub converted_to_vote: bool,
    pub time_to_conversion: Option<f64>,
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Per-poll analytics summary
// ---------------------------------------------------------------------------

/// One row per poll, created implicitly on the first event and mutated in
/// place by the metric updaters afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct PollAnalyticsSummary {
    pub poll_id: String,
    pub total_views: i64,
    pub unique_viewers: i64,
    pub total_votes: i64,
    pub total_shares: i64,
    /// total_votes / total_views, 0 when there are no views.
    pub completion_rate: f64,
    pub bounce_rate: f64,
    pub avg_time_on_page: f64,
    pub avg_time_to_vote: f64,
    /// Click-throughs per share, 0 when there are no shares.
    pub viral_coefficient: f64,
    pub share_to_vote_ratio: f64,
    pub return_visitor_rate: f64,
    pub interaction_rate: f64,
    pub device_breakdown: BTreeMap<String, i64>,
    pub browser_breakdown: BTreeMap<String, i64>,
    pub os_breakdown: BTreeMap<String, i64>,
    pub share_breakdown: BTreeMap<String, i64>,
    /// UTC hour (0-23) with the most page views.
    pub peak_hour: Option<i64>,
    pub updated_at: i64,
}

impl PollAnalyticsSummary {
    /// Zeroed summary for a poll that has not received any events yet.
    pub fn empty(poll_id: &str) -> Self {
        PollAnalyticsSummary {
            poll_id: poll_id.to_string(),
            total_views: 0,
            unique_viewers: 0,
            total_votes: 0,
            total_shares: 0,
            completion_rate: 0.0,
            bounce_rate: 0.0,
            avg_time_on_page: 0.0,
            avg_time_to_vote: 0.0,
            viral_coefficient: 0.0,
            share_to_vote_ratio: 0.0,
            return_visitor_rate: 0.0,
            interaction_rate: 0.0,
            device_breakdown: BTreeMap::new(),
            browser_breakdown: BTreeMap::new(),
            os_breakdown: BTreeMap::new(),
            share_breakdown: BTreeMap::new(),
            peak_hour: None,
            updated_at: 0,
        }
    }
}

/// Database shape of the summary: breakdown maps are JSON text columns.
#[derive(Debug, FromRow)]
pub struct SummaryRow {
    pub poll_id: String,
    pub total_views: i64,
    pub unique_viewers: i64,
    pub total_votes: i64,
    pub total_shares: i64,
    pub completion_rate: f64,
    pub bounce_rate: f64,
    pub avg_time_on_page: f64,
    pub avg_time_to_vote: f64,
    pub viral_coefficient: f64,
    pub share_to_vote_ratio: f64,
    pub return_visitor_rate: f64,
    pub interaction_rate: f64,
    pub device_breakdown: String,
    pub browser_breakdown: String,
    pub os_breakdown: String,
    pub share_breakdown: String,
    pub peak_hour: Option<i64>,
    pub updated_at: i64,
}

impl SummaryRow {
    pub fn into_summary(self) -> PollAnalyticsSummary {
        // Unreadable breakdown JSON counts as an empty map.
        let parse = |raw: &str| serde_json::from_str(raw).unwrap_or_default();

        PollAnalyticsSummary {
            device_breakdown: parse(&self.device_breakdown),
            browser_breakdown: parse(&self.browser_breakdown),
            os_breakdown: parse(&self.os_breakdown),
            share_breakdown: parse(&self.share_breakdown),
            poll_id: self.poll_id,
            total_views: self.total_views,
            unique_viewers: self.unique_viewers,
            total_votes: self.total_votes,
            total_shares: self.total_shares,
            completion_rate: self.completion_rate,
            bounce_rate: self.bounce_rate,
            avg_time_on_page: self.avg_time_on_page,
            avg_time_to_vote: self.avg_time_to_vote,
            viral_coefficient: self.viral_coefficient,
            share_to_vote_ratio: self.share_to_vote_ratio,
            return_visitor_rate: self.return_visitor_rate,
            interaction_rate: self.interaction_rate,
            peak_hour: self.peak_hour,
            updated_at: self.updated_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregated shapes used by retrieval and export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DailyAnalytics {
    pub date: NaiveDate,
    pub views: i64,
    pub unique_viewers: i64,
    pub votes: i64,
    pub shares: i64,
    pub clicks: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryStat {
    pub country_code: String,
    pub views: i64,
    pub votes: i64,
}

impl CountryStat {
    /// Joins per-country view and vote counts. `views` arrives ordered
    /// descending and capped by the storage query; vote counts for countries
    /// outside that set are dropped with it.
    pub fn merge(views: Vec<(String, i64)>, votes: Vec<(String, i64)>) -> Vec<CountryStat> {
        let vote_map: BTreeMap<String, i64> = votes.into_iter().collect();
        views
            .into_iter()
            .map(|(country_code, views)| CountryStat {
                votes: vote_map.get(&country_code).copied().unwrap_or(0),
                country_code,
                views,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DevicePerformance {
    pub device_type: String,
    pub views: i64,
    pub avg_time_on_page: f64,
    pub bounce_rate: f64,
}

/// Database shape of [`DevicePerformance`] carrying the raw bounce count.
#[derive(Debug, FromRow)]
pub struct DevicePerfRow {
    pub device_type: String,
    pub views: i64,
    pub avg_time_on_page: f64,
    pub bounced: i64,
}

impl DevicePerfRow {
    pub fn into_performance(self) -> DevicePerformance {
        let bounce_rate = if self.views > 0 {
            self.bounced as f64 / self.views as f64
        } else {
            0.0
        };

        DevicePerformance {
            device_type: self.device_type,
            views: self.views,
            avg_time_on_page: self.avg_time_on_page,
            bounce_rate,
        }
    }
}

/// Merges per-day buckets from the four event logs into one ordered series.
/// `view_buckets` carries (day_start, views, unique_viewers); the others
/// carry (day_start, count). Day starts are unix seconds at UTC midnight.
pub fn merge_daily_buckets(
    view_buckets: Vec<(i64, i64, i64)>,
    vote_buckets: Vec<(i64, i64)>,
    share_buckets: Vec<(i64, i64)>,
    click_buckets: Vec<(i64, i64)>,
) -> Vec<DailyAnalytics> {
    let mut days: BTreeMap<NaiveDate, DailyAnalytics> = BTreeMap::new();

    fn day_row(
        days: &mut BTreeMap<NaiveDate, DailyAnalytics>,
        day_start: i64,
    ) -> Option<&mut DailyAnalytics> {
        let date = DateTime::from_timestamp(day_start, 0)?.date_naive();
        Some(days.entry(date).or_insert(DailyAnalytics {
            date,
            views: 0,
            unique_viewers: 0,
            votes: 0,
            shares: 0,
            clicks: 0,
        }))
    }

    for (day, views, unique) in view_buckets {
        if let Some(row) = day_row(&mut days, day) {
            row.views = views;
            row.unique_viewers = unique;
        }
    }
    for (day, votes) in vote_buckets {
        if let Some(row) = day_row(&mut days, day) {
            row.votes = votes;
        }
    }
    for (day, shares) in share_buckets {
        if let Some(row) = day_row(&mut days, day) {
            row.shares = shares;
        }
    }
    for (day, clicks) in click_buckets {
        if let Some(row) = day_row(&mut days, day) {
            row.clicks = clicks;
        }
    }

    days.into_values().collect()
}
