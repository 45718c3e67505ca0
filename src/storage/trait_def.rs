use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::analytics::models::{
    ClickEvent, CountryStat, DailyAnalytics, DevicePerformance, PageViewEvent,
    PollAnalyticsSummary, ShareEvent, VoteEvent,
};
use crate::models::Poll;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("poll id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Event log variants. Each maps to a compile-time table name, so no SQL
/// identifier is ever built from runtime input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PageView,
    Vote,
    Share,
    Click,
}

impl EventKind {
    pub const fn table(&self) -> &'static str {
        match self {
            EventKind::PageView => "page_view_events",
            EventKind::Vote => "vote_events",
            EventKind::Share => "share_events",
            EventKind::Click => "click_events",
        }
    }
}

/// Summary counters bumped at event-insert time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryCounter {
    Views,
    Votes,
    Shares,
}

/// Dimensions the summary breakdown maps are grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakdownDimension {
    Device,
    Browser,
    Os,
    SharePlatform,
}

/// Timestamp/country/device restriction applied to the event logs by the
/// export queries. Dates are already resolved to unix-second bounds.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub start_ts: Option<i64>,
    pub end_ts: Option<i64>,
    pub country: Option<String>,
    pub device_type: Option<String>,
}

impl EventFilter {
    /// Inclusive timestamp bounds with open ends widened to the full range.
    pub fn ts_bounds(&self) -> (i64, i64) {
        (self.start_ts.unwrap_or(0), self.end_ts.unwrap_or(i64::MAX))
    }
}

/// Raw aggregates the engagement recompute reads in one pass.
#[derive(Debug, Clone, Default)]
pub struct EngagementAggregates {
    pub views: i64,
    pub bounced_views: i64,
    pub avg_time_on_page: f64,
    pub avg_time_to_vote: f64,
    pub unique_viewers: i64,
    pub returning_viewers: i64,
    pub shares: i64,
    pub clicks: i64,
    pub peak_hour: Option<i64>,
}

/// Recomputed engagement fields written back to the summary row.
#[derive(Debug, Clone, Default)]
pub struct EngagementUpdate {
    pub bounce_rate: f64,
    pub avg_time_on_page: f64,
    pub avg_time_to_vote: f64,
    pub return_visitor_rate: f64,
    pub viral_coefficient: f64,
    pub peak_hour: Option<i64>,
    pub device_breakdown: BTreeMap<String, i64>,
    pub browser_breakdown: BTreeMap<String, i64>,
    pub os_breakdown: BTreeMap<String, i64>,
    pub share_breakdown: BTreeMap<String, i64>,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    // -- polls --------------------------------------------------------------

    /// Create a poll; fails with [`StorageError::Conflict`] if the id exists
    async fn create_poll(&self, poll: &Poll) -> StorageResult<()>;

    /// Get a poll by id
    async fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>>;

    /// List polls, newest first
    async fn list_polls(&self, limit: i64, offset: i64) -> Result<Vec<Poll>>;

    // -- event logs ----------------------------------------------------------

    async fn insert_page_view(&self, event: &PageViewEvent) -> Result<()>;
    async fn insert_vote_event(&self, event: &VoteEvent) -> Result<()>;
    async fn insert_share_event(&self, event: &ShareEvent) -> Result<()>;
    async fn insert_click_event(&self, event: &ClickEvent) -> Result<()>;

    // -- summary lifecycle ----------------------------------------------------

    /// Create the summary row for a poll if it does not exist yet
    async fn ensure_summary(&self, poll_id: &str, now: i64) -> Result<()>;

    /// Bump one of the plain counters (views/votes/shares)
    async fn increment_counter(
        &self,
        poll_id: &str,
        counter: SummaryCounter,
        now: i64,
    ) -> Result<()>;

    /// Get the analytics summary for a poll
    async fn get_poll_analytics(&self, poll_id: &str) -> Result<Option<PollAnalyticsSummary>>;

    /// Get summaries for several polls, ordered by total views descending
    async fn get_bulk_analytics(&self, poll_ids: &[String]) -> Result<Vec<PollAnalyticsSummary>>;

    /// Aggregate one UTC day of events for a poll; `None` when the day is empty
    async fn get_daily_analytics(
        &self,
        poll_id: &str,
        day_start: i64,
    ) -> Result<Option<DailyAnalytics>>;

    // -- aggregates read by the metric updaters -------------------------------

    /// Count rows in one event log for a poll
    async fn count_events(&self, poll_id: &str, kind: EventKind) -> Result<i64>;

    /// Count distinct visitor hashes over the page-view log
    async fn count_distinct_viewers(&self, poll_id: &str) -> Result<i64>;

    /// Raw engagement aggregates over the event logs
    async fn engagement_aggregates(&self, poll_id: &str) -> Result<EngagementAggregates>;

    /// Group the relevant event log by a breakdown dimension
    async fn breakdown(
        &self,
        poll_id: &str,
        dimension: BreakdownDimension,
    ) -> Result<Vec<(String, i64)>>;

    // -- summary writes by the metric updaters --------------------------------

    async fn set_unique_viewers(&self, poll_id: &str, unique_viewers: i64, now: i64)
        -> Result<()>;

    async fn set_rates(
        &self,
        poll_id: &str,
        completion_rate: f64,
        interaction_rate: f64,
        now: i64,
    ) -> Result<()>;

    async fn set_share_to_vote_ratio(&self, poll_id: &str, ratio: f64, now: i64) -> Result<()>;

    async fn set_engagement(
        &self,
        poll_id: &str,
        update: &EngagementUpdate,
        now: i64,
    ) -> Result<()>;

    // -- export queries --------------------------------------------------------

    /// Top countries by page views, with vote counts joined in
    async fn country_breakdown(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<CountryStat>>;

    /// Per-day event counts over the filtered range, ordered by day
    async fn daily_series(&self, poll_id: &str, filter: &EventFilter)
        -> Result<Vec<DailyAnalytics>>;

    /// Average time-on-page and bounce rate per device type
    async fn device_performance(
        &self,
        poll_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<DevicePerformance>>;

    /// Raw event rows for exports, oldest first, capped by `limit`
    async fn raw_page_views(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<PageViewEvent>>;

    async fn raw_votes(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<VoteEvent>>;

    async fn raw_shares(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<ShareEvent>>;
}
