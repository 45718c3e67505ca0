use serde::Serialize;

use crate::analytics::models::{
    CountryStat, DailyAnalytics, DevicePerformance, PageViewEvent, PollAnalyticsSummary,
    ShareEvent, VoteEvent,
};
use crate::models::Poll;

/// Raw event rows attached to `raw`-granularity exports, oldest first and
/// capped by the request's row limit.
#[derive(Debug, Clone, Serialize)]
pub struct RawEventRows {
    pub page_views: Vec<PageViewEvent>,
    pub votes: Vec<VoteEvent>,
    pub shares: Vec<ShareEvent>,
}

/// The structured object every serializer consumes. Summary exports carry
/// only the poll and its summary row; the optional sections are filled in
/// by granularity.
#[derive(Debug, Clone, Serialize)]
pub struct ExportableAnalyticsData {
    pub poll: Poll,
    pub summary: PollAnalyticsSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<CountryStat>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<Vec<DailyAnalytics>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<DevicePerformance>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_events: Option<RawEventRows>,
}

impl ExportableAnalyticsData {
    /// Rows the export carries, reported in the metadata. The summary block
    /// counts as one record.
    pub fn record_count(&self) -> u64 {
        let mut count = 1u64;
        count += self.countries.as_ref().map_or(0, Vec::len) as u64;
        count += self.daily.as_ref().map_or(0, Vec::len) as u64;
        count += self.devices.as_ref().map_or(0, Vec::len) as u64;
        if let Some(raw) = &self.raw_events {
            count += (raw.page_views.len() + raw.votes.len() + raw.shares.len()) as u64;
        }
        count
    }
}
