//! Derived-metric recomputation
//!
//! Every updater recomputes its metric from the full event log and writes
//! the result back to the summary row. Replaying an updater converges to the
//! same value no matter how many times or in what order it runs, which is
//! what lets the recorders fire them after every event without coordination.

use std::sync::Arc;

use anyhow::Result;

use crate::analytics::unix_now;
use crate::storage::{BreakdownDimension, EngagementUpdate, EventKind, Storage};

#[derive(Clone)]
pub struct MetricUpdater {
    storage: Arc<dyn Storage>,
}

/// numerator / denominator, 0 when the denominator is not positive.
fn ratio(numerator: i64, denominator: i64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

impl MetricUpdater {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Recounts distinct visitor hashes over the page-view log.
    pub async fn update_unique_viewers(&self, poll_id: &str) -> Result<()> {
        let unique = self.storage.count_distinct_viewers(poll_id).await?;
        self.storage
            .set_unique_viewers(poll_id, unique, unix_now())
            .await
    }

    /// Recomputes `completion_rate` and `interaction_rate`. Both currently
    /// carry the votes-per-view ratio; they remain separate fields in the
    /// schema and in exports.
    pub async fn update_completion_rate(&self, poll_id: &str) -> Result<()> {
        let views = self
            .storage
            .count_events(poll_id, EventKind::PageView)
            .await?;
        let votes = self.storage.count_events(poll_id, EventKind::Vote).await?;

        let completion_rate = ratio(votes, views);
        let interaction_rate = ratio(votes, views);

        self.storage
            .set_rates(poll_id, completion_rate, interaction_rate, unix_now())
            .await
    }

    /// Recomputes shares per vote.
    pub async fn update_share_to_vote_ratio(&self, poll_id: &str) -> Result<()> {
        let shares = self.storage.count_events(poll_id, EventKind::Share).await?;
        let votes = self.storage.count_events(poll_id, EventKind::Vote).await?;

        self.storage
            .set_share_to_vote_ratio(poll_id, ratio(shares, votes), unix_now())
            .await
    }

    /// Recomputes the engagement block: bounce rate, dwell averages, return
    /// visitor rate, viral coefficient, peak hour, and the breakdown maps.
    pub async fn update_engagement_metrics(&self, poll_id: &str) -> Result<()> {
        let agg = self.storage.engagement_aggregates(poll_id).await?;

        let device = self
            .storage
            .breakdown(poll_id, BreakdownDimension::Device)
            .await?;
        let browser = self
            .storage
            .breakdown(poll_id, BreakdownDimension::Browser)
            .await?;
        let os = self
            .storage
            .breakdown(poll_id, BreakdownDimension::Os)
            .await?;
        let share = self
            .storage
            .breakdown(poll_id, BreakdownDimension::SharePlatform)
            .await?;

        let update = EngagementUpdate {
            bounce_rate: ratio(agg.bounced_views, agg.views),
            avg_time_on_page: agg.avg_time_on_page,
            avg_time_to_vote: agg.avg_time_to_vote,
            return_visitor_rate: ratio(agg.returning_viewers, agg.unique_viewers),
            viral_coefficient: ratio(agg.clicks, agg.shares),
            peak_hour: agg.peak_hour,
            device_breakdown: device.into_iter().collect(),
            browser_breakdown: browser.into_iter().collect(),
            os_breakdown: os.into_iter().collect(),
            share_breakdown: share.into_iter().collect(),
        };

        self.storage
            .set_engagement(poll_id, &update, unix_now())
            .await
    }

    /// Runs every updater for a poll, in the same order the recorders do.
    pub async fn update_all(&self, poll_id: &str) -> Result<()> {
        self.update_unique_viewers(poll_id).await?;
        self.update_completion_rate(poll_id).await?;
        self.update_share_to_vote_ratio(poll_id).await?;
        self.update_engagement_metrics(poll_id).await?;
        Ok(())
    }
}
