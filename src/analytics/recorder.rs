//! Fail-open event recording
//!
//! Each recorder derives the visitor context from the request headers,
//! persists one event row, and fires the metric updaters that depend on that
//! event kind. Telemetry must never break the caller: every failure is
//! logged at `warn` and swallowed, so the four `track_*` operations are
//! infallible from the handler's point of view. A dropped event is lost;
//! there are no retries.

use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderMap;
use tracing::warn;

use crate::analytics::client_ip::{extract_client_ip, extract_user_agent};
use crate::analytics::context::{parse_device, parse_geo, referrer_domain, DeviceContext, GeoContext};
use crate::analytics::fingerprint::visitor_hash;
use crate::analytics::metrics::MetricUpdater;
use crate::analytics::models::{
    ClickEvent, ClickEventData, PageViewData, PageViewEvent, ShareEvent, ShareEventData,
    VoteEvent, VoteEventData,
};
use crate::analytics::unix_now;
use crate::storage::{Storage, SummaryCounter};

/// Per-request visitor context shared by all four event kinds.
struct RequestContext {
    visitor_hash: String,
    device: DeviceContext,
    geo: GeoContext,
}

impl RequestContext {
    fn capture(headers: &HeaderMap) -> Self {
        let ip = extract_client_ip(headers);
        let user_agent = extract_user_agent(headers);

        Self {
            visitor_hash: visitor_hash(&ip, &user_agent),
            device: parse_device(&user_agent),
            geo: parse_geo(headers),
        }
    }
}

/// Metric updaters a recorder fans out to after persisting its event.
#[derive(Debug, Clone, Copy)]
enum Updater {
    UniqueViewers,
    Rates,
    ShareToVote,
    Engagement,
}

#[derive(Clone)]
pub struct EventRecorder {
    storage: Arc<dyn Storage>,
    metrics: MetricUpdater,
}

impl EventRecorder {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let metrics = MetricUpdater::new(Arc::clone(&storage));
        Self { storage, metrics }
    }

    pub async fn track_page_view(&self, headers: &HeaderMap, data: PageViewData) {
        let ctx = RequestContext::capture(headers);

        let event = PageViewEvent {
            poll_id: data.poll_id,
            visitor_hash: ctx.visitor_hash,
            session_id: data.session_id,
            device_type: ctx.device.device_type,
            browser_family: ctx.device.browser_family,
            os_family: ctx.device.os_family,
            country_code: ctx.geo.country_code,
            region_code: ctx.geo.region_code,
            referrer_domain: data.referrer.as_deref().and_then(referrer_domain),
            utm_source: data.utm_source,
            utm_medium: data.utm_medium,
            utm_campaign: data.utm_campaign,
            time_on_page: data.time_on_page,
            scroll_depth: data.scroll_depth,
            created_at: unix_now(),
        };

        if let Err(e) = self.store_page_view(&event).await {
            warn!("page view dropped for poll {}: {}", event.poll_id, e);
            return;
        }

        self.run_updaters(
            &event.poll_id,
            &[Updater::UniqueViewers, Updater::Rates, Updater::Engagement],
        )
        .await;
    }

    pub async fn track_vote(&self, headers: &HeaderMap, data: VoteEventData) {
        let ctx = RequestContext::capture(headers);

        let event = VoteEvent {
            poll_id: data.poll_id,
            vote_id: data.vote_id,
            option_index: data.option_index,
            visitor_hash: ctx.visitor_hash,
            session_id: data.session_id,
            device_type: ctx.device.device_type,
            browser_family: ctx.device.browser_family,
            country_code: ctx.geo.country_code,
            region_code: ctx.geo.region_code,
            time_to_vote: data.time_to_vote,
            is_first_vote_in_session: data.is_first_vote_in_session,
            previous_options_viewed: data.previous_options_viewed,
            created_at: unix_now(),
        };

        if let Err(e) = self.store_vote(&event).await {
            warn!("vote event dropped for poll {}: {}", event.poll_id, e);
            return;
        }

        self.run_updaters(
            &event.poll_id,
            &[Updater::Rates, Updater::ShareToVote, Updater::Engagement],
        )
        .await;
    }

    pub async fn track_share(&self, headers: &HeaderMap, data: ShareEventData) {
        let ctx = RequestContext::capture(headers);

        let event = ShareEvent {
            poll_id: data.poll_id,
            platform: data.platform,
            share_method: data.share_method,
            visitor_hash: ctx.visitor_hash,
            session_id: data.session_id,
            device_type: ctx.device.device_type,
            browser_family: ctx.device.browser_family,
            country_code: ctx.geo.country_code,
            region_code: ctx.geo.region_code,
            shared_url: data.shared_url,
            created_at: unix_now(),
        };

        if let Err(e) = self.store_share(&event).await {
            warn!("share event dropped for poll {}: {}", event.poll_id, e);
            return;
        }

        self.run_updaters(
            &event.poll_id,
            &[Updater::ShareToVote, Updater::Engagement],
        )
        .await;
    }

    pub async fn track_click(&self, headers: &HeaderMap, data: ClickEventData) {
        let ctx = RequestContext::capture(headers);

        let event = ClickEvent {
            poll_id: data.poll_id,
            referrer_domain: data.referrer.as_deref().and_then(referrer_domain),
            utm_source: data.utm_source,
            utm_medium: data.utm_medium,
            utm_campaign: data.utm_campaign,
            visitor_hash: ctx.visitor_hash,
            session_id: data.session_id,
            device_type: ctx.device.device_type,
            browser_family: ctx.device.browser_family,
            country_code: ctx.geo.country_code,
            region_code: ctx.geo.region_code,
            converted_to_vote: data.converted_to_vote,
            time_to_conversion: data.time_to_conversion,
            created_at: unix_now(),
        };

        if let Err(e) = self.store_click(&event).await {
            warn!("click event dropped for poll {}: {}", event.poll_id, e);
            return;
        }

        self.run_updaters(&event.poll_id, &[Updater::Engagement]).await;
    }

    // Persistence is summary-first so the counter bump always has a row to
    // land on, even for a poll seeing its first event.

    async fn store_page_view(&self, event: &PageViewEvent) -> Result<()> {
        self.storage
            .ensure_summary(&event.poll_id, event.created_at)
            .await?;
        self.storage.insert_page_view(event).await?;
        self.storage
            .increment_counter(&event.poll_id, SummaryCounter::Views, event.created_at)
            .await?;
        Ok(())
    }

    async fn store_vote(&self, event: &VoteEvent) -> Result<()> {
        self.storage
            .ensure_summary(&event.poll_id, event.created_at)
            .await?;
        self.storage.insert_vote_event(event).await?;
        self.storage
            .increment_counter(&event.poll_id, SummaryCounter::Votes, event.created_at)
            .await?;
        Ok(())
    }

    async fn store_share(&self, event: &ShareEvent) -> Result<()> {
        self.storage
            .ensure_summary(&event.poll_id, event.created_at)
            .await?;
        self.storage.insert_share_event(event).await?;
        self.storage
            .increment_counter(&event.poll_id, SummaryCounter::Shares, event.created_at)
            .await?;
        Ok(())
    }

    async fn store_click(&self, event: &ClickEvent) -> Result<()> {
        self.storage
            .ensure_summary(&event.poll_id, event.created_at)
            .await?;
        self.storage.insert_click_event(event).await?;
        Ok(())
    }

    /// Runs each updater in turn. One failing does not stop the rest; the
    /// summary simply stays stale for that metric until the next event.
    async fn run_updaters(&self, poll_id: &str, updaters: &[Updater]) {
        for updater in updaters {
            let result = match updater {
                Updater::UniqueViewers => self.metrics.update_unique_viewers(poll_id).await,
                Updater::Rates => self.metrics.update_completion_rate(poll_id).await,
                Updater::ShareToVote => self.metrics.update_share_to_vote_ratio(poll_id).await,
                Updater::Engagement => self.metrics.update_engagement_metrics(poll_id).await,
            };

            if let Err(e) = result {
                warn!("{:?} recompute failed for poll {}: {}", updater, poll_id, e);
            }
        }
    }
}
