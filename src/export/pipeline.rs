use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::info;

use crate::analytics::models::PollAnalyticsSummary;
use crate::storage::{EventFilter, Storage};

use super::cache::{CachedExport, ExportCache};
use super::csv::generate_csv;
use super::data::{ExportableAnalyticsData, RawEventRows};
use super::error::{ExportError, ExportResult};
use super::metadata::{self, ExportMetadata};
use super::rate_limit::RateLimiter;
use super::request::{ExportFilters, ExportFormat, ExportGranularity, ExportPlan, ExportRequest};
use super::xlsx::generate_xlsx;

/// Countries returned in the geographic breakdown.
const TOP_COUNTRIES: i64 = 20;

/// A finished export: serialized body plus the metadata generated with it.
/// `from_cache` reports whether this call reused a cached serialization.
#[derive(Debug)]
pub struct CompletedExport {
    pub body: Vec<u8>,
    pub metadata: ExportMetadata,
    pub from_cache: bool,
}

/// Runs an export request through validate, rate limit, cache lookup, data
/// fetch, serialize and cache store. The cache and limiters sit behind
/// traits so their in-process implementations can be swapped out.
pub struct ExportPipeline {
    storage: Arc<dyn Storage>,
    cache: Arc<dyn ExportCache>,
    general_limiter: Arc<dyn RateLimiter>,
    raw_limiter: Arc<dyn RateLimiter>,
    max_raw_rows: i64,
}

impl ExportPipeline {
    pub fn new(
        storage: Arc<dyn Storage>,
        cache: Arc<dyn ExportCache>,
        general_limiter: Arc<dyn RateLimiter>,
        raw_limiter: Arc<dyn RateLimiter>,
        max_raw_rows: i64,
    ) -> Self {
        ExportPipeline {
            storage,
            cache,
            general_limiter,
            raw_limiter,
            max_raw_rows,
        }
    }

    pub async fn export(
        &self,
        request: ExportRequest,
        user_id: Option<String>,
        client_ip: &str,
    ) -> ExportResult<CompletedExport> {
        let plan = request.validate(user_id).map_err(ExportError::Validation)?;

        // one token from the limiter matching the granularity, keyed by user
        // id with the client address as the anonymous fallback
        let limiter = if plan.granularity == ExportGranularity::Raw {
            &self.raw_limiter
        } else {
            &self.general_limiter
        };
        let limiter_key = plan.user_id.as_deref().unwrap_or(client_ip);
        let decision = limiter.check(limiter_key).await;
        if !decision.allowed {
            return Err(ExportError::RateLimited {
                ms_before_next: decision.ms_before_next,
            });
        }

        // raw exports are never cached
        let cache_key = if plan.granularity == ExportGranularity::Raw {
            None
        } else {
            Some(metadata::cache_key(
                &plan.poll_id,
                plan.format,
                plan.granularity,
                &plan.filters,
            )?)
        };
        if let Some(key) = &cache_key {
            if let Some(hit) = self.cache.get(key).await {
                return Ok(CompletedExport {
                    body: hit.body.clone(),
                    metadata: hit.metadata.clone(),
                    from_cache: true,
                });
            }
        }

        let data = self.fetch_analytics_data(&plan).await?;
        let body = match plan.format {
            ExportFormat::Json => serde_json::to_vec_pretty(&data).map_err(anyhow::Error::from)?,
            ExportFormat::Csv => generate_csv(&data).into_bytes(),
            ExportFormat::Xlsx => generate_xlsx(&data)?,
        };
        let metadata = metadata::create_export_metadata(
            &data,
            &plan.poll_id,
            plan.format,
            plan.granularity,
            data.record_count(),
        )?;

        if let Some(key) = cache_key {
            self.cache
                .store(
                    key,
                    Arc::new(CachedExport {
                        body: body.clone(),
                        metadata: metadata.clone(),
                    }),
                )
                .await;
        }

        info!(
            "export {} generated for poll {} ({} {}, {} bytes)",
            metadata.export_id,
            plan.poll_id,
            plan.granularity.as_str(),
            plan.format.as_str(),
            body.len()
        );

        Ok(CompletedExport {
            body,
            metadata,
            from_cache: false,
        })
    }

    /// Assemble the structured export object for a plan: poll and summary
    /// always, breakdown sections for detailed and raw, capped raw event
    /// rows for raw only.
    pub async fn fetch_analytics_data(
        &self,
        plan: &ExportPlan,
    ) -> ExportResult<ExportableAnalyticsData> {
        let poll = self
            .storage
            .get_poll(&plan.poll_id)
            .await?
            .ok_or_else(|| ExportError::NotFound(plan.poll_id.clone()))?;

        // a poll with no recorded events exports a zeroed summary
        let summary = self
            .storage
            .get_poll_analytics(&plan.poll_id)
            .await?
            .unwrap_or_else(|| PollAnalyticsSummary::empty(&plan.poll_id));

        let filter = event_filter(&plan.filters);

        let (countries, daily, devices) = if plan.granularity.includes_breakdowns() {
            let countries = self
                .storage
                .country_breakdown(&plan.poll_id, &filter, TOP_COUNTRIES)
                .await?;
            let daily = if plan.filters.has_date_range() {
                Some(self.storage.daily_series(&plan.poll_id, &filter).await?)
            } else {
                None
            };
            let devices = self
                .storage
                .device_performance(&plan.poll_id, &filter)
                .await?;
            (Some(countries), daily, Some(devices))
        } else {
            (None, None, None)
        };

        let raw_events = if plan.granularity == ExportGranularity::Raw {
            let cap = plan.filters.max_rows.unwrap_or(self.max_raw_rows);
            Some(RawEventRows {
                page_views: self
                    .storage
                    .raw_page_views(&plan.poll_id, &filter, cap)
                    .await?,
                votes: self.storage.raw_votes(&plan.poll_id, &filter, cap).await?,
                shares: self.storage.raw_shares(&plan.poll_id, &filter, cap).await?,
            })
        } else {
            None
        };

        Ok(ExportableAnalyticsData {
            poll,
            summary,
            countries,
            daily,
            devices,
            raw_events,
        })
    }
}

/// Resolve wire-format filters to unix-second bounds. Date bounds are
/// inclusive; the end date covers through 23:59:59 UTC.
fn event_filter(filters: &ExportFilters) -> EventFilter {
    let day_start = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc().timestamp();
    EventFilter {
        start_ts: filters.start().map(day_start),
        end_ts: filters.end().map(|d| day_start(d) + 86_399),
        country: filters.country.clone(),
        device_type: filters.device_type.clone(),
    }
}
