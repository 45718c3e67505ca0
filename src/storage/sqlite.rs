use crate::analytics::models::{
    merge_daily_buckets, ClickEvent, CountryStat, DailyAnalytics, DevicePerfRow,
    DevicePerformance, PageViewEvent, PollAnalyticsSummary, ShareEvent, SummaryRow, VoteEvent,
    VoteEventRow,
};
use crate::config::DatabaseConfig;
use crate::models::{Poll, PollRow};
use crate::storage::{
    BreakdownDimension, EngagementAggregates, EngagementUpdate, EventFilter, EventKind, Storage,
    StorageError, StorageResult, SummaryCounter,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        Self::connect(
            database_url,
            max_connections,
            Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
        .await
    }

    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::connect(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.acquire_timeout_secs),
        )
        .await
    }

    async fn connect(
        database_url: &str,
        max_connections: u32,
        idle_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(idle_timeout)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        // Canonical poll table; options are a JSON array of labels
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                options TEXT NOT NULL,
                poll_type TEXT NOT NULL DEFAULT 'single',
                hide_results INTEGER NOT NULL DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        // One summary row per poll, created implicitly on the first event
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_analytics (
                poll_id TEXT PRIMARY KEY,
                total_views INTEGER NOT NULL DEFAULT 0,
                unique_viewers INTEGER NOT NULL DEFAULT 0,
                total_votes INTEGER NOT NULL DEFAULT 0,
                total_shares INTEGER NOT NULL DEFAULT 0,
                completion_rate REAL NOT NULL DEFAULT 0,
                bounce_rate REAL NOT NULL DEFAULT 0,
                avg_time_on_page REAL NOT NULL DEFAULT 0,
                avg_time_to_vote REAL NOT NULL DEFAULT 0,
                viral_coefficient REAL NOT NULL DEFAULT 0,
                share_to_vote_ratio REAL NOT NULL DEFAULT 0,
                return_visitor_rate REAL NOT NULL DEFAULT 0,
                interaction_rate REAL NOT NULL DEFAULT 0,
                device_breakdown TEXT NOT NULL DEFAULT '{}',
                browser_breakdown TEXT NOT NULL DEFAULT '{}',
                os_breakdown TEXT NOT NULL DEFAULT '{}',
                share_breakdown TEXT NOT NULL DEFAULT '{}',
                peak_hour INTEGER,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        // Append-only event logs, one table per event kind
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS page_view_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id TEXT NOT NULL,
                visitor_hash TEXT NOT NULL,
                session_id TEXT NOT NULL,
                device_type TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                os_family TEXT NOT NULL,
                country_code TEXT,
                region_code TEXT,
                referrer_domain TEXT,
                utm_source TEXT,
                utm_medium TEXT,
                utm_campaign TEXT,
                time_on_page REAL,
                scroll_depth REAL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS vote_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id TEXT NOT NULL,
                vote_id TEXT NOT NULL,
                option_index INTEGER NOT NULL,
                visitor_hash TEXT NOT NULL,
                session_id TEXT NOT NULL,
                device_type TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                country_code TEXT,
                region_code TEXT,
                time_to_vote REAL,
                is_first_vote_in_session INTEGER NOT NULL DEFAULT 0,
                previous_options_viewed TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS share_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                share_method TEXT NOT NULL,
                visitor_hash TEXT NOT NULL,
                session_id TEXT NOT NULL,
                device_type TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                country_code TEXT,
                region_code TEXT,
                shared_url TEXT,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id TEXT NOT NULL,
                referrer_domain TEXT,
                utm_source TEXT,
                utm_medium TEXT,
                utm_campaign TEXT,
                visitor_hash TEXT NOT NULL,
                session_id TEXT NOT NULL,
                device_type TEXT NOT NULL,
                browser_family TEXT NOT NULL,
                country_code TEXT,
                region_code TEXT,
                converted_to_vote INTEGER NOT NULL DEFAULT 0,
                time_to_conversion REAL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_page_views_poll_ts ON page_view_events(poll_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_poll_ts ON vote_events(poll_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_shares_poll_ts ON share_events(poll_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_clicks_poll_ts ON click_events(poll_id, created_at)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    // -- polls ----------------------------------------------------------------

    async fn create_poll(&self, poll: &Poll) -> StorageResult<()> {
        let options =
            serde_json::to_string(&poll.options).map_err(|e| StorageError::Other(e.into()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO polls (id, question, options, poll_type, hide_results, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.question)
        .bind(options)
        .bind(poll.poll_type.as_str())
        .bind(poll.hide_results)
        .bind(poll.is_active)
        .bind(poll.created_at)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::Conflict);
        }

        Ok(())
    }

    async fn get_poll(&self, poll_id: &str) -> Result<Option<Poll>> {
        let row = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT id, question, options, poll_type, hide_results, is_active, created_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(PollRow::into_poll))
    }

    async fn list_polls(&self, limit: i64, offset: i64) -> Result<Vec<Poll>> {
        let rows = sqlx::query_as::<_, PollRow>(
            r#"
            SELECT id, question, options, poll_type, hide_results, is_active, created_at
            FROM polls
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(PollRow::into_poll).collect())
    }

    // -- event logs -------------------------------------------------------------

    async fn insert_page_view(&self, event: &PageViewEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO page_view_events (
                poll_id, visitor_hash, session_id, device_type, browser_family, os_family,
                country_code, region_code, referrer_domain, utm_source, utm_medium, utm_campaign,
                time_on_page, scroll_depth, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.poll_id)
        .bind(&event.visitor_hash)
        .bind(&event.session_id)
        .bind(&event.device_type)
        .bind(&event.browser_family)
        .bind(&event.os_family)
        .bind(event.country_code.as_deref())
        .bind(event.region_code.as_deref())
        .bind(event.referrer_domain.as_deref())
        .bind(event.utm_source.as_deref())
        .bind(event.utm_medium.as_deref())
        .bind(event.utm_campaign.as_deref())
        .bind(event.time_on_page)
        .bind(event.scroll_depth)
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_vote_event(&self, event: &VoteEvent) -> Result<()> {
        let previous = serde_json::to_string(&event.previous_options_viewed)?;

        sqlx::query(
            r#"
            INSERT INTO vote_events (
                poll_id, vote_id, option_index, visitor_hash, session_id, device_type,
                browser_family, country_code, region_code, time_to_vote,
                is_first_vote_in_session, previous_options_viewed, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.poll_id)
        .bind(&event.vote_id)
        .bind(event.option_index)
        .bind(&event.visitor_hash)
        .bind(&event.session_id)
        .bind(&event.device_type)
        .bind(&event.browser_family)
        .bind(event.country_code.as_deref())
        .bind(event.region_code.as_deref())
        .bind(event.time_to_vote)
        .bind(event.is_first_vote_in_session)
        .bind(previous)
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_share_event(&self, event: &ShareEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO share_events (
                poll_id, platform, share_method, visitor_hash, session_id, device_type,
                browser_family, country_code, region_code, shared_url, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.poll_id)
        .bind(&event.platform)
        .bind(&event.share_method)
        .bind(&event.visitor_hash)
        .bind(&event.session_id)
        .bind(&event.device_type)
        .bind(&event.browser_family)
        .bind(event.country_code.as_deref())
        .bind(event.region_code.as_deref())
        .bind(event.shared_url.as_deref())
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn insert_click_event(&self, event: &ClickEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO click_events (
                poll_id, referrer_domain, utm_source, utm_medium, utm_campaign, visitor_hash,
                session_id, device_type, browser_family, country_code, region_code,
                converted_to_vote, time_to_conversion, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.poll_id)
        .bind(event.referrer_domain.as_deref())
        .bind(event.utm_source.as_deref())
        .bind(event.utm_medium.as_deref())
        .bind(event.utm_campaign.as_deref())
        .bind(&event.visitor_hash)
        .bind(&event.session_id)
        .bind(&event.device_type)
        .bind(&event.browser_family)
        .bind(event.country_code.as_deref())
        .bind(event.region_code.as_deref())
        .bind(event.converted_to_vote)
        .bind(event.time_to_conversion)
        .bind(event.created_at)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    // -- summary lifecycle --------------------------------------------------------

    async fn ensure_summary(&self, poll_id: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_analytics (poll_id, updated_at)
            VALUES (?, ?)
            ON CONFLICT(poll_id) DO NOTHING
            "#,
        )
        .bind(poll_id)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn increment_counter(
        &self,
        poll_id: &str,
        counter: SummaryCounter,
        now: i64,
    ) -> Result<()> {
        let sql = match counter {
            SummaryCounter::Views => {
                "UPDATE poll_analytics SET total_views = total_views + 1, updated_at = ? WHERE poll_id = ?"
            }
            SummaryCounter::Votes => {
                "UPDATE poll_analytics SET total_votes = total_votes + 1, updated_at = ? WHERE poll_id = ?"
            }
            SummaryCounter::Shares => {
                "UPDATE poll_analytics SET total_shares = total_shares + 1, updated_at = ? WHERE poll_id = ?"
            }
        };

        sqlx::query(sql)
            .bind(now)
            .bind(poll_id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn get_poll_analytics(&self, poll_id: &str) -> Result<Option<PollAnalyticsSummary>> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT poll_id, total_views, unique_viewers, total_votes, total_shares,
                   completion_rate, bounce_rate, avg_time_on_page, avg_time_to_vote,
                   viral_coefficient, share_to_vote_ratio, return_visitor_rate,
                   interaction_rate, device_breakdown, browser_breakdown, os_breakdown,
                   share_breakdown, peak_hour, updated_at
            FROM poll_analytics
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(SummaryRow::into_summary))
    }

    async fn get_bulk_analytics(&self, poll_ids: &[String]) -> Result<Vec<PollAnalyticsSummary>> {
        if poll_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; poll_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT poll_id, total_views, unique_viewers, total_votes, total_shares,
                   completion_rate, bounce_rate, avg_time_on_page, avg_time_to_vote,
                   viral_coefficient, share_to_vote_ratio, return_visitor_rate,
                   interaction_rate, device_breakdown, browser_breakdown, os_breakdown,
                   share_breakdown, peak_hour, updated_at
            FROM poll_analytics
            WHERE poll_id IN ({placeholders})
            ORDER BY total_views DESC
            "#
        );

        let mut query = sqlx::query_as::<_, SummaryRow>(&sql);
        for poll_id in poll_ids {
            query = query.bind(poll_id);
        }

        let rows = query.fetch_all(self.pool.as_ref()).await?;
        Ok(rows.into_iter().map(SummaryRow::into_summary).collect())
    }

    async fn get_daily_analytics(
        &self,
        poll_id: &str,
        day_start: i64,
    ) -> Result<Option<DailyAnalytics>> {
        let day_end = day_start + 86_400;

        let (views, unique_viewers) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT visitor_hash)
            FROM page_view_events
            WHERE poll_id = ? AND created_at >= ? AND created_at < ?
            "#,
        )
        .bind(poll_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(self.pool.as_ref())
        .await?;

        let votes = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM vote_events WHERE poll_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(poll_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(self.pool.as_ref())
        .await?;

        let shares = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM share_events WHERE poll_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(poll_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(self.pool.as_ref())
        .await?;

        let clicks = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM click_events WHERE poll_id = ? AND created_at >= ? AND created_at < ?",
        )
        .bind(poll_id)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(self.pool.as_ref())
        .await?;

        if views == 0 && votes == 0 && shares == 0 && clicks == 0 {
            return Ok(None);
        }

        let date = chrono::DateTime::from_timestamp(day_start, 0)
            .ok_or_else(|| anyhow!("day start {} out of range", day_start))?
            .date_naive();

        Ok(Some(DailyAnalytics {
            date,
            views,
            unique_viewers,
            votes,
            shares,
            clicks,
        }))
    }

    // -- aggregates read by the metric updaters -----------------------------------

    async fn count_events(&self, poll_id: &str, kind: EventKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE poll_id = ?", kind.table());

        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(poll_id)
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(count)
    }

    async fn count_distinct_viewers(&self, poll_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(DISTINCT visitor_hash) FROM page_view_events WHERE poll_id = ?",
        )
        .bind(poll_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(count)
    }

    async fn engagement_aggregates(&self, poll_id: &str) -> Result<EngagementAggregates> {
        let (views, bounced_views, avg_time_on_page) = sqlx::query_as::<_, (i64, Option<i64>, f64)>(
            r#"
            SELECT COUNT(*),
                   SUM(CASE WHEN time_on_page IS NULL OR time_on_page < 10 THEN 1 ELSE 0 END),
                   COALESCE(AVG(time_on_page), 0.0)
            FROM page_view_events
            WHERE poll_id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let avg_time_to_vote = sqlx::query_scalar::<_, f64>(
            "SELECT COALESCE(AVG(time_to_vote), 0.0) FROM vote_events WHERE poll_id = ?",
        )
        .bind(poll_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let unique_viewers = self.count_distinct_viewers(poll_id).await?;

        let returning_viewers = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM (
                SELECT visitor_hash
                FROM page_view_events
                WHERE poll_id = ?
                GROUP BY visitor_hash
                HAVING COUNT(*) >= 2
            ) AS repeat_visitors
            "#,
        )
        .bind(poll_id)
        .fetch_one(self.pool.as_ref())
        .await?;

        let shares = self.count_events(poll_id, EventKind::Share).await?;
        let clicks = self.count_events(poll_id, EventKind::Click).await?;

        let peak = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (created_at % 86400) / 3600 AS hour, COUNT(*) AS views
            FROM page_view_events
            WHERE poll_id = ?
            GROUP BY hour
            ORDER BY views DESC, hour ASC
            LIMIT 1
            "#,
        )
        .bind(poll_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(EngagementAggregates {
            views,
            bounced_views: bounced_views.unwrap_or(0),
            avg_time_on_page,
            avg_time_to_vote,
            unique_viewers,
            returning_viewers,
            shares,
            clicks,
            peak_hour: peak.map(|(hour, _)| hour),
        })
    }

    async fn breakdown(
        &self,
        poll_id: &str,
        dimension: BreakdownDimension,
    ) -> Result<Vec<(String, i64)>> {
        let (table, column) = match dimension {
            BreakdownDimension::Device => ("page_view_events", "device_type"),
            BreakdownDimension::Browser => ("page_view_events", "browser_family"),
            BreakdownDimension::Os => ("page_view_events", "os_family"),
            BreakdownDimension::SharePlatform => ("share_events", "platform"),
        };

        let sql =
            format!("SELECT {column}, COUNT(*) FROM {table} WHERE poll_id = ? GROUP BY {column}");

        let rows = sqlx::query_as::<_, (String, i64)>(&sql)
            .bind(poll_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        Ok(rows)
    }

    // -- summary writes by the metric updaters ------------------------------------

    async fn set_unique_viewers(
        &self,
        poll_id: &str,
        unique_viewers: i64,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE poll_analytics SET unique_viewers = ?, updated_at = ? WHERE poll_id = ?",
        )
        .bind(unique_viewers)
        .bind(now)
        .bind(poll_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn set_rates(
        &self,
        poll_id: &str,
        completion_rate: f64,
        interaction_rate: f64,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE poll_analytics
            SET completion_rate = ?, interaction_rate = ?, updated_at = ?
            WHERE poll_id = ?
            "#,
        )
        .bind(completion_rate)
        .bind(interaction_rate)
        .bind(now)
        .bind(poll_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn set_share_to_vote_ratio(&self, poll_id: &str, ratio: f64, now: i64) -> Result<()> {
        sqlx::query(
            "UPDATE poll_analytics SET share_to_vote_ratio = ?, updated_at = ? WHERE poll_id = ?",
        )
        .bind(ratio)
        .bind(now)
        .bind(poll_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn set_engagement(
        &self,
        poll_id: &str,
        update: &EngagementUpdate,
        now: i64,
    ) -> Result<()> {
        let device = serde_json::to_string(&update.device_breakdown)?;
        let browser = serde_json::to_string(&update.browser_breakdown)?;
        let os = serde_json::to_string(&update.os_breakdown)?;
        let share = serde_json::to_string(&update.share_breakdown)?;

        sqlx::query(
            r#"
            UPDATE poll_analytics
            SET bounce_rate = ?,
                avg_time_on_page = ?,
                avg_time_to_vote = ?,
                return_visitor_rate = ?,
                viral_coefficient = ?,
                peak_hour = ?,
                device_breakdown = ?,
                browser_breakdown = ?,
                os_breakdown = ?,
                share_breakdown = ?,
                updated_at = ?
            WHERE poll_id = ?
            "#,
        )
        .bind(update.bounce_rate)
        .bind(update.avg_time_on_page)
        .bind(update.avg_time_to_vote)
        .bind(update.return_visitor_rate)
        .bind(update.viral_coefficient)
        .bind(update.peak_hour)
        .bind(device)
        .bind(browser)
        .bind(os)
        .bind(share)
        .bind(now)
        .bind(poll_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    // -- export queries ------------------------------------------------------------

    async fn country_breakdown(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<CountryStat>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let views = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT country_code, COUNT(*) AS views
            FROM page_view_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND country_code IS NOT NULL
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY country_code
            ORDER BY views DESC
            LIMIT ?
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        let votes = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT country_code, COUNT(*) AS votes
            FROM vote_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND country_code IS NOT NULL
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY country_code
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(CountryStat::merge(views, votes))
    }

    async fn daily_series(
        &self,
        poll_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<DailyAnalytics>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let view_buckets = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT (created_at / 86400) * 86400 AS day_start,
                   COUNT(*) AS views,
                   COUNT(DISTINCT visitor_hash) AS unique_viewers
            FROM page_view_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY day_start
            ORDER BY day_start ASC
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        let vote_buckets = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (created_at / 86400) * 86400 AS day_start, COUNT(*) AS votes
            FROM vote_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY day_start
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        let share_buckets = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (created_at / 86400) * 86400 AS day_start, COUNT(*) AS shares
            FROM share_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY day_start
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        let click_buckets = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (created_at / 86400) * 86400 AS day_start, COUNT(*) AS clicks
            FROM click_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY day_start
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(merge_daily_buckets(
            view_buckets,
            vote_buckets,
            share_buckets,
            click_buckets,
        ))
    }

    async fn device_performance(
        &self,
        poll_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<DevicePerformance>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let rows = sqlx::query_as::<_, DevicePerfRow>(
            r#"
            SELECT device_type,
                   COUNT(*) AS views,
                   COALESCE(AVG(time_on_page), 0.0) AS avg_time_on_page,
                   SUM(CASE WHEN time_on_page IS NULL OR time_on_page < 10 THEN 1 ELSE 0 END) AS bounced
            FROM page_view_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            GROUP BY device_type
            ORDER BY views DESC
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(DevicePerfRow::into_performance)
            .collect())
    }

    async fn raw_page_views(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<PageViewEvent>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let rows = sqlx::query_as::<_, PageViewEvent>(
            r#"
            SELECT poll_id, visitor_hash, session_id, device_type, browser_family, os_family,
                   country_code, region_code, referrer_domain, utm_source, utm_medium,
                   utm_campaign, time_on_page, scroll_depth, created_at
            FROM page_view_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }

    async fn raw_votes(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<VoteEvent>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let rows = sqlx::query_as::<_, VoteEventRow>(
            r#"
            SELECT poll_id, vote_id, option_index, visitor_hash, session_id, device_type,
                   browser_family, country_code, region_code, time_to_vote,
                   is_first_vote_in_session, previous_options_viewed, created_at
            FROM vote_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows.into_iter().map(VoteEventRow::into_event).collect())
    }

    async fn raw_shares(
        &self,
        poll_id: &str,
        filter: &EventFilter,
        limit: i64,
    ) -> Result<Vec<ShareEvent>> {
        let (start_ts, end_ts) = filter.ts_bounds();

        let rows = sqlx::query_as::<_, ShareEvent>(
            r#"
            SELECT poll_id, platform, share_method, visitor_hash, session_id, device_type,
                   browser_family, country_code, region_code, shared_url, created_at
            FROM share_events
            WHERE poll_id = ?
              AND created_at >= ? AND created_at <= ?
              AND (? IS NULL OR country_code = ?)
              AND (? IS NULL OR device_type = ?)
            ORDER BY created_at ASC
            LIMIT ?
            "#,
        )
        .bind(poll_id)
        .bind(start_ts)
        .bind(end_ts)
        .bind(filter.country.as_deref())
        .bind(filter.country.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(filter.device_type.as_deref())
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows)
    }
}
