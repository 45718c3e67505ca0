use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::analytics::models::{DailyAnalytics, PollAnalyticsSummary};
use crate::analytics::unix_now;
use crate::export::{
    validate_export_request, ExportError, ExportPipeline, ExportRequest, ValidationReport,
};
use crate::models::{CreatePollRequest, Poll, PollType};
use crate::storage::{Storage, StorageError};

/// Summaries returned per bulk request; ids beyond this are ignored.
const MAX_BULK_POLLS: usize = 500;

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub exports: Arc<ExportPipeline>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn not_found(message: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("api request failed: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal server error".to_string(),
        }),
    )
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Generate a random URL-safe poll id
fn generate_poll_id() -> String {
    use rand::RngExt;
    rand::rng()
        .sample_iter(rand::distr::Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// Create a new poll with a generated id
pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<Poll>), ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(bad_request("question cannot be empty"));
    }
    if payload.options.len() < 2 || payload.options.len() > 20 {
        return Err(bad_request("a poll needs between 2 and 20 options"));
    }
    if payload.options.iter().any(|o| o.trim().is_empty()) {
        return Err(bad_request("options cannot be empty"));
    }

    // Generated ids collide rarely; retry a few times rather than probing
    // for existence first.
    for _ in 0..5 {
        let poll = Poll {
            id: generate_poll_id(),
            question: question.to_string(),
            options: payload.options.clone(),
            poll_type: payload.poll_type,
            hide_results: payload.hide_results,
            is_active: true,
            created_at: unix_now(),
        };

        match state.storage.create_poll(&poll).await {
            Ok(()) => return Ok((StatusCode::CREATED, Json(poll))),
            Err(StorageError::Conflict) => continue,
            Err(e) => return Err(internal_error(e)),
        }
    }

    Err(internal_error("failed to generate a unique poll id"))
}

/// Get a poll by id
pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
) -> Result<Json<Poll>, ApiError> {
    match state.storage.get_poll(&poll_id).await {
        Ok(Some(poll)) => Ok(Json(poll)),
        Ok(None) => Err(not_found(format!("poll not found: {}", poll_id))),
        Err(e) => Err(internal_error(e)),
    }
}

/// List polls, newest first
pub async fn list_polls(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Poll>>, ApiError> {
    let limit = query.limit.clamp(1, 1000);
    let offset = query.offset.max(0);

    match state.storage.list_polls(limit, offset).await {
        Ok(polls) => Ok(Json(polls)),
        Err(e) => Err(internal_error(e)),
    }
}

/// Get the analytics summary for a poll
pub async fn get_poll_analytics(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
) -> Result<Json<PollAnalyticsSummary>, ApiError> {
    match state.storage.get_poll_analytics(&poll_id).await {
        Ok(Some(summary)) => Ok(Json(summary)),
        Ok(None) => Err(not_found(format!("no analytics for poll: {}", poll_id))),
        Err(e) => Err(internal_error(e)),
    }
}

#[derive(Deserialize)]
pub struct DailyQuery {
    /// UTC day to aggregate, as YYYY-MM-DD.
    pub date: String,
}

/// Get one UTC day of aggregated analytics for a poll
pub async fn get_daily_analytics(
    State(state): State<Arc<AppState>>,
    Path(poll_id): Path<String>,
    Query(query): Query<DailyQuery>,
) -> Result<Json<DailyAnalytics>, ApiError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| bad_request(format!("invalid date: {} (expected YYYY-MM-DD)", query.date)))?;
    let day_start = date.and_time(NaiveTime::MIN).and_utc().timestamp();

    match state.storage.get_daily_analytics(&poll_id, day_start).await {
        Ok(Some(daily)) => Ok(Json(daily)),
        Ok(None) => Err(not_found(format!(
            "no analytics for poll {} on {}",
            poll_id, query.date
        ))),
        Err(e) => Err(internal_error(e)),
    }
}

#[derive(Deserialize)]
pub struct BulkAnalyticsRequest {
    pub poll_ids: Vec<String>,
}

/// Get summaries for several polls, ordered by total views descending
pub async fn get_bulk_analytics(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BulkAnalyticsRequest>,
) -> Result<Json<Vec<PollAnalyticsSummary>>, ApiError> {
    let ids: Vec<String> = payload.poll_ids.into_iter().take(MAX_BULK_POLLS).collect();

    match state.storage.get_bulk_analytics(&ids).await {
        Ok(summaries) => Ok(Json(summaries)),
        Err(e) => Err(internal_error(e)),
    }
}

/// Pre-flight an export request: blocking errors, advisory warnings, and
/// heuristic size estimates, without touching the database.
pub async fn validate_export(
    headers: HeaderMap,
    Json(request): Json<ExportRequest>,
) -> Json<ValidationReport> {
    let user_id = extract_user_id(&headers);
    Json(validate_export_request(&request, user_id.as_deref()))
}

/// Run an export and return the serialized document as a download.
pub async fn run_export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ExportError> {
    let user_id = extract_user_id(&headers);
    let client_ip = crate::analytics::client_ip::extract_client_ip(&headers);

    let completed = state.exports.export(request, user_id, &client_ip).await?;
    let meta = &completed.metadata;

    let filename = format!(
        "poll-{}-{}.{}",
        meta.poll_id,
        meta.granularity.as_str(),
        meta.format.as_str()
    );

    // poll id, checksum and export id are validated/generated shapes, so
    // these header values always parse
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        meta.format.content_type().parse().unwrap(),
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"{}\"", filename)
            .parse()
            .unwrap(),
    );
    response_headers.insert("x-export-id", meta.export_id.parse().unwrap());
    response_headers.insert("x-export-checksum", meta.checksum.parse().unwrap());
    response_headers.insert(
        "x-export-cache",
        if completed.from_cache { "hit" } else { "miss" }.parse().unwrap(),
    );

    Ok((response_headers, completed.body).into_response())
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

/// Identity established upstream arrives as an opaque header.
fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
