use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::analytics::models::{ClickEventData, PageViewData, ShareEventData, VoteEventData};
use crate::analytics::EventRecorder;

pub struct IngestState {
    pub recorder: EventRecorder,
}

/// Every ingest endpoint answers 202 regardless of what happened inside the
/// recorder. Telemetry failures are logged there and must not surface to the
/// posting page.
fn accepted() -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(json!({ "status": "accepted" })))
}

/// Record a poll page view
pub async fn track_page_view(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(data): Json<PageViewData>,
) -> impl IntoResponse {
    state.recorder.track_page_view(&headers, data).await;
    accepted()
}

/// Record a vote submission
pub async fn track_vote(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(data): Json<VoteEventData>,
) -> impl IntoResponse {
    state.recorder.track_vote(&headers, data).await;
    accepted()
}

/// Record a share action
pub async fn track_share(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(data): Json<ShareEventData>,
) -> impl IntoResponse {
    state.recorder.track_share(&headers, data).await;
    accepted()
}

/// Record a click-through from a shared link
pub async fn track_click(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    Json(data): Json<ClickEventData>,
) -> impl IntoResponse {
    state.recorder.track_click(&headers, data).await;
    accepted()
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "OK" }))
}
