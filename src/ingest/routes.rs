use axum::{http::Method, routing::get, routing::post, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::analytics::EventRecorder;
use crate::storage::Storage;

use super::handlers::{
    health_check, track_click, track_page_view, track_share, track_vote, IngestState,
};

/// Builds the public ingest router. Poll pages post beacons from whatever
/// domain embeds them, so CORS allows any origin.
pub fn create_ingest_router(storage: Arc<dyn Storage>) -> Router {
    let state = Arc::new(IngestState {
        recorder: EventRecorder::new(storage),
    });

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health_check))
        .route("/track/view", post(track_page_view))
        .route("/track/vote", post(track_vote))
        .route("/track/share", post(track_share))
        .route("/track/click", post(track_click))
        .layer(cors)
        .with_state(state)
}
