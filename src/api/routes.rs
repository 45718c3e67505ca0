use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::export::ExportPipeline;
use crate::storage::Storage;

use super::handlers::{
    create_poll, get_bulk_analytics, get_daily_analytics, get_poll, get_poll_analytics,
    health_check, list_polls, run_export, validate_export, AppState,
};

pub fn create_api_router(storage: Arc<dyn Storage>, exports: Arc<ExportPipeline>) -> Router {
    let state = Arc::new(AppState { storage, exports });

    let api_routes = Router::new()
        .route("/polls", post(create_poll).get(list_polls))
        .route("/polls/{poll_id}", get(get_poll))
        .route("/analytics/bulk", post(get_bulk_analytics))
        .route("/analytics/{poll_id}", get(get_poll_analytics))
        .route("/analytics/{poll_id}/daily", get(get_daily_analytics))
        .route("/export", post(run_export))
        .route("/export/validate", post(validate_export))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes)
}
