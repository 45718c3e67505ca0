use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::storage::StorageError;

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("rate limit exceeded, retry in {ms_before_next}ms")]
    RateLimited { ms_before_next: u64 },

    #[error("poll not found: {0}")]
    NotFound(String),

    #[error("export failed: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<StorageError> for ExportError {
    fn from(e: StorageError) -> Self {
        ExportError::Database(e.into())
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        match self {
            ExportError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "export request validation failed",
                    "details": errors,
                })),
            )
                .into_response(),
            ExportError::RateLimited { ms_before_next } => {
                // Retry-After is whole seconds, rounded up so clients never retry early
                let retry_after_secs = ms_before_next.div_ceil(1000).max(1);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    Json(json!({
                        "error": "export rate limit exceeded",
                        "ms_before_next": ms_before_next,
                    })),
                )
                    .into_response()
            }
            ExportError::NotFound(poll_id) => (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "error": format!("poll not found: {}", poll_id),
                })),
            )
                .into_response(),
            ExportError::Database(e) => {
                tracing::error!(error = %e, "export failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "internal server error",
                    })),
                )
                    .into_response()
            }
        }
    }
}
