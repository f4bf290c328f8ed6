use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Request-scoped failures. Query errors are fatal to the affected request
/// and surface as a 500 with no retry or partial-result degradation.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::BadRequest(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "type": "about:blank",
                    "title": "Bad Request",
                    "status": 400,
                    "detail": detail,
                })),
            )
                .into_response(),
            ApiError::Internal(err) => {
                tracing::error!("request failed: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "type": "about:blank",
                        "title": "Internal Server Error",
                        "status": 500,
                        "detail": err.to_string(),
                    })),
                )
                    .into_response()
            }
        }
    }
}
