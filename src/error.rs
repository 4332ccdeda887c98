use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Too many votes, retry in {retry_after_ms}ms")]
    Throttled { retry_after_ms: i64 },
    #[error("Vote store unavailable")]
    StoreUnavailable,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            ApiError::Throttled { .. } => (StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
            ApiError::StoreUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "Vote store unavailable")
            }
            ApiError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(error: sqlx::Error) -> Self {
        ApiError::DatabaseError(error.to_string())
    }
}
