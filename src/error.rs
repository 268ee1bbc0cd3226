use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Key material unreadable or the assertion exchange was rejected.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// Profile id or date range missing before a query.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The reporting API call failed. Never retried.
    #[error("query error: {0}")]
    Query(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AnalyticsError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AnalyticsError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AnalyticsError::Authentication(msg) => {
                tracing::error!(error = %msg, "authentication error");
                (
                    StatusCode::BAD_GATEWAY,
                    "analytics authentication failed".to_string(),
                )
            }
            AnalyticsError::Query(msg) => {
                tracing::error!(error = %msg, "query error");
                (
                    StatusCode::BAD_GATEWAY,
                    "analytics query failed".to_string(),
                )
            }
        };

        let body = json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

/// Failure reported by the external API client before it is classified.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode: {0}")]
    Decode(String),
}
