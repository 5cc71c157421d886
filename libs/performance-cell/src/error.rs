use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PerformanceError {
    #[error("Operation failed: {0}")]
    Operation(anyhow::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Stream source failed: {0}")]
    Stream(String),
}

impl PerformanceError {
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, PerformanceError::InvalidConfiguration(_))
    }
}

/// Failure reported by a [`crate::CacheBackend`]. Never leaves the service:
/// every backend error is absorbed and treated as a miss.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl IntoResponse for PerformanceError {
    fn into_response(self) -> axum::response::Response {
        let status = match self {
            PerformanceError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::error!("Performance cell error: {}: {}", status, self);

        (status, Json(serde_json::json!({
            "error": self.to_string(),
            "timestamp": chrono::Utc::now()
        }))).into_response()
    }
}
