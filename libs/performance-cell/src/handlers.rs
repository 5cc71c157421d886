use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::error::PerformanceError;
use crate::models::{CleanupResponse, InvalidateCacheRequest, MetricsSnapshot};
use crate::services::PerformanceService;

pub struct PerformanceHandlers {
    service: PerformanceService,
}

impl PerformanceHandlers {
    pub fn new(service: PerformanceService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &PerformanceService {
        &self.service
    }
}

pub async fn get_performance_stats(
    State(handlers): State<Arc<PerformanceHandlers>>,
) -> Json<MetricsSnapshot> {
    Json(handlers.service.get_metrics().await)
}

#[instrument(skip(handlers, request), fields(cache_key = %request.cache_key))]
pub async fn invalidate_cache(
    State(handlers): State<Arc<PerformanceHandlers>>,
    Json(request): Json<InvalidateCacheRequest>,
) -> Result<StatusCode, PerformanceError> {
    if request.cache_key.trim().is_empty() {
        return Err(PerformanceError::InvalidConfiguration(
            "cache_key must not be empty".to_string(),
        ));
    }

    handlers
        .service
        .invalidate_cache(&request.cache_key, &request.args)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_cache(State(handlers): State<Arc<PerformanceHandlers>>) -> StatusCode {
    handlers.service.clear_cache().await;
    StatusCode::NO_CONTENT
}

pub async fn cleanup_expired(
    State(handlers): State<Arc<PerformanceHandlers>>,
) -> Json<CleanupResponse> {
    let removed = handlers.service.cleanup_expired().await;
    info!("Expired-entry sweep removed {} entries", removed);
    Json(CleanupResponse { removed })
}

pub async fn reset_metrics(State(handlers): State<Arc<PerformanceHandlers>>) -> StatusCode {
    handlers.service.reset_metrics();
    StatusCode::NO_CONTENT
}
