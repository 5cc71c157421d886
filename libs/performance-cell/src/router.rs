use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::{
    cleanup_expired, clear_cache, get_performance_stats, invalidate_cache, reset_metrics,
    PerformanceHandlers,
};
use crate::services::PerformanceService;

pub fn create_performance_router(service: PerformanceService) -> Router {
    let handlers = Arc::new(PerformanceHandlers::new(service));

    Router::new()
        .route("/stats", get(get_performance_stats))
        .route("/cache/invalidate", post(invalidate_cache))
        .route("/cache/clear", post(clear_cache))
        .route("/cache/cleanup", post(cleanup_expired))
        .route("/metrics/reset", post(reset_metrics))
        .with_state(handlers)
}
