use axum::{
    Router,
    routing::get,
};

use performance_cell::{create_performance_router, PerformanceService};

pub fn create_router(performance: PerformanceService) -> Router {
    Router::new()
        .route("/", get(|| async { "Agent Builder API is running!" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/performance", create_performance_router(performance))
}
