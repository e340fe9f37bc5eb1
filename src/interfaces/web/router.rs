use axum::{
    Json, Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{dashboard, review};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/review/submit", post(review::submit_proposal))
        .route(
            "/api/v1/review/feedback/{job_id}",
            post(review::submit_feedback),
        )
        .route("/ws/{job_id}", get(review::observe_job))
        .route(
            "/api/v1/dashboard/jobs",
            get(dashboard::list_jobs).post(dashboard::create_job),
        )
        .route(
            "/api/v1/dashboard/jobs/{job_id}",
            get(dashboard::get_job_detail)
                .put(dashboard::update_job)
                .delete(dashboard::delete_job),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "gavel" }))
}
