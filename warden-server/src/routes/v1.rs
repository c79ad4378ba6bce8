use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers::jobs, infra::app_state::AppState};

/// Create all v1 API routes
pub fn create_v1_router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/jobs",
            post(jobs::create_job_handler).get(jobs::list_jobs_handler),
        )
        .route("/jobs/{id}", get(jobs::job_snapshot_handler))
        .route("/jobs/{id}/events", get(jobs::job_events_sse_handler))
        .route("/jobs/{id}/pause", post(jobs::pause_job_handler))
        .route("/jobs/{id}/resume", post(jobs::resume_job_handler))
        .route("/jobs/{id}/stop", post(jobs::stop_job_handler))
        .route("/jobs/{id}/report", get(jobs::partial_report_handler))
        .route("/jobs/{id}/result", get(jobs::job_result_handler))
}
