use axum::{extract::State, response::Json};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "jobs": state.jobs().job_count().await,
        "max_queue_len": state.config().jobs.max_queue_len,
        "valuation_enabled": state.config().upstream.valuation_url.is_some(),
    }))
}
