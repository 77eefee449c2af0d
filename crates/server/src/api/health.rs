use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness endpoint. Reports the two background subsystems so a probe
/// can tell a half-started process from a healthy one.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "executor_running": state.executor.is_running(),
        "scheduler_running": state.scheduler.is_running(),
    }))
}

/// Fleet-wide certificate health summary.
pub async fn ssl_health(State(state): State<Arc<AppState>>) -> Json<certwatch_probe::HealthSummary> {
    Json(state.ssl.health_summary().await)
}
