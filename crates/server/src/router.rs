use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

use crate::api::{health, tasks, websites};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);
    Router::new()
        .route("/health", get(health::health))
        .route("/api/ssl/health", get(health::ssl_health))
        .route("/api/tasks/scheduler/status", get(tasks::scheduler_status))
        .route("/api/tasks/scheduler/trigger", post(tasks::trigger_job))
        .route(
            "/api/tasks/background/ssl-check",
            post(tasks::submit_ssl_check),
        )
        .route(
            "/api/tasks/background/notifications",
            post(tasks::submit_notifications),
        )
        .route("/api/tasks/background/tasks", get(tasks::list_tasks))
        .route(
            "/api/tasks/background/tasks/{task_id}",
            get(tasks::get_task),
        )
        .route("/api/tasks/background/stats", get(tasks::task_stats))
        .route(
            "/api/websites",
            get(websites::list_websites).post(websites::create_website),
        )
        .route("/api/websites/{id}", delete(websites::delete_website))
        .route("/api/websites/{id}/refresh", post(websites::refresh_website))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(Any)
            .allow_headers(Any),
        Err(_) => {
            warn!(origin, "invalid CORS_ORIGIN, falling back to permissive");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}
