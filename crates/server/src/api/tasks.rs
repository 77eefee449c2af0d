use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use certwatch_executor::{ExecutorStats, TaskPriority, TaskRecord, TaskStatus};

use crate::jobs;
use crate::state::AppState;

pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.scheduler.get_job_status().await)
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub job_id: String,
}

pub async fn trigger_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> (StatusCode, Json<Value>) {
    let outcome = state.scheduler.trigger_job_now(&req.job_id).await;
    let triggered = outcome
        .get("triggered")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let code = if triggered {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    (code, Json(outcome))
}

#[derive(Debug, Deserialize, Default)]
pub struct SslCheckRequest {
    #[serde(default)]
    pub website_ids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub priority: Option<String>,
}

pub async fn submit_ssl_check(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SslCheckRequest>>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let priority = parse_priority(req.priority.as_deref(), TaskPriority::Normal)?;
    let task_id = jobs::submit_ssl_check_task(&state, req.website_ids, priority).await;
    Ok((
        StatusCode::OK,
        Json(json!({ "task_id": task_id, "status": "submitted" })),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct NotificationsRequest {
    #[serde(default)]
    pub days: Option<Vec<i64>>,
    #[serde(default)]
    pub priority: Option<String>,
}

pub async fn submit_notifications(
    State(state): State<Arc<AppState>>,
    body: Option<Json<NotificationsRequest>>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let priority = parse_priority(req.priority.as_deref(), TaskPriority::High)?;
    let task_id = jobs::submit_notification_task(&state, req.days, priority).await;
    Ok((
        StatusCode::OK,
        Json(json!({ "task_id": task_id, "status": "submitted" })),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListTasksQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let tasks = state.executor.list_tasks(status, query.limit).await;
    let tasks: Vec<Value> = tasks.iter().map(task_to_value).collect();
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.executor.get_task(&task_id).await {
        Some(task) => Ok(Json(task_to_value(&task))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("task not found: {task_id}") })),
        )),
    }
}

pub async fn task_stats(State(state): State<Arc<AppState>>) -> Json<ExecutorStats> {
    Json(state.executor.stats().await)
}

/// Flatten a record for the API, adding the derived duration.
fn task_to_value(task: &TaskRecord) -> Value {
    let mut value = serde_json::to_value(task).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        map.insert("duration_seconds".into(), json!(task.duration_seconds()));
    }
    value
}

fn parse_priority(
    raw: Option<&str>,
    default: TaskPriority,
) -> Result<TaskPriority, (StatusCode, Json<Value>)> {
    match raw {
        None => Ok(default),
        Some("low") => Ok(TaskPriority::Low),
        Some("normal") => Ok(TaskPriority::Normal),
        Some("high") => Ok(TaskPriority::High),
        Some("critical") => Ok(TaskPriority::Critical),
        Some(other) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown priority: {other}") })),
        )),
    }
}

fn parse_status(raw: &str) -> Result<TaskStatus, (StatusCode, Json<Value>)> {
    match raw {
        "pending" => Ok(TaskStatus::Pending),
        "running" => Ok(TaskStatus::Running),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        "cancelled" => Ok(TaskStatus::Cancelled),
        "retrying" => Ok(TaskStatus::Retrying),
        other => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown status: {other}") })),
        )),
    }
}
