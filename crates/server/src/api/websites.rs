use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use certwatch_core::Website;

use crate::state::AppState;

pub async fn list_websites(State(state): State<Arc<AppState>>) -> Json<Value> {
    let websites = state.websites.list().await;
    Json(json!({ "count": websites.len(), "websites": websites }))
}

#[derive(Debug, Deserialize)]
pub struct CreateWebsiteRequest {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_website(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateWebsiteRequest>,
) -> Result<(StatusCode, Json<Website>), (StatusCode, Json<Value>)> {
    if req.name.trim().is_empty() || req.url.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "name and url are required" })),
        ));
    }
    let mut site = Website::new(req.name.trim(), req.url.trim());
    site.description = req.description;
    match state.websites.insert(site).await {
        Ok(site) => Ok((StatusCode::CREATED, Json(site))),
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

pub async fn delete_website(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    match state.websites.remove(id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Probe one site immediately, outside any schedule, and return the
/// fresh record.
pub async fn refresh_website(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let site = state.websites.get(id).await.map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    let record = state.ssl.check_site(&site).await;
    Ok(Json(json!({ "website": site, "certificate": record })))
}
