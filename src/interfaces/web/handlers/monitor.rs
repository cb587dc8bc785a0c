use axum::{Json, extract::State};

use super::super::AppState;
use super::super::error::ApiError;

pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "status": state.services.monitor.snapshot() }))
}

pub async fn check_now(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let status = state.services.monitor.check_once().await?;
    Ok(Json(serde_json::json!({ "ok": true, "status": status })))
}
