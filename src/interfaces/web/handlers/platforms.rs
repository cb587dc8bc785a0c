use axum::{Json, extract::State};

use super::super::AppState;
use super::super::error::{ApiError, ApiJson};
use crate::core::platforms::PlatformInput;

#[derive(serde::Deserialize)]
pub struct UpsertPlatformsRequest {
    #[serde(default)]
    pub platforms: Vec<PlatformInput>,
}

pub async fn list_platforms(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let platforms = state.services.platforms.list_redacted().await?;
    Ok(Json(serde_json::json!({ "ok": true, "platforms": platforms })))
}

pub async fn upsert_platforms(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpsertPlatformsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let platforms = state.services.platforms.upsert(payload.platforms).await?;
    // cached clients still hold the old credentials
    state.services.pool.clear();
    Ok(Json(serde_json::json!({ "ok": true, "platforms": platforms })))
}
