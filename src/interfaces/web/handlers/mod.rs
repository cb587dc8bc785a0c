pub mod ai;
pub mod monitor;
pub mod platforms;
pub mod session;
pub mod tasks;

use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}
