use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use tokio_stream::{Stream, StreamExt};

use super::super::AppState;
use super::super::error::{ApiError, ApiJson};
use super::ai::GenerationBody;
use crate::core::provider::OperationKind;
use crate::core::tasks::TaskError;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub kind: OperationKind,
    #[serde(default)]
    pub board_ref: Option<String>,
    #[serde(flatten)]
    pub body: GenerationBody,
}

pub async fn list_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tasks = state.services.dispatcher.tasks().list();
    Json(serde_json::json!({ "ok": true, "tasks": tasks }))
}

pub async fn create_task(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let request = payload.body.into_request(payload.kind)?;
    let board_ref = payload.board_ref.filter(|b| !b.trim().is_empty());
    let task = state.services.dispatcher.submit(request, board_ref);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "ok": true, "task": task })),
    ))
}

pub async fn get_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tasks = state.services.dispatcher.tasks();
    let task = tasks.get(&id).ok_or_else(|| TaskError::NotFound(id.clone()))?;
    let mut body = serde_json::json!({ "ok": true, "task": task });
    if let Some(result) = tasks.result(&id) {
        body["result"] = serde_json::to_value(result).unwrap_or_default();
    }
    Ok(Json(body))
}

pub async fn task_events(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state.services.dispatcher.tasks().subscribe(&id)?;
    let stream = events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().event(event.name()).data(data))
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn cancel_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state.services.dispatcher.tasks().cancel(&id)?;
    Ok(Json(serde_json::json!({ "ok": true, "task": task })))
}

pub async fn delete_task(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.services.dispatcher.tasks().remove(&id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn clear_finished(State(state): State<AppState>) -> Json<serde_json::Value> {
    let removed = state.services.dispatcher.tasks().clear_finished();
    Json(serde_json::json!({ "ok": true, "removed": removed }))
}
