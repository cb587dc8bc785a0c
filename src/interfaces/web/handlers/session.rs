use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use tracing::{info, warn};

use super::super::AppState;
use super::super::auth::{cleared_cookie, has_valid_session, session_cookie};
use super::super::error::{ApiError, ApiJson};
use crate::core::error::RelayError;
use crate::core::session::constant_time_eq;

#[derive(serde::Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "loggedIn": has_valid_session(&state, &headers) }))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = &state.services.config;
    let expected = config.admin_password.as_deref().ok_or_else(|| {
        RelayError::Configuration("no admin password configured: set GENRELAY_ADMIN_PASSWORD".to_string())
    })?;
    if !constant_time_eq(payload.password.as_bytes(), expected.as_bytes()) {
        warn!("Rejected login attempt");
        return Err(RelayError::Unauthenticated("invalid password".to_string()).into());
    }

    let token = state.services.sessions.issue()?;
    let cookie = session_cookie(&token, state.services.sessions.ttl().as_secs(), config.cookie_secure);
    info!("Admin session issued");
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "ok": true })),
    ))
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, cleared_cookie(state.services.config.cookie_secure))],
        Json(serde_json::json!({ "ok": true })),
    )
}
