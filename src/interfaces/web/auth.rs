use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use super::error::ApiError;
use crate::core::error::RelayError;
use crate::core::session::SESSION_COOKIE;

/// Gate for configuration endpoints: a valid session cookie is always required.
pub async fn require_session(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if has_valid_session(&state, req.headers()) {
        next.run(req).await
    } else {
        unauthenticated()
    }
}

/// Gate for AI endpoints: only enforced when the deployment asks for it.
pub async fn require_ai_session(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if !state.services.config.ai_requires_session || has_valid_session(&state, req.headers()) {
        next.run(req).await
    } else {
        unauthenticated()
    }
}

fn unauthenticated() -> Response {
    ApiError::from(RelayError::Unauthenticated("login required".to_string())).into_response()
}

pub(crate) fn has_valid_session(state: &AppState, headers: &HeaderMap) -> bool {
    session_token(headers).is_some_and(|token| state.services.sessions.verify(&token))
}

/// The session token from the `Cookie` header, if present.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub(crate) fn session_cookie(token: &str, max_age_secs: u64, secure: bool) -> HeaderValue {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub(crate) fn cleared_cookie(secure: bool) -> HeaderValue {
    session_cookie("", 0, secure)
}
