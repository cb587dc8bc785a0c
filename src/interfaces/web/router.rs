use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{self, ai, monitor, platforms, session, tasks};

fn build_localhost_cors(port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", port),
        format!("http://localhost:{}", port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn build_api_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/auth/me", get(session::me))
        .route("/api/auth/login", post(session::login))
        .route("/api/auth/logout", post(session::logout));

    let admin_routes = Router::new()
        .route(
            "/api/admin/platforms",
            get(platforms::list_platforms).put(platforms::upsert_platforms),
        )
        .route("/api/admin/logs", get(super::sse_logs_endpoint))
        .route("/api/monitor", get(monitor::get_status))
        .route("/api/monitor/check", post(monitor::check_now))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let ai_routes = Router::new()
        .route("/api/ai/edit-image", post(ai::edit_image))
        .route("/api/ai/generate-image", post(ai::generate_image))
        .route("/api/ai/generate-video", post(ai::generate_video))
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route("/api/tasks/clear", post(tasks::clear_finished))
        .route(
            "/api/tasks/{id}",
            get(tasks::get_task).delete(tasks::delete_task),
        )
        .route("/api/tasks/{id}/events", get(tasks::task_events))
        .route("/api/tasks/{id}/cancel", post(tasks::cancel_task))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_ai_session,
        ));

    let config = &state.services.config;
    public_routes
        .merge(admin_routes)
        .merge(ai_routes)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(config.port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AppConfig;
    use crate::core::failover::testing::{Behavior, Fixture, fixture};
    use crate::core::services::RelayServices;
    use crate::core::session::SESSION_COOKIE;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    const PASSWORD: &str = "correct horse";

    struct TestApp {
        state: AppState,
        fx: Fixture,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn router(&self) -> Router {
            build_api_router(self.state.clone())
        }
    }

    fn test_app(script: &[(&str, Behavior)], tweak: impl FnOnce(&mut AppConfig)) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let fx = fixture(script);
        let mut config = AppConfig {
            data_dir: dir.path().to_path_buf(),
            admin_password: Some(PASSWORD.to_string()),
            ..AppConfig::default()
        };
        tweak(&mut config);
        let services = Arc::new(RelayServices::new(config, fx.registry()));
        let (log_tx, _) = tokio::sync::broadcast::channel(16);
        TestApp {
            state: AppState::new(services, log_tx),
            fx,
            _dir: dir,
        }
    }

    async fn json_request(
        app: Router,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        cookie: Option<&str>,
    ) -> (StatusCode, serde_json::Value) {
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let resp = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let body_bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&body_bytes).unwrap_or(serde_json::json!({}));
        (status, json)
    }

    async fn login(app: &TestApp) -> String {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from(format!(r#"{{"password":"{}"}}"#, PASSWORD)))
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .expect("login sets a cookie")
            .to_str()
            .unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn seed_platforms(app: &TestApp, cookie: &str) {
        let platforms: Vec<serde_json::Value> = app
            .fx
            .platforms
            .iter()
            .map(|p| {
                serde_json::json!({
                    "baseUrl": p.base_url,
                    "model": p.model,
                    "credential": p.credential,
                })
            })
            .collect();
        let (status, _) = json_request(
            app.router(),
            Method::PUT,
            "/api/admin/platforms",
            Some(serde_json::json!({ "platforms": platforms })),
            Some(cookie),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_is_public_and_carries_security_headers() {
        let app = test_app(&[], |_| {});
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(resp.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test]
    async fn login_flow_sets_and_clears_the_session_cookie() {
        let app = test_app(&[], |_| {});
        let (_, json) = json_request(app.router(), Method::GET, "/api/auth/me", None, None).await;
        assert_eq!(json["loggedIn"], false);

        let cookie = login(&app).await;
        assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
        let (_, json) = json_request(app.router(), Method::GET, "/api/auth/me", None, Some(&cookie)).await;
        assert_eq!(json["loggedIn"], true);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/logout")
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        let cleared = resp.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cleared.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let app = test_app(&[], |_| {});
        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/auth/login",
            Some(serde_json::json!({ "password": "nope" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn login_without_a_configured_password_is_a_configuration_error() {
        let app = test_app(&[], |c| c.admin_password = None);
        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/auth/login",
            Some(serde_json::json!({ "password": "anything" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["message"].as_str().unwrap().contains("GENRELAY_ADMIN_PASSWORD"));
    }

    #[tokio::test]
    async fn admin_routes_require_a_session() {
        let app = test_app(&[], |_| {});
        for (method, path) in [
            (Method::GET, "/api/admin/platforms"),
            (Method::GET, "/api/monitor"),
            (Method::POST, "/api/monitor/check"),
        ] {
            let (status, json) = json_request(app.router(), method, path, None, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", path);
            assert_eq!(json["ok"], false);
        }
        let forged = format!("{}=e30.forged", SESSION_COOKIE);
        let (status, _) =
            json_request(app.router(), Method::GET, "/api/admin/platforms", None, Some(&forged)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn platform_upsert_redacts_and_validates() {
        let app = test_app(&[], |_| {});
        let cookie = login(&app).await;

        let (status, json) = json_request(
            app.router(),
            Method::PUT,
            "/api/admin/platforms",
            Some(serde_json::json!({ "platforms": [{
                "baseUrl": "https://gen.example//",
                "model": "image-model",
                "credential": "sk-abcdefghijklmnop"
            }]})),
            Some(&cookie),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let stored = &json["platforms"][0];
        assert_eq!(stored["baseUrl"], "https://gen.example/");
        assert_eq!(stored["credentialPreview"], "sk-a****mnop");
        assert!(!json.to_string().contains("sk-abcdefghijklmnop"));

        let (status, json) = json_request(
            app.router(),
            Method::PUT,
            "/api/admin/platforms",
            Some(serde_json::json!({ "platforms": [{ "baseUrl": "https://new.example/", "model": "m" }]})),
            Some(&cookie),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn malformed_json_uses_the_error_envelope() {
        let app = test_app(&[], |c| c.ai_requires_session = false);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/ai/generate-image")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected_with_413() {
        let app = test_app(&[], |c| {
            c.ai_requires_session = false;
            c.max_body_bytes = 64;
        });
        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/ai/generate-image",
            Some(serde_json::json!({ "prompt": "x".repeat(500) })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn ai_routes_follow_the_session_toggle() {
        let gated = test_app(&[], |_| {});
        let (status, _) = json_request(
            gated.router(),
            Method::POST,
            "/api/ai/generate-image",
            Some(serde_json::json!({ "prompt": "a cat" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let open = test_app(&[], |c| c.ai_requires_session = false);
        let (status, json) = json_request(
            open.router(),
            Method::POST,
            "/api/ai/generate-image",
            Some(serde_json::json!({ "prompt": "a cat" })),
            None,
        )
        .await;
        // no platforms configured yet
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["ok"], false);
    }

    #[tokio::test]
    async fn generate_image_returns_the_requested_count() {
        let app = test_app(&[("a", Behavior::Succeed), ("b", Behavior::Succeed)], |_| {});
        let cookie = login(&app).await;
        seed_platforms(&app, &cookie).await;

        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/ai/generate-image",
            Some(serde_json::json!({ "prompt": "a cat", "count": 3, "aspectRatio": "16:9" })),
            Some(&cookie),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
        assert_eq!(json["result"]["artifacts"].as_array().unwrap().len(), 3);

        let (_, json) = json_request(app.router(), Method::GET, "/api/tasks", None, Some(&cookie)).await;
        assert_eq!(json["tasks"][0]["status"], "succeeded");
        assert_eq!(json["tasks"][0]["kind"], "generate-image");

        // the caller already got the artifacts; the ledger keeps only the status
        let id = json["tasks"][0]["id"].as_str().unwrap().to_string();
        let (_, json) =
            json_request(app.router(), Method::GET, &format!("/api/tasks/{}", id), None, Some(&cookie)).await;
        assert_eq!(json["task"]["status"], "succeeded");
        assert!(json["result"].is_null(), "{}", json);
    }

    #[tokio::test]
    async fn exhausted_platforms_surface_as_bad_gateway() {
        let app = test_app(&[("a", Behavior::Fail)], |c| c.fill_max_attempts = 1);
        let cookie = login(&app).await;
        seed_platforms(&app, &cookie).await;

        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/ai/generate-image",
            Some(serde_json::json!({ "prompt": "a cat" })),
            Some(&cookie),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = json["message"].as_str().unwrap();
        assert!(message.starts_with("filled 0/1"), "{}", message);
        assert!(message.contains("a is down"));
    }

    #[tokio::test]
    async fn monitor_check_reports_each_platform() {
        let app = test_app(&[("up", Behavior::Succeed), ("down", Behavior::Fail)], |_| {});
        let cookie = login(&app).await;
        seed_platforms(&app, &cookie).await;

        let (status, json) =
            json_request(app.router(), Method::POST, "/api/monitor/check", None, Some(&cookie)).await;
        assert_eq!(status, StatusCode::OK);
        let status_list = json["status"].as_array().unwrap();
        assert_eq!(status_list.len(), 2);
        assert_eq!(status_list[0]["ok"], true);
        assert_eq!(status_list[1]["ok"], false);

        let (_, json) = json_request(app.router(), Method::GET, "/api/monitor", None, Some(&cookie)).await;
        assert_eq!(json["status"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn task_lifecycle_over_http() {
        let app = test_app(&[("a", Behavior::Succeed)], |_| {});
        let cookie = login(&app).await;
        seed_platforms(&app, &cookie).await;

        let (status, json) = json_request(
            app.router(),
            Method::POST,
            "/api/tasks",
            Some(serde_json::json!({ "kind": "generate-image", "prompt": "a cat", "boardRef": "b-1" })),
            Some(&cookie),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let id = json["task"]["id"].as_str().unwrap().to_string();
        assert_eq!(json["task"]["boardRef"], "b-1");

        // the event stream ends with the terminal event
        let req = Request::builder()
            .uri(format!("/api/tasks/{}/events", id))
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap();
        let resp = app.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.trim_end().ends_with(r#"data: {"type":"succeeded"}"#), "{}", text);

        let (_, json) =
            json_request(app.router(), Method::GET, &format!("/api/tasks/{}", id), None, Some(&cookie)).await;
        assert_eq!(json["task"]["status"], "succeeded");
        assert_eq!(json["result"]["artifacts"].as_array().unwrap().len(), 1);

        let (status, _) =
            json_request(app.router(), Method::POST, &format!("/api/tasks/{}/cancel", id), None, Some(&cookie))
                .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, json) = json_request(app.router(), Method::POST, "/api/tasks/clear", None, Some(&cookie)).await;
        assert_eq!(json["removed"], 1);
        let (status, _) =
            json_request(app.router(), Method::DELETE, &format!("/api/tasks/{}", id), None, Some(&cookie)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unfinished_tasks_cannot_be_deleted() {
        let app = test_app(&[("slow", Behavior::Hang)], |_| {});
        let cookie = login(&app).await;
        seed_platforms(&app, &cookie).await;

        let (_, json) = json_request(
            app.router(),
            Method::POST,
            "/api/tasks",
            Some(serde_json::json!({ "kind": "generate-video", "prompt": "waves" })),
            Some(&cookie),
        )
        .await;
        let id = json["task"]["id"].as_str().unwrap().to_string();

        let (status, json) =
            json_request(app.router(), Method::DELETE, &format!("/api/tasks/{}", id), None, Some(&cookie)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["ok"], false);
    }
}
