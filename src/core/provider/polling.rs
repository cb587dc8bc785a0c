use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::core::error::RelayError;

const SUCCESS_STATES: &[&str] = &["completed", "complete", "succeeded", "success", "done", "finished"];
const FAILURE_STATES: &[&str] = &["failed", "failure", "error", "cancelled", "canceled", "expired"];

#[derive(Debug, Clone, PartialEq)]
pub(super) enum PollState {
    Pending,
    Completed,
    Failed(String),
}

/// Where a finished job's video lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum VideoRef {
    Inline { data: String, mime_type: String },
    Remote(String),
}

/// Some upstreams report completion through a status field, others only by
/// attaching a result payload. Both signals are honored; an explicit failure
/// always wins.
pub(super) fn classify(body: &Value) -> PollState {
    if let Some(message) = error_message(body) {
        return PollState::Failed(message);
    }

    let status = body
        .get("status")
        .or_else(|| body.get("state"))
        .and_then(Value::as_str)
        .map(|s| s.to_ascii_lowercase());

    if let Some(status) = status.as_deref() {
        if FAILURE_STATES.contains(&status) {
            return PollState::Failed(format!("job ended with status '{}'", status));
        }
        if SUCCESS_STATES.contains(&status) {
            return PollState::Completed;
        }
    }

    if body.get("done").and_then(Value::as_bool) == Some(true) {
        return PollState::Completed;
    }

    if find_video(body).is_some() {
        return PollState::Completed;
    }

    PollState::Pending
}

fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

/// Depth-limited search for an inline or remote video in a job body.
pub(super) fn find_video(body: &Value) -> Option<VideoRef> {
    find_video_at(body, 0)
}

fn find_video_at(value: &Value, depth: usize) -> Option<VideoRef> {
    if depth > 6 {
        return None;
    }
    match value {
        Value::Object(map) => {
            for key in ["bytesBase64Encoded", "b64_json", "video_base64"] {
                if let Some(data) = map.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
                    let mime_type = map
                        .get("mimeType")
                        .or_else(|| map.get("mime_type"))
                        .and_then(Value::as_str)
                        .unwrap_or("video/mp4")
                        .to_string();
                    return Some(VideoRef::Inline {
                        data: data.to_string(),
                        mime_type,
                    });
                }
            }
            for key in ["video_url", "uri", "url"] {
                if let Some(url) = map
                    .get(key)
                    .and_then(Value::as_str)
                    .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
                {
                    return Some(VideoRef::Remote(url.to_string()));
                }
            }
            map.values().find_map(|v| find_video_at(v, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_video_at(v, depth + 1)),
        _ => None,
    }
}

/// Fetch the job body every `interval` until it completes, fails, or `max_wait` elapses.
pub(super) async fn poll_until_complete<F, Fut>(
    interval: Duration,
    max_wait: Duration,
    mut fetch: F,
) -> Result<Value, RelayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Value, RelayError>>,
{
    let started = tokio::time::Instant::now();
    loop {
        let body = fetch().await?;
        match classify(&body) {
            PollState::Completed => return Ok(body),
            PollState::Failed(message) => return Err(RelayError::upstream(message)),
            PollState::Pending => {
                if started.elapsed() + interval > max_wait {
                    return Err(RelayError::Timeout(max_wait));
                }
                debug!("Upstream job still pending, polling again in {:?}", interval);
                tokio::time::sleep(interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn status_field_signals_completion() {
        assert_eq!(classify(&json!({ "id": "v1", "status": "completed" })), PollState::Completed);
        assert_eq!(classify(&json!({ "name": "op/1", "done": true })), PollState::Completed);
        assert_eq!(classify(&json!({ "id": "v1", "status": "in_progress" })), PollState::Pending);
        assert_eq!(classify(&json!({ "name": "op/1" })), PollState::Pending);
    }

    #[test]
    fn payload_without_status_signals_completion() {
        let body = json!({ "result": { "videos": [{ "url": "https://cdn.example/v.mp4" }] } });
        assert_eq!(classify(&body), PollState::Completed);
        assert_eq!(find_video(&body), Some(VideoRef::Remote("https://cdn.example/v.mp4".to_string())));
    }

    #[test]
    fn explicit_failure_wins_over_payload() {
        let body = json!({ "status": "failed", "url": "https://cdn.example/v.mp4" });
        assert!(matches!(classify(&body), PollState::Failed(_)));

        let body = json!({ "done": true, "error": { "code": 3, "message": "blocked by policy" } });
        assert_eq!(classify(&body), PollState::Failed("blocked by policy".to_string()));
    }

    #[test]
    fn finds_inline_gemini_samples() {
        let body = json!({
            "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [
                { "video": { "bytesBase64Encoded": "AAAA", "mimeType": "video/mp4" } }
            ] } }
        });
        assert_eq!(
            find_video(&body),
            Some(VideoRef::Inline { data: "AAAA".to_string(), mime_type: "video/mp4".to_string() })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_the_job_reports_done() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let body = poll_until_complete(Duration::from_secs(5), Duration::from_secs(60), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Ok(json!({ "status": "queued" }))
                } else {
                    Ok(json!({ "status": "succeeded" }))
                }
            }
        })
        .await
        .expect("job should finish");
        assert_eq!(body["status"], "succeeded");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_wait() {
        let err = poll_until_complete(Duration::from_secs(5), Duration::from_secs(12), || async {
            Ok(json!({ "status": "running" }))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, RelayError::Timeout(_)));
    }
}
