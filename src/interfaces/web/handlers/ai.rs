use axum::{Json, extract::State};

use super::super::AppState;
use super::super::error::{ApiError, ApiJson};
use crate::core::error::RelayError;
use crate::core::provider::{
    DesiredCount, ImageRequest, InlineImage, OperationKind, OperationRequest, SizeTier, VideoRequest,
};

/// Body shared by every generation endpoint; each kind reads what it needs.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationBody {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
    #[serde(default)]
    pub size_tier: Option<SizeTier>,
    #[serde(default)]
    pub count: Option<i64>,
}

impl GenerationBody {
    pub fn into_request(self, kind: OperationKind) -> Result<OperationRequest, RelayError> {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(RelayError::Validation("prompt is required".to_string()));
        }
        let aspect_ratio = self
            .aspect_ratio
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let mut images = self
            .images
            .iter()
            .map(|raw| InlineImage::parse(raw))
            .collect::<Result<Vec<_>, _>>()?;

        match kind {
            OperationKind::GenerateVideo => Ok(OperationRequest::GenerateVideo(VideoRequest {
                prompt,
                image: if images.is_empty() { None } else { Some(images.remove(0)) },
                aspect_ratio,
            })),
            OperationKind::EditImage | OperationKind::GenerateImage => {
                if kind == OperationKind::EditImage && images.is_empty() {
                    return Err(RelayError::Validation(
                        "images: at least one reference image is required".to_string(),
                    ));
                }
                let mask = self
                    .mask
                    .as_deref()
                    .filter(|m| !m.trim().is_empty())
                    .map(InlineImage::parse)
                    .transpose()?;
                let request = ImageRequest {
                    prompt,
                    images,
                    mask,
                    aspect_ratio,
                    size_tier: self.size_tier,
                    count: DesiredCount::clamped(self.count.unwrap_or(1)),
                };
                Ok(if kind == OperationKind::EditImage {
                    OperationRequest::EditImage(request)
                } else {
                    OperationRequest::GenerateImage(request)
                })
            }
        }
    }
}

async fn run(state: AppState, kind: OperationKind, body: GenerationBody) -> Result<Json<serde_json::Value>, ApiError> {
    let request = body.into_request(kind)?;
    let result = state.services.dispatcher.run(request).await?;
    Ok(Json(serde_json::json!({ "ok": true, "result": result })))
}

pub async fn edit_image(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GenerationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run(state, OperationKind::EditImage, body).await
}

pub async fn generate_image(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GenerationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run(state, OperationKind::GenerateImage, body).await
}

pub async fn generate_video(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GenerationBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    run(state, OperationKind::GenerateVideo, body).await
}
