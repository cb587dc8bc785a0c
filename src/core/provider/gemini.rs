use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::polling::{VideoRef, find_video, poll_until_complete};
use super::{
    GeneratedArtifact, GenerationOutput, ImageProvider, ImageRequest, InlineImage, ProviderKind,
    VideoRequest, check_status, versioned_url,
};
use crate::core::error::RelayError;
use crate::core::platforms::Platform;

const API_VERSION: &str = "v1beta";
const KEY_HEADER: &str = "x-goog-api-key";

// ── generateContent request/response ──

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: Blob,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Blob {
    #[serde(alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: [&'static str; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<ImageConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<&'static str>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "inlineData", alias = "inline_data")]
    inline_data: Option<Blob>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

// ── predictLongRunning (video) ──

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<VideoInstance>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<VideoParameters>,
}

#[derive(Serialize)]
struct VideoInstance {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<VideoImage>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoImage {
    bytes_base64_encoded: String,
    mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters {
    aspect_ratio: String,
}

#[derive(Deserialize)]
struct OperationHandle {
    name: String,
}

/// Client for Google-style `generateContent` / `predictLongRunning` endpoints.
pub struct GeminiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
    poll_interval: Duration,
    poll_max_wait: Duration,
}

impl GeminiProvider {
    pub fn new(platform: &Platform, client: Client, poll_interval: Duration, poll_max_wait: Duration) -> Self {
        Self {
            base_url: platform.base_url.clone(),
            model: platform.model.clone(),
            api_key: platform.credential.clone(),
            client,
            poll_interval,
            poll_max_wait,
        }
    }

    fn model_url(&self, method: &str) -> String {
        versioned_url(
            &self.base_url,
            API_VERSION,
            &format!("models/{}:{}", self.model, method),
        )
    }

    async fn generate_content(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError> {
        let body = build_content_request(request);
        let res = self
            .client
            .post(self.model_url("generateContent"))
            .header(KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: GenerateContentResponse = check_status(res).await?.json().await?;
        extract_output(parsed)
    }

    async fn fetch_operation(&self, name: &str) -> Result<Value, RelayError> {
        let res = self
            .client
            .get(versioned_url(&self.base_url, API_VERSION, name))
            .header(KEY_HEADER, &self.api_key)
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn edit(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError> {
        if request.images.is_empty() {
            return Err(RelayError::Validation("edit requires at least one image".to_string()));
        }
        self.generate_content(request).await
    }

    async fn generate_from_text(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError> {
        self.generate_content(request).await
    }

    async fn generate_video(&self, request: &VideoRequest) -> Result<GenerationOutput, RelayError> {
        let body = PredictRequest {
            instances: vec![VideoInstance {
                prompt: request.prompt.clone(),
                image: request.image.as_ref().map(|img| VideoImage {
                    bytes_base64_encoded: img.data.clone(),
                    mime_type: img.mime_type.clone(),
                }),
            }],
            parameters: request.aspect_ratio.as_ref().map(|ratio| VideoParameters {
                aspect_ratio: ratio.clone(),
            }),
        };
        let res = self
            .client
            .post(self.model_url("predictLongRunning"))
            .header(KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let handle: OperationHandle = check_status(res).await?.json().await?;

        let finished = poll_until_complete(self.poll_interval, self.poll_max_wait, || {
            self.fetch_operation(&handle.name)
        })
        .await?;

        let artifact = match find_video(&finished) {
            Some(VideoRef::Inline { data, mime_type }) => GeneratedArtifact { data, mime_type },
            Some(VideoRef::Remote(uri)) => {
                let res = self
                    .client
                    .get(&uri)
                    .header(KEY_HEADER, &self.api_key)
                    .send()
                    .await?;
                let bytes = check_status(res).await?.bytes().await?;
                GeneratedArtifact::from_bytes(&bytes, "video/mp4")
            }
            None => return Err(RelayError::upstream("operation finished without a video")),
        };
        Ok(GenerationOutput {
            artifacts: vec![artifact],
            text: None,
        })
    }
}

fn inline_part(image: &InlineImage) -> Part {
    Part::Inline {
        inline_data: Blob {
            mime_type: image.mime_type.clone(),
            data: image.data.clone(),
        },
    }
}

fn build_content_request(request: &ImageRequest) -> GenerateContentRequest {
    let mut parts = vec![Part::Text {
        text: request.prompt.clone(),
    }];
    parts.extend(request.images.iter().map(inline_part));
    if let Some(mask) = &request.mask {
        parts.push(Part::Text {
            text: "The next image is a mask: only change the white areas of the first image."
                .to_string(),
        });
        parts.push(inline_part(mask));
    }

    let image_config = if request.aspect_ratio.is_some() || request.size_tier.is_some() {
        Some(ImageConfig {
            aspect_ratio: request.aspect_ratio.clone(),
            image_size: request.size_tier.map(|t| t.as_str()),
        })
    } else {
        None
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config: GenerationConfig {
            response_modalities: ["TEXT", "IMAGE"],
            image_config,
        },
    }
}

fn extract_output(response: GenerateContentResponse) -> Result<GenerationOutput, RelayError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(RelayError::upstream(format!("prompt blocked: {}", reason)));
    }

    let mut output = GenerationOutput::default();
    let mut texts = Vec::new();
    let mut finish_reason = None;
    for candidate in response.candidates {
        if finish_reason.is_none() {
            finish_reason = candidate.finish_reason;
        }
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(blob) = part.inline_data {
                output.artifacts.push(GeneratedArtifact {
                    data: blob.data,
                    mime_type: blob.mime_type,
                });
            } else if let Some(text) = part.text.filter(|t| !t.trim().is_empty()) {
                texts.push(text);
            }
        }
    }
    if !texts.is_empty() {
        output.text = Some(texts.join("\n"));
    }
    if output.artifacts.is_empty() {
        let reason = finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(RelayError::upstream(format!(
            "no image returned (finishReason: {})",
            reason
        )));
    }
    Ok(output)
}
