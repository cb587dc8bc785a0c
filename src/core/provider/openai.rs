use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::polling::{VideoRef, find_video, poll_until_complete};
use super::{
    GeneratedArtifact, GenerationOutput, ImageProvider, ImageRequest, ProviderKind, VideoRequest,
    check_status, versioned_url,
};
use crate::core::error::RelayError;
use crate::core::platforms::Platform;

const API_VERSION: &str = "v1";

#[derive(Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'static str,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Serialize)]
struct VideoCreateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'static str>,
}

#[derive(Deserialize)]
struct VideoJob {
    id: String,
}

/// Client for OpenAI-compatible `/v1/images/*` and `/v1/videos` endpoints.
pub struct OpenAiProvider {
    base_url: String,
    model: String,
    api_key: String,
    client: Client,
    poll_interval: Duration,
    poll_max_wait: Duration,
}

impl OpenAiProvider {
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

    fn url(&self, rest: &str) -> String {
        versioned_url(&self.base_url, API_VERSION, rest)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    async fn collect_images(&self, response: ImagesResponse) -> Result<GenerationOutput, RelayError> {
        let mut output = GenerationOutput::default();
        for datum in response.data {
            if output.text.is_none() {
                output.text = datum.revised_prompt.clone();
            }
            if let Some(b64) = datum.b64_json.filter(|s| !s.is_empty()) {
                output.artifacts.push(GeneratedArtifact {
                    data: b64,
                    mime_type: "image/png".to_string(),
                });
            } else if let Some(url) = datum.url {
                let res = self.client.get(&url).send().await?;
                let res = check_status(res).await?;
                let mime = res
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("image/png")
                    .to_string();
                let bytes = res.bytes().await?;
                output.artifacts.push(GeneratedArtifact::from_bytes(&bytes, mime));
            }
        }
        if output.artifacts.is_empty() {
            return Err(RelayError::upstream("no image returned"));
        }
        Ok(output)
    }

    async fn fetch_video_job(&self, id: &str) -> Result<Value, RelayError> {
        let res = self
            .client
            .get(self.url(&format!("videos/{}", id)))
            .header("Authorization", self.bearer())
            .send()
            .await?;
        Ok(check_status(res).await?.json().await?)
    }
}

#[async_trait]
impl ImageProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    async fn edit(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError> {
        if request.images.is_empty() {
            return Err(RelayError::Validation("edit requires at least one image".to_string()));
        }
        let mut form = Form::new()
            .text("model", self.model.clone())
            .text("prompt", request.prompt.clone())
            .text("n", "1")
            .text("size", image_size(request.aspect_ratio.as_deref()));
        for (i, image) in request.images.iter().enumerate() {
            let part = Part::bytes(image.decode()?)
                .file_name(format!("image-{}.{}", i, image.file_extension()))
                .mime_str(&image.mime_type)
                .map_err(|e| RelayError::Validation(format!("unsupported image type: {}", e)))?;
            form = form.part("image[]", part);
        }
        if let Some(mask) = &request.mask {
            let part = Part::bytes(mask.decode()?)
                .file_name(format!("mask.{}", mask.file_extension()))
                .mime_str(&mask.mime_type)
                .map_err(|e| RelayError::Validation(format!("unsupported mask type: {}", e)))?;
            form = form.part("mask", part);
        }

        let res = self
            .client
            .post(self.url("images/edits"))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;
        let parsed: ImagesResponse = check_status(res).await?.json().await?;
        self.collect_images(parsed).await
    }

    async fn generate_from_text(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError> {
        let body = ImageGenerationRequest {
            model: &self.model,
            prompt: &request.prompt,
            n: 1,
            size: image_size(request.aspect_ratio.as_deref()),
        };
        let res = self
            .client
            .post(self.url("images/generations"))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;
        let parsed: ImagesResponse = check_status(res).await?.json().await?;
        self.collect_images(parsed).await
    }

    async fn generate_video(&self, request: &VideoRequest) -> Result<GenerationOutput, RelayError> {
        let body = VideoCreateRequest {
            model: &self.model,
            prompt: &request.prompt,
            size: request.aspect_ratio.as_deref().map(video_size),
        };
        let res = self
            .client
            .post(self.url("videos"))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;
        let job: VideoJob = check_status(res).await?.json().await?;

        let finished = poll_until_complete(self.poll_interval, self.poll_max_wait, || {
            self.fetch_video_job(&job.id)
        })
        .await?;

        // Status-only completions carry no payload; the content endpoint serves it.
        let source = match find_video(&finished) {
            Some(VideoRef::Inline { data, mime_type }) => {
                return Ok(GenerationOutput {
                    artifacts: vec![GeneratedArtifact { data, mime_type }],
                    text: None,
                });
            }
            Some(VideoRef::Remote(url)) => url,
            None => self.url(&format!("videos/{}/content", job.id)),
        };
        let res = self
            .client
            .get(&source)
            .header("Authorization", self.bearer())
            .send()
            .await?;
        let bytes = check_status(res).await?.bytes().await?;
        Ok(GenerationOutput {
            artifacts: vec![GeneratedArtifact::from_bytes(&bytes, "video/mp4")],
            text: None,
        })
    }
}

/// Width / height of an `a:b` ratio string, if it parses.
fn ratio(aspect: &str) -> Option<f64> {
    let (w, h) = aspect.split_once(':')?;
    let (w, h): (f64, f64) = (w.trim().parse().ok()?, h.trim().parse().ok()?);
    (w > 0.0 && h > 0.0).then(|| w / h)
}

/// Map a requested aspect ratio onto the fixed sizes image endpoints accept.
fn image_size(aspect: Option<&str>) -> &'static str {
    match aspect.and_then(ratio) {
        Some(r) if r > 1.1 => "1536x1024",
        Some(r) if r < 0.9 => "1024x1536",
        _ => "1024x1024",
    }
}

fn video_size(aspect: &str) -> &'static str {
    match ratio(aspect) {
        Some(r) if r < 1.0 => "720x1280",
        _ => "1280x720",
    }
}
