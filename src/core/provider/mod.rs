mod gemini;
mod media;
mod openai;
mod polling;
mod registry;

pub use gemini::GeminiProvider;
pub use media::{GeneratedArtifact, InlineImage};
pub use openai::OpenAiProvider;
pub use registry::{ClientPool, ProviderRegistry, VIDEO_POLL_MAX_WAIT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::error::RelayError;

/// Wire format family an upstream platform speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenAi,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeTier {
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl SizeTier {
    pub fn as_str(self) -> &'static str {
        match self {
            SizeTier::OneK => "1K",
            SizeTier::TwoK => "2K",
            SizeTier::FourK => "4K",
        }
    }
}

/// Number of results a caller wants, always within `1..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DesiredCount(u8);

impl DesiredCount {
    pub const MAX: u8 = 4;

    pub fn clamped(requested: i64) -> Self {
        Self(requested.clamp(1, Self::MAX as i64) as u8)
    }

    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl Default for DesiredCount {
    fn default() -> Self {
        Self(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    EditImage,
    GenerateImage,
    GenerateVideo,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::EditImage => "edit-image",
            OperationKind::GenerateImage => "generate-image",
            OperationKind::GenerateVideo => "generate-video",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    pub prompt: String,
    pub images: Vec<InlineImage>,
    pub mask: Option<InlineImage>,
    pub aspect_ratio: Option<String>,
    pub size_tier: Option<SizeTier>,
    pub count: DesiredCount,
}

#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
    pub aspect_ratio: Option<String>,
}

#[derive(Debug, Clone)]
pub enum OperationRequest {
    EditImage(ImageRequest),
    GenerateImage(ImageRequest),
    GenerateVideo(VideoRequest),
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::EditImage(_) => OperationKind::EditImage,
            OperationRequest::GenerateImage(_) => OperationKind::GenerateImage,
            OperationRequest::GenerateVideo(_) => OperationKind::GenerateVideo,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            OperationRequest::EditImage(r) | OperationRequest::GenerateImage(r) => &r.prompt,
            OperationRequest::GenerateVideo(r) => &r.prompt,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationOutput {
    pub artifacts: Vec<GeneratedArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// One capability surface over every provider. Each call is a single fresh
/// upstream operation bound to the platform the client was built for.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn edit(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError>;

    async fn generate_from_text(&self, request: &ImageRequest) -> Result<GenerationOutput, RelayError>;

    async fn generate_video(&self, request: &VideoRequest) -> Result<GenerationOutput, RelayError>;
}

/// `base` + `version/` + `rest`, unless `base` already ends in that version segment.
fn versioned_url(base: &str, version: &str, rest: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with(&format!("/{}", version)) {
        format!("{}/{}", trimmed, rest)
    } else {
        format!("{}/{}/{}", trimmed, version, rest)
    }
}

/// Cap error bodies so an HTML error page does not flood the aggregate message.
fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    let body = body.trim();
    if body.chars().count() <= LIMIT {
        body.to_string()
    } else {
        let head: String = body.chars().take(LIMIT).collect();
        format!("{}...", head)
    }
}

async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, RelayError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(RelayError::upstream(format!(
        "HTTP {}: {}",
        status.as_u16(),
        truncate_body(&body)
    )))
}
