use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::core::error::RelayError;

const DEFAULT_IMAGE_MIME: &str = "image/png";

/// A reference image or mask sent upstream, kept base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Accepts `data:<mime>;base64,<payload>` or a bare base64 payload.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let raw = raw.trim();
        let (mime_type, data) = match raw.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    RelayError::Validation("malformed data URL: missing ','".to_string())
                })?;
                let mime = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| RelayError::Validation("data URL must be base64-encoded".to_string()))?;
                let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };
                (mime.to_string(), payload.to_string())
            }
            None => (DEFAULT_IMAGE_MIME.to_string(), raw.to_string()),
        };
        if data.is_empty() {
            return Err(RelayError::Validation("image payload is empty".to_string()));
        }
        if STANDARD.decode(data.as_bytes()).is_err() {
            return Err(RelayError::Validation("image payload is not valid base64".to_string()));
        }
        Ok(Self { mime_type, data })
    }

    pub fn decode(&self) -> Result<Vec<u8>, RelayError> {
        STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| RelayError::Validation(format!("image payload is not valid base64: {}", e)))
    }

    pub fn file_extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

/// One generated image or video, base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArtifact {
    pub data: String,
    pub mime_type: String,
}

impl GeneratedArtifact {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "video/mp4" => "mp4",
        _ => "png",
    }
}
