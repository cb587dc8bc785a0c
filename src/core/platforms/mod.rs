mod store;

pub use store::PlatformRegistry;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::provider::ProviderKind;

/// One concrete upstream endpoint + model + credential. This is the unit the
/// failover runner rotates over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Platform {
    pub id: String,
    #[serde(default)]
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub credential: String,
}

impl Platform {
    pub fn redacted(&self) -> RedactedPlatform {
        RedactedPlatform {
            id: self.id.clone(),
            provider: self.provider,
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            credential_preview: mask_credential(&self.credential),
            has_credential: !self.credential.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedPlatform {
    pub id: String,
    pub provider: ProviderKind,
    pub base_url: String,
    pub model: String,
    pub credential_preview: String,
    pub has_credential: bool,
}

/// A platform as submitted by the admin surface. `id` and `credential` may be
/// omitted for platforms that already exist.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub credential: Option<String>,
}

/// `first4****last4`, or `********` for short secrets.
pub fn mask_credential(credential: &str) -> String {
    let chars: Vec<char> = credential.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Trim whitespace and collapse any trailing slashes into exactly one.
pub fn normalize_base_url(raw: &str) -> String {
    format!("{}/", raw.trim().trim_end_matches('/'))
}

/// Stable platform id: `<provider>-<ordinal>-<8 hex of sha256(baseUrl|model)>`.
pub fn derive_platform_id(provider: ProviderKind, ordinal: usize, base_url: &str, model: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base_url.as_bytes());
    hasher.update(b"|");
    hasher.update(model.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}-{}-{}", provider.as_str(), ordinal, &digest[..8])
}
