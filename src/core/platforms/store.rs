use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::{Platform, PlatformInput, RedactedPlatform, derive_platform_id, normalize_base_url};
use crate::core::error::RelayError;
use crate::platform::{NativePlatform, Platform as _};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlatformDocument {
    #[serde(default)]
    platforms: Vec<Platform>,
}

/// Persisted platform list. The whole JSON document is rewritten on every
/// upsert; reads always go to disk so every caller sees the latest list.
pub struct PlatformRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PlatformRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list(&self) -> Result<Vec<Platform>, RelayError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                let doc: PlatformDocument = serde_json::from_slice(&raw)?;
                Ok(doc.platforms)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_redacted(&self) -> Result<Vec<RedactedPlatform>, RelayError> {
        Ok(self.list().await?.iter().map(Platform::redacted).collect())
    }

    /// Replace the stored list with `inputs`. Existing ids keep their stored
    /// credential when the input omits one; new ids must bring their own.
    pub async fn upsert(&self, inputs: Vec<PlatformInput>) -> Result<Vec<RedactedPlatform>, RelayError> {
        let _guard = self.write_lock.lock().await;

        let current: HashMap<String, Platform> = self
            .list()
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let next = merge_platforms(&current, inputs)?;

        self.write(&PlatformDocument {
            platforms: next.clone(),
        })
        .await?;
        info!("Platform registry updated ({} platforms)", next.len());

        Ok(next.iter().map(Platform::redacted).collect())
    }

    async fn write(&self, doc: &PlatformDocument) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        let raw = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&self.path, raw).await?;
        NativePlatform::restrict_file_permissions(&self.path);
        Ok(())
    }
}

fn merge_platforms(
    current: &HashMap<String, Platform>,
    inputs: Vec<PlatformInput>,
) -> Result<Vec<Platform>, RelayError> {
    let mut seen = HashSet::new();
    let mut next = Vec::with_capacity(inputs.len());

    for (index, input) in inputs.into_iter().enumerate() {
        if input.base_url.trim().is_empty() {
            return Err(RelayError::Validation(format!(
                "platforms[{}]: baseUrl is required",
                index
            )));
        }
        if input.model.trim().is_empty() {
            return Err(RelayError::Validation(format!(
                "platforms[{}]: model is required",
                index
            )));
        }
        let base_url = normalize_base_url(&input.base_url);
        if url::Url::parse(&base_url).is_err() {
            return Err(RelayError::Validation(format!(
                "platforms[{}]: baseUrl '{}' is not a valid URL",
                index,
                input.base_url.trim()
            )));
        }
        let model = input.model.trim().to_string();

        let existing = input
            .id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| current.get(id));
        let provider = input
            .provider
            .or(existing.map(|p| p.provider))
            .unwrap_or_default();
        let id = match input.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => derive_platform_id(provider, index + 1, &base_url, &model),
        };
        if !seen.insert(id.clone()) {
            return Err(RelayError::Validation(format!(
                "platforms[{}]: duplicate platform id {}",
                index, id
            )));
        }

        let supplied = input
            .credential
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        let credential = match (supplied, current.get(&id)) {
            (Some(c), _) => c,
            (None, Some(prev)) => prev.credential.clone(),
            (None, None) => {
                return Err(RelayError::Validation(format!(
                    "platform {}: credential is required for new platforms",
                    id
                )));
            }
        };

        next.push(Platform {
            id,
            provider,
            base_url,
            model,
            credential,
        });
    }

    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderKind;

    fn input(id: Option<&str>, base_url: &str, model: &str, credential: Option<&str>) -> PlatformInput {
        PlatformInput {
            id: id.map(str::to_string),
            provider: None,
            base_url: base_url.to_string(),
            model: model.to_string(),
            credential: credential.map(str::to_string),
        }
    }

    fn registry() -> (tempfile::TempDir, PlatformRegistry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = PlatformRegistry::new(dir.path().join("nested").join("platforms.json"));
        (dir, registry)
    }

    #[tokio::test]
    async fn missing_document_lists_empty() {
        let (_dir, registry) = registry();
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_creates_parent_dir_and_persists() {
        let (_dir, registry) = registry();
        let saved = registry
            .upsert(vec![input(None, "https://a.example//", "img-1", Some("key-aaaaaaaaaa"))])
            .await
            .expect("upsert should succeed");
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].base_url, "https://a.example/");
        assert_eq!(saved[0].provider, ProviderKind::Gemini);

        let stored = registry.list().await.unwrap();
        assert_eq!(stored[0].credential, "key-aaaaaaaaaa");
        assert_eq!(stored[0].id, saved[0].id);
    }

    #[tokio::test]
    async fn existing_id_without_credential_keeps_previous_one() {
        let (_dir, registry) = registry();
        let first = registry
            .upsert(vec![input(None, "https://a.example", "img-1", Some("original-secret"))])
            .await
            .unwrap();
        let id = first[0].id.clone();

        registry
            .upsert(vec![input(Some(&id), "https://a.example", "img-2", Some(""))])
            .await
            .expect("existing platform may omit its credential");

        let stored = registry.list().await.unwrap();
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].model, "img-2");
        assert_eq!(stored[0].credential, "original-secret");
    }

    #[tokio::test]
    async fn new_id_without_credential_is_rejected_by_name() {
        let (_dir, registry) = registry();
        let err = registry
            .upsert(vec![input(Some("mirror-7"), "https://b.example", "img-1", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
        assert!(err.to_string().contains("mirror-7"));
        assert!(registry.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_fields_name_the_offending_index() {
        let (_dir, registry) = registry();
        let err = registry
            .upsert(vec![
                input(None, "https://a.example", "img-1", Some("k1234567890")),
                input(None, "https://b.example", "  ", Some("k1234567890")),
            ])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "platforms[1]: model is required");

        let err = registry
            .upsert(vec![input(None, "", "img-1", Some("k1234567890"))])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "platforms[0]: baseUrl is required");
    }

    #[tokio::test]
    async fn list_redacted_masks_credentials() {
        let (_dir, registry) = registry();
        registry
            .upsert(vec![input(None, "https://a.example", "img-1", Some("sk-0123456789xyz"))])
            .await
            .unwrap();
        let redacted = registry.list_redacted().await.unwrap();
        assert_eq!(redacted[0].credential_preview, "sk-0****9xyz");
    }
}
