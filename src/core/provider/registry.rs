use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use super::{GeminiProvider, ImageProvider, OpenAiProvider, ProviderKind};
use crate::core::error::RelayError;
use crate::core::platforms::Platform;

pub type ProviderFactory = Arc<dyn Fn(&Platform) -> Arc<dyn ImageProvider> + Send + Sync>;

const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// How long a provider keeps polling a video job before giving up.
pub const VIDEO_POLL_MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// Explicit provider-id → constructor table.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderKind, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Both HTTP implementations, sharing one connection pool.
    pub fn with_defaults(http: reqwest::Client) -> Self {
        let gemini_http = http.clone();
        Self::empty()
            .register(
                ProviderKind::Gemini,
                Arc::new(move |platform: &Platform| {
                    Arc::new(GeminiProvider::new(
                        platform,
                        gemini_http.clone(),
                        VIDEO_POLL_INTERVAL,
                        VIDEO_POLL_MAX_WAIT,
                    )) as Arc<dyn ImageProvider>
                }),
            )
            .register(
                ProviderKind::OpenAi,
                Arc::new(move |platform: &Platform| {
                    Arc::new(OpenAiProvider::new(
                        platform,
                        http.clone(),
                        VIDEO_POLL_INTERVAL,
                        VIDEO_POLL_MAX_WAIT,
                    )) as Arc<dyn ImageProvider>
                }),
            )
    }

    pub fn register(mut self, kind: ProviderKind, factory: ProviderFactory) -> Self {
        info!("Registered provider: {}", kind.as_str());
        self.factories.insert(kind, factory);
        self
    }

    pub fn build(&self, platform: &Platform) -> Result<Arc<dyn ImageProvider>, RelayError> {
        let factory = self.factories.get(&platform.provider).ok_or_else(|| {
            RelayError::Configuration(format!(
                "no provider registered for '{}' (platform {})",
                platform.provider.as_str(),
                platform.id
            ))
        })?;
        Ok(factory(platform))
    }
}

/// Platform-id → client cache, scoped to one relay instance.
pub struct ClientPool {
    registry: ProviderRegistry,
    clients: Mutex<HashMap<String, Arc<dyn ImageProvider>>>,
}

impl ClientPool {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached client for `platform.id`, constructing it on first use.
    pub fn client_for(&self, platform: &Platform) -> Result<Arc<dyn ImageProvider>, RelayError> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(&platform.id) {
            return Ok(client.clone());
        }
        let client = self.registry.build(platform)?;
        debug!(
            "Constructed {} client for platform {}",
            client.kind().as_str(),
            platform.id
        );
        clients.insert(platform.id.clone(), client.clone());
        Ok(client)
    }

    /// Drop every cached client; the next call rebuilds from current platform data.
    pub fn clear(&self) {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.clients.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::{GenerationOutput, ImageRequest, VideoRequest};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Dummy;

    #[async_trait]
    impl ImageProvider for Dummy {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Gemini
        }
        async fn edit(&self, _: &ImageRequest) -> Result<GenerationOutput, RelayError> {
            Ok(GenerationOutput::default())
        }
        async fn generate_from_text(&self, _: &ImageRequest) -> Result<GenerationOutput, RelayError> {
            Ok(GenerationOutput::default())
        }
        async fn generate_video(&self, _: &VideoRequest) -> Result<GenerationOutput, RelayError> {
            Ok(GenerationOutput::default())
        }
    }

    fn platform(id: &str, provider: ProviderKind) -> Platform {
        Platform {
            id: id.to_string(),
            provider,
            base_url: "https://x.example/".to_string(),
            model: "m".to_string(),
            credential: "k".to_string(),
        }
    }

    #[test]
    fn clients_are_built_once_per_platform_id() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        let registry = ProviderRegistry::empty().register(
            ProviderKind::Gemini,
            Arc::new(move |_: &Platform| {
                counter.fetch_add(1, Ordering::SeqCst);
                Arc::new(Dummy) as Arc<dyn ImageProvider>
            }),
        );
        let pool = ClientPool::new(registry);

        pool.client_for(&platform("a", ProviderKind::Gemini)).unwrap();
        pool.client_for(&platform("a", ProviderKind::Gemini)).unwrap();
        pool.client_for(&platform("b", ProviderKind::Gemini)).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 2);

        pool.clear();
        pool.client_for(&platform("a", ProviderKind::Gemini)).unwrap();
        assert_eq!(built.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unregistered_provider_is_a_configuration_error() {
        let pool = ClientPool::new(ProviderRegistry::empty());
        let err = pool
            .client_for(&platform("a", ProviderKind::OpenAi))
            .err()
            .expect("nothing is registered");
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn default_registry_knows_both_wire_formats() {
        let registry = ProviderRegistry::with_defaults(reqwest::Client::new());
        let gemini = registry.build(&platform("g", ProviderKind::Gemini)).unwrap();
        let openai = registry.build(&platform("o", ProviderKind::OpenAi)).unwrap();
        assert_eq!(gemini.kind(), ProviderKind::Gemini);
        assert_eq!(openai.kind(), ProviderKind::OpenAi);
    }
}
