use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::tts::{BoxedBackend, MarkupEnhancer, ProviderKind, create_backend};

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// One instance per configured synthesis backend
    backends: HashMap<ProviderKind, BoxedBackend>,
    /// Text-enhancement client, present when an enhancement URL is configured
    enhancer: Option<Arc<MarkupEnhancer>>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let mut backends = HashMap::new();
        for kind in [ProviderKind::Charalign, ProviderKind::Wordmark] {
            match create_backend(kind, &config) {
                Ok(backend) => {
                    backends.insert(kind, backend);
                }
                Err(e) => {
                    tracing::warn!("Backend '{kind}' not available: {e}");
                }
            }
        }

        let enhancer = config.enhancement_url.as_ref().and_then(|url| {
            match MarkupEnhancer::new(url.clone()) {
                Ok(enhancer) => Some(Arc::new(enhancer)),
                Err(e) => {
                    tracing::warn!("Enhancement service unavailable: {e}");
                    None
                }
            }
        });

        Arc::new(Self {
            config,
            backends,
            enhancer,
        })
    }

    /// State with injected backends; tests register mocks here
    pub fn with_backends(
        config: ServerConfig,
        backends: HashMap<ProviderKind, BoxedBackend>,
        enhancer: Option<Arc<MarkupEnhancer>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            backends,
            enhancer,
        })
    }

    pub fn backend(&self, kind: ProviderKind) -> Option<BoxedBackend> {
        self.backends.get(&kind).cloned()
    }

    /// Names of the backends that were successfully constructed
    pub fn configured_providers(&self) -> Vec<&'static str> {
        let mut providers: Vec<&'static str> =
            self.backends.keys().map(ProviderKind::as_str).collect();
        providers.sort_unstable();
        providers
    }

    pub fn enhancer(&self) -> Option<Arc<MarkupEnhancer>> {
        self.enhancer.clone()
    }

    /// Backend kind for a request, falling back to the configured default
    pub fn select_provider(&self, requested: Option<ProviderKind>) -> ProviderKind {
        requested.unwrap_or_else(|| {
            self.config
                .default_provider
                .parse()
                .unwrap_or(ProviderKind::Charalign)
        })
    }
}
