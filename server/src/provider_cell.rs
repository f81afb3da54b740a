use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stream_resolver::{
    create_provider, ProviderSettings, ProviderType, ResolverError, StreamingProvider,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub enum ProviderState {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn StreamingProvider>),
    /// Last attempt failed, another one is scheduled
    Failed(String),
}

impl ProviderState {
    pub fn label(&self) -> &'static str {
        match self {
            ProviderState::Uninitialized => "uninitialized",
            ProviderState::Initializing => "initializing",
            ProviderState::Ready(_) => "ready",
            ProviderState::Failed(_) => "failed",
        }
    }
}

#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn StreamingProvider>, ResolverError>;
}

/// Builds the configured provider, probing its mirrors
pub struct ProviderConnector {
    pub provider_type: ProviderType,
    pub settings: ProviderSettings,
}

#[async_trait]
impl ProviderFactory for ProviderConnector {
    async fn create(&self) -> Result<Arc<dyn StreamingProvider>, ResolverError> {
        create_provider(self.provider_type, &self.settings).await
    }
}

/// Process-wide provider handle.
///
/// Handlers only ever call [`ProviderCell::try_get`]; a `None` means the
/// provider is still coming up and the request should be answered with 503.
pub struct ProviderCell {
    state: RwLock<ProviderState>,
}

impl Default for ProviderCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderCell {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ProviderState::Uninitialized),
        }
    }

    pub async fn try_get(&self) -> Option<Arc<dyn StreamingProvider>> {
        match &*self.state.read().await {
            ProviderState::Ready(provider) => Some(provider.clone()),
            _ => None,
        }
    }

    pub async fn state_label(&self) -> &'static str {
        self.state.read().await.label()
    }

    /// Why the last initialization attempt failed, while no provider is up
    pub async fn last_error(&self) -> Option<String> {
        match &*self.state.read().await {
            ProviderState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub async fn set_ready(&self, provider: Arc<dyn StreamingProvider>) {
        *self.state.write().await = ProviderState::Ready(provider);
    }

    async fn set_state(&self, state: ProviderState) {
        *self.state.write().await = state;
    }

    /// Retry `factory` every `retry_delay` until it yields a provider
    pub async fn initialize(&self, factory: &dyn ProviderFactory, retry_delay: Duration) {
        let mut attempt = 1u32;
        loop {
            if self.try_get().await.is_some() {
                return;
            }

            self.set_state(ProviderState::Initializing).await;
            log::info!("Initializing streaming provider (attempt {})", attempt);
            match factory.create().await {
                Ok(provider) => {
                    log::info!("Streaming provider {} is ready", provider.name());
                    self.set_ready(provider).await;
                    return;
                }
                Err(e) => {
                    log::error!(
                        "Failed to initialize streaming provider: {}, retrying in {:?}",
                        e,
                        retry_delay
                    );
                    self.set_state(ProviderState::Failed(e.to_string())).await;
                }
            }

            tokio::time::sleep(retry_delay).await;
            attempt += 1;
        }
    }

    pub fn spawn_init(
        self: &Arc<Self>,
        factory: Arc<dyn ProviderFactory>,
        retry_delay: Duration,
    ) -> JoinHandle<()> {
        let cell = self.clone();
        tokio::spawn(async move {
            cell.initialize(factory.as_ref(), retry_delay).await;
        })
    }
}
