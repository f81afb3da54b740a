use std::sync::Arc;

use stream_resolver::{AniListClient, ProviderType, ResolverError};
use thiserror::Error;

use crate::config::Config;
use crate::provider_cell::{ProviderCell, ProviderConnector};
use crate::relay::{RelayClient, RelayError};

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Provider setup failed: {0}")]
    Provider(#[from] ResolverError),
    #[error("Relay setup failed: {0}")]
    Relay(#[from] RelayError),
}

#[derive(Clone)]
pub struct State {
    pub config: Arc<Config>,
    pub provider_type: ProviderType,
    pub provider: Arc<ProviderCell>,
    pub relay: Arc<RelayClient>,
    pub anilist: Arc<AniListClient>,
}

impl State {
    /// Everything but the provider, which comes up later through [`ProviderCell`]
    pub fn new(config: Config) -> Result<Self, StateError> {
        let provider_type = config.provider.parse::<ProviderType>()?;
        let relay = RelayClient::new(&config)?;
        let anilist = AniListClient::new(&config.anilist_endpoint, config.request_timeout())?;
        Ok(Self {
            provider_type,
            provider: Arc::new(ProviderCell::new()),
            relay: Arc::new(relay),
            anilist: Arc::new(anilist),
            config: Arc::new(config),
        })
    }

    pub fn provider_connector(&self) -> ProviderConnector {
        ProviderConnector {
            provider_type: self.provider_type,
            settings: self.config.provider_settings(),
        }
    }
}
