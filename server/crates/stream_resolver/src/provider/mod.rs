pub mod animepahe;
pub mod kwik;

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{AnimeInfo, EpisodeSources, ResolverError, SearchResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderType {
    AnimePahe,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::AnimePahe => "animepahe",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderType::AnimePahe => "AnimePahe",
        }
    }
}

impl FromStr for ProviderType {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "animepahe" => Ok(ProviderType::AnimePahe),
            other => Err(ResolverError::Initialization(format!(
                "unknown provider: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Settings shared by every provider implementation
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Candidate base URLs, probed in order until one answers
    pub mirrors: Vec<String>,
    pub timeout: Duration,
    pub user_agent: String,
    /// Prefix of the provider's own player page, used for iframe playback
    pub embed_base_url: String,
}

/// Adapter over a streaming-source site.
///
/// This is the only surface the resolvers and the HTTP layer see; every
/// site-specific detail lives behind it.
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Search titles. Zero hits is a successful, empty result.
    async fn search(&self, query: &str) -> Result<SearchResults, ResolverError>;

    /// Anime details with the complete, ordered episode list
    async fn fetch_anime_info(&self, id: &str) -> Result<AnimeInfo, ResolverError>;

    /// Candidate media sources for an already-decoded episode id
    async fn fetch_episode_sources(&self, episode_id: &str)
        -> Result<EpisodeSources, ResolverError>;

    /// The provider's own player page for an episode
    fn embed_url(&self, episode_id: &str) -> String;
}

pub async fn create_provider(
    provider_type: ProviderType,
    settings: &ProviderSettings,
) -> Result<Arc<dyn StreamingProvider>, ResolverError> {
    match provider_type {
        ProviderType::AnimePahe => Ok(Arc::new(
            animepahe::AnimePaheProvider::connect(settings).await?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_type_parse() {
        assert_eq!(
            "AnimePahe".parse::<ProviderType>().unwrap(),
            ProviderType::AnimePahe
        );
        assert_eq!(ProviderType::AnimePahe.as_str(), "animepahe");
        assert!("gogoanime".parse::<ProviderType>().is_err());
    }
}
