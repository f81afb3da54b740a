use crate::{AnimeInfo, EpisodeDescriptor, ResolverError, StreamingProvider};

/// Fetches the ordered episode list of a matched provider entry.
///
/// Every call goes back to the provider; there is no paging or resume. An
/// empty list is a valid answer meaning "not available for streaming".
pub struct EpisodeIndex<'a> {
    provider: &'a dyn StreamingProvider,
}

impl<'a> EpisodeIndex<'a> {
    pub fn new(provider: &'a dyn StreamingProvider) -> Self {
        Self { provider }
    }

    /// Full anime info, episodes included
    pub async fn fetch(&self, provider_id: &str) -> Result<AnimeInfo, ResolverError> {
        let mut info = self.provider.fetch_anime_info(provider_id).await?;
        // ordinal position is the canonical numbering
        for (index, episode) in info.episodes.iter_mut().enumerate() {
            episode.number = index as u32 + 1;
        }
        if info.episodes.is_empty() {
            log::info!(
                "{} has no episodes for {}",
                self.provider.name(),
                provider_id
            );
        }
        Ok(info)
    }

    pub async fn list_episodes(
        &self,
        provider_id: &str,
    ) -> Result<Vec<EpisodeDescriptor>, ResolverError> {
        Ok(self.fetch(provider_id).await?.episodes)
    }
}
