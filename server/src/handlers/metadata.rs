use serde::Serialize;
use stream_resolver::{
    EpisodeDescriptor, EpisodeIndex, MediaMetadata, TitleCandidate, TitleResolver,
};

use super::{non_empty, require_provider, ApiError};
use crate::state::State;

#[derive(Debug, Serialize)]
pub struct MediaEpisodes {
    pub media: MediaMetadata,
    #[serde(rename = "match")]
    pub matched: Option<TitleCandidate>,
    pub episodes: Vec<EpisodeDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct MediaSearch {
    pub results: Vec<MediaMetadata>,
}

/// Free-text AniList lookup; needs no provider
pub async fn search(state: &State, query: Option<String>) -> Result<MediaSearch, ApiError> {
    let query =
        non_empty(query).ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;
    let results = state
        .anilist
        .search_media(&query)
        .await
        .map_err(|e| ApiError::upstream("Failed to search anime metadata", e))?;
    Ok(MediaSearch { results })
}

pub async fn media(state: &State, id: u64) -> Result<MediaMetadata, ApiError> {
    state
        .anilist
        .fetch_media(id)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch anime metadata", e))
}

/// Metadata, then the provider entry matching its titles, then its episodes
pub async fn media_episodes(state: &State, id: u64) -> Result<MediaEpisodes, ApiError> {
    let provider = require_provider(state).await?;
    let media = media(state, id).await?;

    let (english, romaji) = media.titles();
    let matched = TitleResolver::new(provider.as_ref())
        .resolve(&english, &romaji)
        .await;

    let episodes = match &matched {
        Some(candidate) => EpisodeIndex::new(provider.as_ref())
            .list_episodes(&candidate.provider_id)
            .await
            .map_err(|e| ApiError::upstream("Failed to fetch anime info", e))?,
        None => {
            log::info!("No streaming match for AniList media {}", id);
            Vec::new()
        }
    };

    Ok(MediaEpisodes {
        media,
        matched,
        episodes,
    })
}
