use serde::Serialize;
use stream_resolver::{
    episode_id, AnimeInfo, EpisodeIndex, EpisodeSources, PlaybackPlan, ResolverError,
    SearchResults, SourceResolver, TitleCandidate, TitleResolver,
};

use super::{non_empty, require_provider, ApiError};
use crate::state::State;

pub const RELAY_ROUTE: &str = "/api/proxy";

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub provider: &'static str,
    pub ready: bool,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health(state: &State) -> Health {
    let label = state.provider.state_label().await;
    Health {
        status: "ok",
        provider: state.provider_type.display_name(),
        ready: label == "ready",
        state: label,
        error: state.provider.last_error().await,
    }
}

pub async fn search(state: &State, query: Option<String>) -> Result<SearchResults, ApiError> {
    let query =
        non_empty(query).ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;
    let provider = require_provider(state).await?;
    log::debug!("Searching {} for \"{}\"", provider.name(), query);
    provider
        .search(&query)
        .await
        .map_err(|e| ApiError::upstream("Failed to search anime", e))
}

pub async fn anime_info(state: &State, id: &str) -> Result<AnimeInfo, ApiError> {
    let provider = require_provider(state).await?;
    EpisodeIndex::new(provider.as_ref())
        .fetch(id)
        .await
        .map_err(|e| ApiError::upstream("Failed to fetch anime info", e))
}

/// `encoded_id` is the raw path segment, decoded exactly once downstream
pub async fn watch(state: &State, encoded_id: &str) -> Result<EpisodeSources, ApiError> {
    let provider = require_provider(state).await?;
    SourceResolver::new(provider.as_ref())
        .resolve(encoded_id)
        .await
        .map_err(|e| match e {
            ResolverError::InvalidEpisodeId(_) => ApiError::bad_request("Invalid episode id"),
            e => ApiError::upstream("Failed to fetch streaming links", e),
        })
}

/// Never fails once the provider is up: no usable source means the iframe plan
pub async fn play(state: &State, encoded_id: &str) -> Result<PlaybackPlan, ApiError> {
    let provider = require_provider(state).await?;
    let embed_id = episode_id::decode(encoded_id).unwrap_or_else(|_| encoded_id.to_string());
    let embed_url = provider.embed_url(&embed_id);

    let outcome = SourceResolver::new(provider.as_ref())
        .resolve_sources(encoded_id)
        .await;
    let plan = PlaybackPlan::from_outcome(outcome, &embed_url, RELAY_ROUTE);
    if plan.is_iframe() {
        log::info!("No relayable source for {}, using iframe", embed_id);
    }
    Ok(plan)
}

pub async fn match_title(
    state: &State,
    english: Option<String>,
    romaji: Option<String>,
) -> Result<Option<TitleCandidate>, ApiError> {
    let english = non_empty(english).unwrap_or_default();
    let romaji = non_empty(romaji).unwrap_or_default();
    if english.is_empty() && romaji.is_empty() {
        return Err(ApiError::bad_request(
            "Query parameter \"english\" or \"romaji\" is required",
        ));
    }
    let provider = require_provider(state).await?;
    Ok(TitleResolver::new(provider.as_ref())
        .resolve(&english, &romaji)
        .await)
}
