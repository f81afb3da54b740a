use serde::{Deserialize, Serialize};

use crate::{episode_id, EpisodeSources, ResolverError, StreamSource, StreamingProvider};

/// Resolves the candidate media sources of one episode.
///
/// Ids arrive percent-encoded, as they travel in a URL path segment, and are
/// decoded exactly once here before the provider sees them. The list comes
/// back unfiltered, in provider order; choosing one is up to the caller
/// (see [`select_preferred`] and [`PlaybackPlan`]).
pub struct SourceResolver<'a> {
    provider: &'a dyn StreamingProvider,
}

impl<'a> SourceResolver<'a> {
    pub fn new(provider: &'a dyn StreamingProvider) -> Self {
        Self { provider }
    }

    pub async fn resolve(&self, encoded_id: &str) -> Result<EpisodeSources, ResolverError> {
        let episode_id = episode_id::decode(encoded_id)?;
        self.resolve_decoded(&episode_id).await
    }

    pub async fn resolve_sources(
        &self,
        encoded_id: &str,
    ) -> Result<Vec<StreamSource>, ResolverError> {
        Ok(self.resolve(encoded_id).await?.sources)
    }

    /// For callers that already hold the decoded id
    pub async fn resolve_decoded(
        &self,
        episode_id: &str,
    ) -> Result<EpisodeSources, ResolverError> {
        let sources = self.provider.fetch_episode_sources(episode_id).await?;
        log::debug!(
            "{} returned {} sources for {}",
            self.provider.name(),
            sources.sources.len(),
            episode_id
        );
        Ok(sources)
    }
}

/// Prefer a 1080 label, then 720, then whatever comes first
pub fn select_preferred(sources: &[StreamSource]) -> Option<&StreamSource> {
    sources
        .iter()
        .find(|s| s.quality.contains("1080"))
        .or_else(|| sources.iter().find(|s| s.quality.contains("720")))
        .or_else(|| sources.first())
}

/// How the player should play an episode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PlaybackPlan {
    /// Native HLS playback through the same-origin relay
    Hls {
        url: String,
        quality: String,
        upstream: String,
    },
    /// The provider's own player page
    Iframe { url: String },
}

impl PlaybackPlan {
    /// `relay_base` is the relay route, e.g. `/api/proxy`
    pub fn choose(sources: &[StreamSource], embed_url: &str, relay_base: &str) -> Self {
        match select_preferred(sources) {
            Some(source) => PlaybackPlan::Hls {
                url: format!(
                    "{}?url={}",
                    relay_base,
                    urlencoding::encode(&source.url)
                ),
                quality: source.quality.clone(),
                upstream: source.url.clone(),
            },
            None => PlaybackPlan::Iframe {
                url: embed_url.to_string(),
            },
        }
    }

    /// Same as [`PlaybackPlan::choose`], with a failed lookup degrading to the iframe
    pub fn from_outcome(
        outcome: Result<Vec<StreamSource>, ResolverError>,
        embed_url: &str,
        relay_base: &str,
    ) -> Self {
        match outcome {
            Ok(sources) => Self::choose(&sources, embed_url, relay_base),
            Err(e) => {
                log::warn!("Source lookup failed, falling back to iframe: {}", e);
                PlaybackPlan::Iframe {
                    url: embed_url.to_string(),
                }
            }
        }
    }

    pub fn is_iframe(&self) -> bool {
        matches!(self, PlaybackPlan::Iframe { .. })
    }
}
