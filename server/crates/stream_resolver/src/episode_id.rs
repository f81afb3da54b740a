//! Percent codec for provider episode identifiers.
//!
//! Episode ids look like `<anime-session>/<episode-session>`. The slash would
//! be read as a route separator, so the id is percent-encoded when it is put
//! into a path segment and decoded once, right before the provider call.

use crate::ResolverError;

/// Encode an episode id for use as a single URL path segment
pub fn encode(episode_id: &str) -> String {
    urlencoding::encode(episode_id).into_owned()
}

/// Decode a path segment back into the provider's episode id
pub fn decode(segment: &str) -> Result<String, ResolverError> {
    urlencoding::decode(segment)
        .map(|id| id.into_owned())
        .map_err(|e| ResolverError::InvalidEpisodeId(format!("{}: {}", segment, e)))
}

/// The anime part of an episode id (everything before the first `/`)
pub fn anime_id(episode_id: &str) -> &str {
    episode_id
        .split_once('/')
        .map(|(anime, _)| anime)
        .unwrap_or(episode_id)
}
