use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One hit of a provider title search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Provider identifier, fed to `fetch_anime_info`
    pub id: String,
    pub title: String,
    pub image: Option<String>,
    pub rating: Option<f64>,
    pub release_date: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub episodes: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
}

/// A title match on the streaming provider. Only lives for one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TitleCandidate {
    pub display_title: String,
    pub provider_id: String,
}

impl From<&SearchHit> for TitleCandidate {
    fn from(hit: &SearchHit) -> Self {
        Self {
            display_title: hit.title.clone(),
            provider_id: hit.id.clone(),
        }
    }
}

/// Episode entry as listed by the provider.
///
/// `id` is opaque and may contain `/`; it must travel percent-encoded
/// whenever it is placed in a URL path segment (see [`crate::episode_id`]).
/// `number` is the 1-based position in the provider listing, which is the
/// canonical ordering regardless of what the provider numbers the episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeDescriptor {
    pub id: String,
    pub number: u32,
    pub title: Option<String>,
    pub provider_number: Option<f64>,
    pub image: Option<String>,
    pub duration: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnimeInfo {
    pub id: String,
    pub title: String,
    pub image: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
    pub status: Option<String>,
    pub episodes: Vec<EpisodeDescriptor>,
}

/// Candidate media source. Quality labels are free text and not unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamSource {
    pub url: String,
    pub quality: String,
    pub is_m3u8: bool,
    pub is_dub: bool,
}

impl StreamSource {
    pub fn new(url: impl Into<String>, quality: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            is_m3u8: url.contains(".m3u8"),
            url,
            quality: quality.into(),
            is_dub: false,
        }
    }

    pub fn with_dub(mut self, is_dub: bool) -> Self {
        self.is_dub = is_dub;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadLink {
    pub url: String,
    pub quality: String,
}

/// Everything the provider returns for one episode
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EpisodeSources {
    /// Headers the media host expects (e.g. `Referer`)
    pub headers: HashMap<String, String>,
    pub sources: Vec<StreamSource>,
    pub download: Vec<DownloadLink>,
}
