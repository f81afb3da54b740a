use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::ResolverError;

const MEDIA_FIELDS: &str = r#"
  id
  idMal
  title { romaji english native }
  format
  status
  description
  seasonYear
  episodes
  averageScore
  popularity
  genres
  coverImage { large }
  bannerImage
  studios(isMain: true) { nodes { id name } }
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Studio {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StudioConnection {
    #[serde(default)]
    pub nodes: Vec<Studio>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CoverImage {
    pub large: Option<String>,
}

/// Anime metadata as served by AniList
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub id: u64,
    pub id_mal: Option<u64>,
    #[serde(default)]
    pub title: MediaTitle,
    pub format: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub season_year: Option<u32>,
    pub episodes: Option<u32>,
    pub average_score: Option<u32>,
    pub popularity: Option<u64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cover_image: CoverImage,
    pub banner_image: Option<String>,
    #[serde(default)]
    pub studios: StudioConnection,
}

impl MediaMetadata {
    /// `(english, romaji)` for the title resolver; missing titles are empty
    pub fn titles(&self) -> (String, String) {
        (
            self.title.english.clone().unwrap_or_default(),
            self.title.romaji.clone().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlErrorItem>,
}

#[derive(Debug, Deserialize)]
struct GraphQlErrorItem {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MediaData {
    #[serde(rename = "Media")]
    media: Option<MediaMetadata>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "Page")]
    page: MediaPage,
}

#[derive(Debug, Deserialize)]
struct MediaPage {
    #[serde(default)]
    media: Vec<MediaMetadata>,
}

/// Client for the AniList GraphQL endpoint
pub struct AniListClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AniListClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ResolverError::Network)?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn fetch_media(&self, id: u64) -> Result<MediaMetadata, ResolverError> {
        let query = format!(
            "query ($id: Int) {{ Media (id: $id, type: ANIME) {{ {} }} }}",
            MEDIA_FIELDS
        );
        let data: MediaData = self.query(&query, json!({ "id": id })).await?;
        data.media
            .ok_or_else(|| ResolverError::GraphQl(format!("media {} not found", id)))
    }

    pub async fn search_media(&self, text: &str) -> Result<Vec<MediaMetadata>, ResolverError> {
        let query = format!(
            "query ($search: String) {{ Page (page: 1, perPage: 10) {{ media (search: $search, type: ANIME, sort: SEARCH_MATCH) {{ {} }} }} }}",
            MEDIA_FIELDS
        );
        let data: PageData = self.query(&query, json!({ "search": text })).await?;
        Ok(data.page.media)
    }

    async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ResolverError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        parse_graphql(&self.endpoint, status, &body)
    }
}

fn parse_graphql<T: DeserializeOwned>(
    endpoint: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> Result<T, ResolverError> {
    // AniList reports "not found" as a 404 with a GraphQL error body
    let parsed = serde_json::from_str::<GraphQlResponse<T>>(body);
    if let Ok(GraphQlResponse { errors, .. }) = &parsed {
        if let Some(first) = errors.first() {
            log::error!("AniList GraphQL errors: {:?}", errors);
            return Err(ResolverError::GraphQl(first.message.clone()));
        }
    }
    if !status.is_success() {
        return Err(ResolverError::Status {
            url: endpoint.to_string(),
            status,
        });
    }
    parsed
        .map_err(|e| ResolverError::Parse(format!("AniList response: {}", e)))?
        .data
        .ok_or_else(|| ResolverError::GraphQl("response without data".to_string()))
}
