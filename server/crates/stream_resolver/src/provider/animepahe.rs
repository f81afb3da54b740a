use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE, REFERER};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::kwik;
use crate::{
    episode_id, AnimeInfo, DownloadLink, EpisodeDescriptor, EpisodeSources, ProviderSettings,
    ResolverError, SearchHit, SearchResults, StreamSource, StreamingProvider,
};

pub struct AnimePaheProvider {
    client: reqwest::Client,
    base_url: String,
    embed_base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Option<Vec<SearchItem>>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    session: String,
    title: String,
    poster: Option<String>,
    score: Option<f64>,
    year: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
    episodes: Option<u32>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleasePage {
    last_page: Option<u32>,
    #[serde(default)]
    data: Option<Vec<ReleaseItem>>,
}

#[derive(Debug, Deserialize)]
struct ReleaseItem {
    session: String,
    episode: Option<f64>,
    title: Option<String>,
    snapshot: Option<String>,
    duration: Option<String>,
}

/// A `div#resolutionMenu > button` entry on the play page
#[derive(Debug, PartialEq)]
struct EmbedButton {
    embed_url: String,
    quality: String,
    audio: Option<String>,
}

impl AnimePaheProvider {
    /// Build the HTTP client and settle on the first mirror that answers
    pub async fn connect(settings: &ProviderSettings) -> Result<Self, ResolverError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(ResolverError::Network)?;

        for mirror in &settings.mirrors {
            let mirror = mirror.trim_end_matches('/');
            log::debug!("Probing AnimePahe mirror {}", mirror);
            match client.get(mirror).send().await {
                Ok(response) if !response.status().is_server_error() => {
                    log::info!("Using AnimePahe mirror {}", mirror);
                    return Ok(Self::with_client(client, mirror, &settings.embed_base_url));
                }
                Ok(response) => {
                    log::warn!("Mirror {} answered {}", mirror, response.status());
                }
                Err(e) => {
                    log::warn!("Mirror {} unreachable: {}", mirror, e);
                }
            }
        }

        Err(ResolverError::Initialization(format!(
            "no reachable AnimePahe mirror among {:?}",
            settings.mirrors
        )))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, embed_base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            embed_base_url: embed_base_url.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, anime_id: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(COOKIE, HeaderValue::from_static("__ddg2_="));
        headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
        let referer = match anime_id {
            Some(id) => format!("{}/anime/{}", self.base_url, id),
            None => self.base_url.clone(),
        };
        if let Ok(value) = HeaderValue::from_str(&referer) {
            headers.insert(REFERER, value);
        }
        headers
    }

    fn api_url(&self, params: &[(&str, &str)]) -> Result<Url, ResolverError> {
        Ok(Url::parse_with_params(
            &format!("{}/api", self.base_url),
            params,
        )?)
    }

    async fn get(
        &self,
        url: &str,
        anime_id: Option<&str>,
    ) -> Result<reqwest::Response, ResolverError> {
        let response = self
            .client
            .get(url)
            .headers(self.headers(anime_id))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        anime_id: Option<&str>,
    ) -> Result<T, ResolverError> {
        let body = self.get(url, anime_id).await?.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ResolverError::Parse(format!("unexpected response from {}: {}", url, e)))
    }

    async fn get_text(&self, url: &str, anime_id: Option<&str>) -> Result<String, ResolverError> {
        Ok(self.get(url, anime_id).await?.text().await?)
    }
}

#[async_trait::async_trait]
impl StreamingProvider for AnimePaheProvider {
    fn name(&self) -> &'static str {
        "AnimePahe"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, ResolverError> {
        let url = self.api_url(&[("m", "search"), ("q", query)])?;
        log::debug!("Searching AnimePahe: {}", url);
        let page: SearchPage = self.get_json(url.as_str(), None).await?;
        let results = page
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|item| SearchHit {
                id: item.session,
                title: item.title,
                image: item.poster,
                rating: item.score,
                release_date: item.year,
                kind: item.kind,
                episodes: item.episodes,
                status: item.status,
            })
            .collect();
        Ok(SearchResults { results })
    }

    async fn fetch_anime_info(&self, id: &str) -> Result<AnimeInfo, ResolverError> {
        let page_url = format!("{}/anime/{}", self.base_url, id);
        let html = self.get_text(&page_url, Some(id)).await?;
        let mut info = parse_anime_page(id, &html);

        let mut page = 1u32;
        loop {
            let page_param = page.to_string();
            let url = self.api_url(&[
                ("m", "release"),
                ("id", id),
                ("sort", "episode_asc"),
                ("page", &page_param),
            ])?;
            let release: ReleasePage = self.get_json(url.as_str(), Some(id)).await?;
            let last_page = release.last_page.unwrap_or(1);

            for item in release.data.unwrap_or_default() {
                let number = info.episodes.len() as u32 + 1;
                info.episodes.push(EpisodeDescriptor {
                    url: Some(format!("{}/play/{}/{}", self.base_url, id, item.session)),
                    id: format!("{}/{}", id, item.session),
                    number,
                    title: item.title.filter(|t| !t.trim().is_empty()),
                    provider_number: item.episode,
                    image: item.snapshot,
                    duration: item.duration,
                });
            }

            if page >= last_page {
                break;
            }
            page += 1;
        }

        log::debug!("Fetched {} episodes for {}", info.episodes.len(), id);
        Ok(info)
    }

    async fn fetch_episode_sources(
        &self,
        episode_id: &str,
    ) -> Result<EpisodeSources, ResolverError> {
        let anime_id = episode_id::anime_id(episode_id);
        let play_url = format!("{}/play/{}", self.base_url, episode_id);
        let html = self.get_text(&play_url, Some(anime_id)).await?;
        let (buttons, download) = parse_play_page(&html);

        let mut sources = Vec::new();
        for button in buttons {
            match kwik::extract(&self.client, &button.embed_url, &self.base_url).await {
                Ok(url) => sources.push(
                    StreamSource::new(url, button.quality)
                        .with_dub(button.audio.as_deref() == Some("eng")),
                ),
                Err(e) => {
                    log::warn!(
                        "Skipping {} source for {}: {}",
                        button.quality,
                        episode_id,
                        e
                    );
                }
            }
        }

        Ok(EpisodeSources {
            headers: HashMap::from([("Referer".to_string(), kwik::KWIK_REFERER.to_string())]),
            sources,
            download,
        })
    }

    fn embed_url(&self, episode_id: &str) -> String {
        format!("{}{}", self.embed_base_url, episode_id)
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn parse_anime_page(id: &str, html: &str) -> AnimeInfo {
    let document = Html::parse_document(html);

    let title = select_first(&document, "div.title-wrapper > h1 > span")
        .map(text_of)
        .unwrap_or_default();
    let image = select_first(&document, "div.anime-poster a")
        .and_then(|a| a.value().attr("href"))
        .map(str::to_string);
    let description = select_first(&document, "div.anime-summary")
        .map(text_of)
        .filter(|s| !s.is_empty());
    let genres = select_all(&document, "div.anime-genre ul li")
        .into_iter()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .collect();
    let status = select_all(&document, "div.anime-info p")
        .into_iter()
        .find(|p| text_of(*p).starts_with("Status:"))
        .map(|p| text_of(p).trim_start_matches("Status:").trim().to_string())
        .filter(|s| !s.is_empty());

    AnimeInfo {
        id: id.to_string(),
        title,
        image,
        description,
        genres,
        status,
        episodes: Vec::new(),
    }
}

fn parse_play_page(html: &str) -> (Vec<EmbedButton>, Vec<DownloadLink>) {
    let document = Html::parse_document(html);

    let buttons = select_all(&document, "div#resolutionMenu > button")
        .into_iter()
        .filter_map(|button| {
            let embed_url = button.value().attr("data-src")?.to_string();
            Some(EmbedButton {
                embed_url,
                quality: text_of(button),
                audio: button.value().attr("data-audio").map(str::to_string),
            })
        })
        .collect();

    let download = select_all(&document, "div#pickDownload > a")
        .into_iter()
        .filter_map(|a| {
            Some(DownloadLink {
                url: a.value().attr("href")?.to_string(),
                quality: text_of(a),
            })
        })
        .collect();

    (buttons, download)
}
