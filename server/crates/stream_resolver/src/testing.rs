use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    AnimeInfo, EpisodeDescriptor, EpisodeSources, ResolverError, SearchHit, SearchResults,
    StreamSource, StreamingProvider,
};

/// In-memory provider recording every call it receives.
///
/// Also available to dependent crates through the `test-support` feature.
#[derive(Default)]
pub struct FakeProvider {
    titles: HashMap<String, String>,
    failing_searches: HashSet<String>,
    unreachable: bool,
    episodes: HashMap<String, Vec<EpisodeDescriptor>>,
    sources: HashMap<String, Vec<StreamSource>>,
    queries: Mutex<Vec<String>>,
    source_requests: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, query: &str, id: &str) -> Self {
        self.titles.insert(query.to_string(), id.to_string());
        self
    }

    pub fn with_failing_search(mut self, query: &str) -> Self {
        self.failing_searches.insert(query.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    pub fn with_episodes(mut self, anime_id: &str, count: u32) -> Self {
        let episodes = (1..=count)
            .map(|n| EpisodeDescriptor {
                id: format!("{}/ep-{}", anime_id, n),
                number: n,
                title: None,
                provider_number: Some(f64::from(n)),
                image: None,
                duration: None,
                url: None,
            })
            .collect();
        self.episodes.insert(anime_id.to_string(), episodes);
        self
    }

    pub fn with_sources(mut self, episode_id: &str, sources: Vec<StreamSource>) -> Self {
        self.sources.insert(episode_id.to_string(), sources);
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    pub fn source_requests(&self) -> Vec<String> {
        self.source_requests.lock().unwrap().clone()
    }

    fn offline(&self) -> ResolverError {
        ResolverError::Initialization("provider offline".to_string())
    }
}

#[async_trait]
impl StreamingProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "Fake"
    }

    async fn search(&self, query: &str) -> Result<SearchResults, ResolverError> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.unreachable || self.failing_searches.contains(query) {
            return Err(self.offline());
        }
        let results = self
            .titles
            .get(query)
            .map(|id| {
                vec![SearchHit {
                    id: id.clone(),
                    title: query.to_string(),
                    image: None,
                    rating: None,
                    release_date: None,
                    kind: Some("TV".to_string()),
                    episodes: self.episodes.get(id).map(|e| e.len() as u32),
                    status: None,
                }]
            })
            .unwrap_or_default();
        Ok(SearchResults { results })
    }

    async fn fetch_anime_info(&self, id: &str) -> Result<AnimeInfo, ResolverError> {
        if self.unreachable {
            return Err(self.offline());
        }
        Ok(AnimeInfo {
            id: id.to_string(),
            title: id.to_string(),
            episodes: self.episodes.get(id).cloned().unwrap_or_default(),
            ..Default::default()
        })
    }

    async fn fetch_episode_sources(
        &self,
        episode_id: &str,
    ) -> Result<EpisodeSources, ResolverError> {
        self.source_requests
            .lock()
            .unwrap()
            .push(episode_id.to_string());
        if self.unreachable {
            return Err(self.offline());
        }
        Ok(EpisodeSources {
            sources: self.sources.get(episode_id).cloned().unwrap_or_default(),
            ..Default::default()
        })
    }

    fn embed_url(&self, episode_id: &str) -> String {
        format!("https://example.test/play/{}", episode_id)
    }
}

#[cfg(test)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
