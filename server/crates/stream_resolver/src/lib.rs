pub mod episode_id;
pub mod episodes;
pub mod metadata;
pub mod models;
pub mod provider;
pub mod sources;
pub mod title;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use thiserror::Error;

// Re-export main types
pub use episodes::EpisodeIndex;
pub use metadata::{AniListClient, MediaMetadata};
pub use models::{
    AnimeInfo, DownloadLink, EpisodeDescriptor, EpisodeSources, SearchHit, SearchResults,
    StreamSource, TitleCandidate,
};
pub use provider::{create_provider, ProviderSettings, ProviderType, StreamingProvider};
pub use sources::{select_preferred, PlaybackPlan, SourceResolver};
pub use title::TitleResolver;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("NetworkError: {0}")]
    Network(#[from] reqwest::Error),
    #[error("StatusError: {url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("UrlError: {0}")]
    Url(#[from] url::ParseError),
    #[error("ParseError: {0}")]
    Parse(String),
    #[error("InvalidEpisodeId: {0}")]
    InvalidEpisodeId(String),
    #[error("ExtractionError: {0}")]
    Extraction(String),
    #[error("GraphQlError: {0}")]
    GraphQl(String),
    #[error("InitializationError: {0}")]
    Initialization(String),
}
