use axum::{
    extract::{Path, Query},
    http::{header::RANGE, HeaderMap, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stream_resolver::{
    AnimeInfo, EpisodeSources, MediaMetadata, PlaybackPlan, SearchResults, TitleCandidate,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    handlers::{
        metadata::{self, MediaEpisodes, MediaSearch},
        non_empty,
        streaming::{self, Health, RELAY_ROUTE},
        ApiError,
    },
    relay::{self, RelayEvent},
    state::State,
};

const WATCH_ROUTE: &str = "/api/watch/";
const PLAY_ROUTE: &str = "/api/play/";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Episode ids travel percent-encoded in one path segment. Extractors would
/// decode them, so the raw segment is taken from the URI instead.
fn raw_segment<'a>(uri: &'a Uri, prefix: &str) -> &'a str {
    uri.path().strip_prefix(prefix).unwrap_or_default()
}

async fn handler_health(state: axum::extract::State<State>) -> Json<Health> {
    Json(streaming::health(&state.0).await)
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn handler_search(
    state: axum::extract::State<State>,
    Query(param): Query<SearchQuery>,
) -> Result<Json<SearchResults>, ApiError> {
    Ok(Json(streaming::search(&state.0, param.q).await?))
}

async fn handler_info(
    state: axum::extract::State<State>,
    Path(id): Path<String>,
) -> Result<Json<AnimeInfo>, ApiError> {
    log::debug!("Fetching anime info for {}", id);
    Ok(Json(streaming::anime_info(&state.0, &id).await?))
}

async fn handler_watch(
    state: axum::extract::State<State>,
    uri: Uri,
) -> Result<Json<EpisodeSources>, ApiError> {
    let encoded_id = raw_segment(&uri, WATCH_ROUTE);
    log::debug!("Resolving sources for {}", encoded_id);
    Ok(Json(streaming::watch(&state.0, encoded_id).await?))
}

async fn handler_play(
    state: axum::extract::State<State>,
    uri: Uri,
) -> Result<Json<PlaybackPlan>, ApiError> {
    let encoded_id = raw_segment(&uri, PLAY_ROUTE);
    Ok(Json(streaming::play(&state.0, encoded_id).await?))
}

#[derive(Debug, Deserialize)]
struct MatchQuery {
    english: Option<String>,
    romaji: Option<String>,
}

#[derive(Debug, Serialize)]
struct MatchResponse {
    #[serde(rename = "match")]
    matched: Option<TitleCandidate>,
}

async fn handler_match(
    state: axum::extract::State<State>,
    Query(param): Query<MatchQuery>,
) -> Result<Json<MatchResponse>, ApiError> {
    let matched = streaming::match_title(&state.0, param.english, param.romaji).await?;
    Ok(Json(MatchResponse { matched }))
}

async fn handler_anilist_search(
    state: axum::extract::State<State>,
    Query(param): Query<SearchQuery>,
) -> Result<Json<MediaSearch>, ApiError> {
    Ok(Json(metadata::search(&state.0, param.q).await?))
}

async fn handler_anilist(
    state: axum::extract::State<State>,
    Path(id): Path<u64>,
) -> Result<Json<MediaMetadata>, ApiError> {
    Ok(Json(metadata::media(&state.0, id).await?))
}

async fn handler_anilist_episodes(
    state: axum::extract::State<State>,
    Path(id): Path<u64>,
) -> Result<Json<MediaEpisodes>, ApiError> {
    Ok(Json(metadata::media_episodes(&state.0, id).await?))
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

async fn handler_proxy(
    state: axum::extract::State<State>,
    headers: HeaderMap,
    Query(param): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    let target =
        non_empty(param.url).ok_or_else(|| ApiError::bad_request("URL parameter is required"))?;
    log::debug!("Relaying {}", target);

    let upstream = state
        .relay
        .open(&target, headers.get(RANGE))
        .await
        .map_err(|e| ApiError::upstream("Failed to proxy request", e))?;

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(log_relay(target, rx));
    Ok(relay::into_response(upstream, Some(tx)))
}

async fn log_relay(target: String, mut events: UnboundedReceiver<RelayEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::Progress(_) => {}
            RelayEvent::Completed(bytes) => {
                log::debug!("Relayed {} bytes from {}", bytes, target);
                return;
            }
            RelayEvent::Aborted { bytes, reason } => {
                log::info!(
                    "Relay of {} aborted after {} bytes: {}",
                    target,
                    bytes,
                    reason
                );
                return;
            }
        }
    }
}

pub fn router(state: State) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handler_health))
        .route("/api/search", get(handler_search))
        .route("/api/info/:id", get(handler_info))
        .route("/api/watch/:episode_id", get(handler_watch))
        .route("/api/play/:episode_id", get(handler_play))
        .route("/api/match", get(handler_match))
        .route("/api/anilist/search", get(handler_anilist_search))
        .route("/api/anilist/:id", get(handler_anilist))
        .route("/api/anilist/:id/episodes", get(handler_anilist_episodes))
        .route(RELAY_ROUTE, get(handler_proxy))
        .layer(cors)
        .with_state(state)
}

pub async fn start_api_server(state: State) {
    let addr = state.config.listen_addr.clone();
    let app = router(state);

    log::info!("Starting API server on http://{}", addr);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => {
            log::info!("API server listening on http://{}", addr);
            listener
        }
        Err(e) => {
            log::error!("Failed to bind to address {}: {}", addr, e);
            log::error!("Please check if the port is already in use or try a different port");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("Server error: {}", e);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down API server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{header, Method, Request, StatusCode};
    use axum::routing::post;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use stream_resolver::testing::FakeProvider;
    use stream_resolver::StreamSource;
    use tower::ServiceExt;

    const MEDIA_BODY: &str = r#"{"data":{"Media":{
        "id":16498,"idMal":16498,
        "title":{"romaji":"Shingeki no Kyojin","english":"Attack on Titan","native":null},
        "episodes":25,"genres":["Action"],"studios":{"nodes":[]}
    }}}"#;

    fn test_state(config: Config) -> State {
        State::new(config).unwrap()
    }

    async fn ready_state(provider: Arc<FakeProvider>) -> State {
        let state = test_state(Config::default());
        state.provider.set_ready(provider).await;
        state
    }

    async fn spawn_upstream(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn send(state: &State, uri: &str) -> (StatusCode, Value) {
        let response = router(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_health_reports_state() {
        let state = test_state(Config::default());
        let (status, body) = send(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "AnimePahe");
        assert_eq!(body["ready"], false);
        assert_eq!(body["state"], "uninitialized");

        state.provider.set_ready(Arc::new(FakeProvider::new())).await;
        let (_, body) = send(&state, "/health").await;
        assert_eq!(body["ready"], true);
        assert_eq!(body["state"], "ready");
    }

    #[tokio::test]
    async fn test_requests_wait_for_provider() {
        let state = test_state(Config::default());
        let uris = [
            "/api/search?q=naruto",
            "/api/info/naruto",
            "/api/watch/naruto%2Fep-1",
        ];
        for uri in uris {
            let (status, body) = send(&state, uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
            assert_eq!(body["error"], "Provider not ready");
        }

        let provider = FakeProvider::new()
            .with_title("naruto", "naruto")
            .with_episodes("naruto", 2);
        state.provider.set_ready(Arc::new(provider)).await;
        for uri in uris {
            let (status, _) = send(&state, uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let state = test_state(Config::default());
        let (status, body) = send(&state, "/api/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query parameter \"q\" is required");

        let (status, _) = send(&state, "/api/search?q=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_returns_results() {
        let state = ready_state(Arc::new(FakeProvider::new().with_title("Naruto", "nrt"))).await;
        let (status, body) = send(&state, "/api/search?q=Naruto").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["id"], "nrt");
        assert_eq!(body["results"][0]["type"], "TV");
    }

    #[tokio::test]
    async fn test_info_lists_episodes() {
        let state = ready_state(Arc::new(FakeProvider::new().with_episodes("naruto", 3))).await;
        let (status, body) = send(&state, "/api/info/naruto").await;
        assert_eq!(status, StatusCode::OK);
        let episodes = body["episodes"].as_array().unwrap();
        assert_eq!(episodes.len(), 3);
        assert_eq!(episodes[2]["id"], "naruto/ep-3");
        assert_eq!(episodes[2]["number"], 3);
    }

    #[tokio::test]
    async fn test_watch_decodes_episode_id_once() {
        let provider = Arc::new(FakeProvider::new().with_sources(
            "naruto/episode-1",
            vec![StreamSource::new("https://cdn.test/owo.m3u8", "720p")],
        ));
        let state = ready_state(provider.clone()).await;

        let (status, body) = send(&state, "/api/watch/naruto%2Fepisode-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"][0]["quality"], "720p");
        assert_eq!(body["sources"][0]["isM3u8"], true);
        assert_eq!(provider.source_requests(), vec!["naruto/episode-1"]);
    }

    #[tokio::test]
    async fn test_watch_provider_failure_is_500() {
        let state = ready_state(Arc::new(FakeProvider::new().unreachable())).await;
        let (status, body) = send(&state, "/api/watch/naruto%2Fepisode-1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch streaming links");
        assert!(body["details"]
            .as_str()
            .unwrap()
            .contains("provider offline"));
    }

    #[tokio::test]
    async fn test_play_degrades_to_iframe() {
        let state = ready_state(Arc::new(FakeProvider::new())).await;
        let (status, body) = send(&state, "/api/play/naruto%2Fep-9").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "iframe");
        assert_eq!(body["url"], "https://example.test/play/naruto/ep-9");

        let state = ready_state(Arc::new(FakeProvider::new().unreachable())).await;
        let (status, body) = send(&state, "/api/play/naruto%2Fep-9").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "iframe");
    }

    #[tokio::test]
    async fn test_play_prefers_relayed_hls() {
        let provider = FakeProvider::new().with_sources(
            "naruto/ep-1",
            vec![
                StreamSource::new("https://cdn.test/360/owo.m3u8", "360p"),
                StreamSource::new("https://cdn.test/1080/owo.m3u8", "1080p"),
            ],
        );
        let state = ready_state(Arc::new(provider)).await;
        let (status, body) = send(&state, "/api/play/naruto%2Fep-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "hls");
        assert_eq!(body["quality"], "1080p");
        assert_eq!(
            body["url"],
            "/api/proxy?url=https%3A%2F%2Fcdn.test%2F1080%2Fowo.m3u8"
        );
    }

    #[tokio::test]
    async fn test_match_title() {
        let state = test_state(Config::default());
        let (status, _) = send(&state, "/api/match").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&state, "/api/match?english=Attack%20on%20Titan").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let provider = FakeProvider::new().with_title("Shingeki no Kyojin", "snk");
        state.provider.set_ready(Arc::new(provider)).await;
        let (status, body) = send(
            &state,
            "/api/match?english=Attack%20on%20Titan&romaji=Shingeki%20no%20Kyojin",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match"]["providerId"], "snk");

        let (status, body) = send(&state, "/api/match?english=Unknown").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match"], Value::Null);
    }

    #[tokio::test]
    async fn test_anilist_episodes_follow_title_match() {
        let anilist = Router::new().route(
            "/graphql",
            post(|| async { ([(header::CONTENT_TYPE, "application/json")], MEDIA_BODY) }),
        );
        let addr = spawn_upstream(anilist).await;

        let config = Config {
            anilist_endpoint: format!("http://{}/graphql", addr),
            ..Config::default()
        };
        let state = test_state(config);
        let (status, _) = send(&state, "/api/anilist/16498/episodes").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let provider = FakeProvider::new()
            .with_title("Attack on Titan", "aot")
            .with_episodes("aot", 25);
        state.provider.set_ready(Arc::new(provider)).await;

        let (status, body) = send(&state, "/api/anilist/16498/episodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["media"]["title"]["romaji"], "Shingeki no Kyojin");
        assert_eq!(body["match"]["providerId"], "aot");
        assert_eq!(body["episodes"].as_array().unwrap().len(), 25);

        let (status, body) = send(&state, "/api/anilist/16498").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["episodes"], 25);
    }

    #[tokio::test]
    async fn test_anilist_no_match_is_empty() {
        let anilist = Router::new().route(
            "/graphql",
            post(|| async { ([(header::CONTENT_TYPE, "application/json")], MEDIA_BODY) }),
        );
        let addr = spawn_upstream(anilist).await;
        let config = Config {
            anilist_endpoint: format!("http://{}/graphql", addr),
            ..Config::default()
        };
        let state = test_state(config);
        state.provider.set_ready(Arc::new(FakeProvider::new())).await;

        let (status, body) = send(&state, "/api/anilist/16498/episodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["match"], Value::Null);
        assert_eq!(body["episodes"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_anilist_search_lists_media() {
        let anilist = Router::new().route(
            "/graphql",
            post(|| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"{"data":{"Page":{"media":[
                        {"id":16498,"title":{"romaji":"Shingeki no Kyojin","english":"Attack on Titan"}},
                        {"id":20958,"title":{"romaji":"Shingeki no Kyojin Season 2","english":null}}
                    ]}}}"#,
                )
            }),
        );
        let addr = spawn_upstream(anilist).await;
        let config = Config {
            anilist_endpoint: format!("http://{}/graphql", addr),
            ..Config::default()
        };
        let state = test_state(config);

        let (status, _) = send(&state, "/api/anilist/search").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // served without a ready provider
        let (status, body) = send(&state, "/api/anilist/search?q=shingeki").await;
        assert_eq!(status, StatusCode::OK);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["id"], 16498);
        assert_eq!(results[1]["title"]["romaji"], "Shingeki no Kyojin Season 2");
    }

    #[tokio::test]
    async fn test_proxy_requires_url() {
        let state = test_state(Config::default());
        let (status, body) = send(&state, "/api/proxy").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "URL parameter is required");
    }

    #[tokio::test]
    async fn test_proxy_streams_with_content_type() {
        let upstream = Router::new().route(
            "/hls/index.m3u8",
            get(|headers: HeaderMap| async move {
                let referer = headers
                    .get(header::REFERER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (
                    [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
                    format!("#EXTM3U\n#{}\n", referer),
                )
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let state = test_state(Config::default());

        let target = format!("http://{}/hls/index.m3u8", addr);
        let uri = format!("/api/proxy?url={}", urlencoding::encode(&target));
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.apple.mpegurl"
        );
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"#EXTM3U\n#https://animepahe.com/\n");
    }

    #[tokio::test]
    async fn test_proxy_upstream_error_is_500() {
        let addr = spawn_upstream(Router::new()).await;
        let state = test_state(Config::default());

        let target = format!("http://{}/missing.ts", addr);
        let (status, body) = send(
            &state,
            &format!("/api/proxy?url={}", urlencoding::encode(&target)),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to proxy request");
        assert!(body["details"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn test_proxy_stalled_upstream_times_out() {
        let upstream = Router::new().route(
            "/slow.m3u8",
            get(|| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                "#EXTM3U\n"
            }),
        );
        let addr = spawn_upstream(upstream).await;
        let state = test_state(Config {
            request_timeout_secs: 1,
            ..Config::default()
        });

        let target = format!("http://{}/slow.m3u8", addr);
        let started = std::time::Instant::now();
        let (status, body) = send(
            &state,
            &format!("/api/proxy?url={}", urlencoding::encode(&target)),
        )
        .await;
        assert!(started.elapsed() < std::time::Duration::from_secs(4));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to proxy request");
        assert!(body["details"].as_str().unwrap().contains("no response"));
    }

    #[tokio::test]
    async fn test_proxy_preflight() {
        let state = test_state(Config::default());
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/proxy")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }
}
