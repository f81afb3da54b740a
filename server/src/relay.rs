use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::header::{
    ACCEPT_RANGES, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ORIGIN, RANGE,
    REFERER, USER_AGENT,
};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::config::Config;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid relay header: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Upstream sent no response within {0:?}")]
    Timeout(Duration),
}

/// Lifecycle of one relayed transfer, as seen from the outgoing body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Bytes forwarded so far; strictly increasing
    Progress(u64),
    Completed(u64),
    Aborted { bytes: u64, reason: String },
}

/// Fetches media on behalf of the browser, posing as the provider's own site
pub struct RelayClient {
    client: reqwest::Client,
    header_timeout: Duration,
}

impl RelayClient {
    pub fn new(config: &Config) -> Result<Self, RelayError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&config.user_agent)?);
        headers.insert(REFERER, HeaderValue::from_str(&config.relay_referer)?);
        headers.insert(ORIGIN, HeaderValue::from_str(&config.relay_origin)?);

        // no total timeout, a segment download may legitimately take long;
        // read_timeout resets after every chunk
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .read_timeout(config.request_timeout())
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            header_timeout: config.request_timeout(),
        })
    }

    /// Send the upstream request and wait for its headers only
    pub async fn open(
        &self,
        target: &str,
        range: Option<&HeaderValue>,
    ) -> Result<reqwest::Response, RelayError> {
        let mut request = self.client.get(target);
        if let Some(range) = range {
            request = request.header(RANGE, range.clone());
        }
        let response = tokio::time::timeout(self.header_timeout, request.send())
            .await
            .map_err(|_| RelayError::Timeout(self.header_timeout))??;
        Ok(response.error_for_status()?)
    }
}

/// Turn an upstream response into the outgoing one, body still unread
pub fn into_response(
    upstream: reqwest::Response,
    events: Option<UnboundedSender<RelayEvent>>,
) -> Response {
    let status = upstream.status();
    let upstream_headers = upstream.headers().clone();

    let stream = RelayStream::new(upstream.bytes_stream().boxed(), events);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Range"),
    );
    for name in [CONTENT_TYPE, CONTENT_LENGTH, CONTENT_RANGE, ACCEPT_RANGES] {
        if let Some(value) = upstream_headers.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    response
}

/// Upstream body piped chunk by chunk, never buffered as a whole.
///
/// Dropping it before the upstream ends (the client went away) reports
/// `Aborted` and drops the upstream stream, which closes its connection.
pub struct RelayStream {
    inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
    forwarded: u64,
    events: Option<UnboundedSender<RelayEvent>>,
    finished: bool,
}

impl RelayStream {
    pub fn new(
        inner: BoxStream<'static, Result<Bytes, reqwest::Error>>,
        events: Option<UnboundedSender<RelayEvent>>,
    ) -> Self {
        Self {
            inner,
            forwarded: 0,
            events,
            finished: false,
        }
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(events) = &self.events {
            // receiver gone just means nobody is listening
            let _ = events.send(event);
        }
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    self.forwarded += chunk.len() as u64;
                    self.emit(RelayEvent::Progress(self.forwarded));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                self.emit(RelayEvent::Aborted {
                    bytes: self.forwarded,
                    reason: e.to_string(),
                });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.emit(RelayEvent::Completed(self.forwarded));
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if !self.finished {
            self.emit(RelayEvent::Aborted {
                bytes: self.forwarded,
                reason: "client disconnected".to_string(),
            });
        }
    }
}
