pub mod metadata;
pub mod streaming;

use std::fmt::{self, Display};
use std::sync::Arc;

use axum::http::StatusCode;
use stream_resolver::StreamingProvider;

use crate::state::State;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.to_string(),
            details: None,
        }
    }

    pub fn not_ready() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Provider not ready".to_string(),
            details: None,
        }
    }

    /// A provider or origin call failed; the cause goes to `details`
    pub fn upstream(message: &str, cause: impl Display) -> Self {
        log::error!("{}: {}", message, cause);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
            details: Some(cause.to_string()),
        }
    }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{} ({}): {}", self.message, self.status, details),
            None => write!(f, "{} ({})", self.message, self.status),
        }
    }
}

/// The provider, or 503 while it is still initializing
pub async fn require_provider(state: &State) -> Result<Arc<dyn StreamingProvider>, ApiError> {
    state.provider.try_get().await.ok_or_else(ApiError::not_ready)
}

/// `None` for absent, empty or whitespace-only parameters
pub fn non_empty(param: Option<String>) -> Option<String> {
    param.filter(|p| !p.trim().is_empty())
}
