//! Proxy errors.
//!
//! Every failure is answered by the proxy itself with a JSON
//! `{error, message}` envelope; nothing escapes a handler.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid upstream URL {0}")]
    InvalidUpstream(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Connection refused, reset, DNS failure.
    #[error("upstream unreachable: {0}")]
    Transport(String),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// The client's own request could not be forwarded.
    #[error("{0}")]
    BadRequest(String),
}

impl ProxyError {
    /// Classify a client error from an upstream call.
    pub fn from_upstream(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() || err.is_body() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "Invalid request",
            Self::Timeout(_) => "Upstream timeout",
            Self::MalformedResponse(_) => "Bad upstream response",
            Self::InvalidUpstream(_) | Self::ClientBuild(_) | Self::Transport(_) => "Proxy error",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            matte_telemetry::log_upstream_error!(error = %self, "forwarding failed");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
