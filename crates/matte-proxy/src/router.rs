//! Axum router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::forward;

/// Image routes are served both at the root and under `/api`, matching
/// the two gateway layouts.
const ROUTE_PREFIXES: [&str; 2] = ["", "/api"];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Scheme the proxy is reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// The listener a router instance is served on, reported by `/` and `/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub port: u16,
    pub protocol: Protocol,
}

/// Shared application state.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
    pub binding: Binding,
}

/// Build the upstream HTTP client.
pub fn build_client(config: &ProxyConfig) -> Result<reqwest::Client, ProxyError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(config.request_timeout))
        .timeout(config.request_timeout)
        .build()
        .map_err(ProxyError::ClientBuild)
}

/// Create the proxy router with all routes.
pub fn create_router(config: Arc<ProxyConfig>, binding: Binding) -> Result<Router, ProxyError> {
    let client = build_client(&config)?;
    let state = ProxyState {
        config,
        client,
        binding,
    };

    let mut router = Router::new()
        .route("/", get(forward::root))
        .route("/health", get(forward::health));
    for prefix in ROUTE_PREFIXES {
        router = router
            .route(&format!("{}/remove-bg", prefix), post(forward::forward_raw))
            .route(
                &format!("{}/remove-bg-base64", prefix),
                post(forward::forward_json),
            )
            .route(
                &format!("{}/remove-bg-batch", prefix),
                post(forward::forward_raw),
            );
    }

    Ok(router
        .fallback(forward::not_found)
        // The gateway enforces payload limits.
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn(preflight))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static("*"),
        ))
        .with_state(state))
}

/// Answer every `OPTIONS` request locally, on any path, without contacting
/// the upstream.
async fn preflight(req: Request, next: Next) -> Response {
    if req.method() != Method::OPTIONS {
        return next.run(req).await;
    }

    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
        .into_response()
}
