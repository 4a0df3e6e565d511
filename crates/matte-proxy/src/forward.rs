//! Forwarding handlers.
//!
//! Image routes are replayed against the upstream gateway on the same path.
//! The upstream status and body come back unchanged; the CORS headers are
//! added by the router's layers.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde_json::{json, Map, Value};

use crate::error::ProxyError;
use crate::router::ProxyState;

/// Client headers replayed to the gateway on raw (multipart) routes.
static FORWARDED_HEADERS: [HeaderName; 3] = [
    header::CONTENT_TYPE,
    header::AUTHORIZATION,
    HeaderName::from_static("x-api-key"),
];

/// Upstream headers relayed back to the client.
static RELAYED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_TYPE,
    header::CONTENT_DISPOSITION,
    header::CACHE_CONTROL,
    header::WWW_AUTHENTICATE,
];

fn copy_headers(from: &HeaderMap, names: &[HeaderName]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in names {
        if let Some(value) = from.get(name) {
            out.insert(name.clone(), value.clone());
        }
    }
    out
}

fn target(state: &ProxyState, uri: &Uri) -> String {
    let path = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
    state.config.upstream.join(path)
}

/// POST {/api}/remove-bg and {/api}/remove-bg-batch
///
/// The multipart body is forwarded byte for byte with its original
/// `Content-Type`, so the boundary survives.
pub async fn forward_raw(
    State(state): State<ProxyState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let timeout = state.config.request_timeout;
    let upstream = state
        .client
        .post(target(&state, &uri))
        .headers(copy_headers(&headers, &FORWARDED_HEADERS))
        .timeout(timeout)
        .body(body)
        .send()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?;

    let status = upstream.status();
    let relayed = copy_headers(upstream.headers(), &RELAYED_HEADERS);
    let body = upstream
        .bytes()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?;

    Ok((status, relayed, Body::from(body)).into_response())
}

/// POST {/api}/remove-bg-base64
///
/// The JSON body is parsed, re-serialized, and sent upstream. The upstream
/// reply must be JSON as well; it is relayed unchanged with its own
/// `Content-Type` (problem details stay `application/problem+json`).
pub async fn forward_json(
    State(state): State<ProxyState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ProxyError::BadRequest(format!("Request body is not valid JSON: {}", e)))?;

    let timeout = state.config.request_timeout;
    let auth_headers = copy_headers(&headers, &FORWARDED_HEADERS[1..]);
    let upstream = state
        .client
        .post(target(&state, &uri))
        .headers(auth_headers)
        .timeout(timeout)
        .json(&payload)
        .send()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?;

    let status = upstream.status();
    let mut relayed = copy_headers(upstream.headers(), &RELAYED_HEADERS);
    let body = upstream
        .bytes()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?;
    serde_json::from_slice::<Value>(&body).map_err(|e| {
        ProxyError::MalformedResponse(format!("upstream returned non-JSON body: {}", e))
    })?;
    relayed
        .entry(header::CONTENT_TYPE)
        .or_insert(HeaderValue::from_static("application/json"));

    Ok((status, relayed, Body::from(body)).into_response())
}

/// GET /health
///
/// Always answers 200: the proxy itself is healthy even when the gateway
/// behind it is not.
pub async fn health(State(state): State<ProxyState>) -> Json<Value> {
    let protocol = state.binding.protocol.as_str();
    match upstream_health(&state).await {
        Ok(mut report) => {
            report.insert("proxy_status".into(), json!("healthy"));
            report.insert("protocol".into(), json!(protocol));
            Json(Value::Object(report))
        }
        Err(e) => {
            matte_telemetry::log_upstream_error!(error = %e, "upstream health check failed");
            Json(json!({
                "status": "error",
                "proxy_status": "healthy",
                "api_status": "offline",
                "protocol": protocol,
                "message": e.to_string(),
            }))
        }
    }
}

async fn upstream_health(state: &ProxyState) -> Result<Map<String, Value>, ProxyError> {
    let timeout = state.config.health_timeout;
    let response = state
        .client
        .get(state.config.upstream.join("/health"))
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?;

    match response
        .json::<Value>()
        .await
        .map_err(|e| ProxyError::from_upstream(e, timeout))?
    {
        Value::Object(report) => Ok(report),
        _ => Err(ProxyError::MalformedResponse(
            "health report is not a JSON object".into(),
        )),
    }
}

/// GET /
pub async fn root(State(state): State<ProxyState>) -> Json<Value> {
    Json(json!({
        "service": "matte-proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "proxy_port": state.binding.port,
        "target_api": state.config.upstream.as_str(),
        "status": "ready",
        "protocol": state.binding.protocol.as_str(),
        "cors": "enabled",
        "endpoints": {
            "health": "GET /health",
            "remove_bg": "POST /remove-bg",
            "remove_bg_base64": "POST /remove-bg-base64",
            "remove_bg_batch": "POST /remove-bg-batch",
            "api_prefixed": "POST /api/remove-bg, /api/remove-bg-base64, /api/remove-bg-batch",
        },
    }))
}

/// Fallback for unknown paths.
pub async fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "message": "Available endpoints: GET /, GET /health, POST /remove-bg, \
                        POST /remove-bg-base64, POST /remove-bg-batch (also under /api)",
        })),
    )
}
