//! Service descriptor, health check and 404 fallback.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use super::router::AppState;
use crate::auth::AuthMode;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub timestamp: i64,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: state.config.service_name.clone(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

/// GET /
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    let authentication = match config.auth.mode() {
        AuthMode::Disabled => "not required",
        AuthMode::Bearer => "Authorization: Bearer <API_KEY>",
        AuthMode::HeaderKey => "X-API-Key: <API_KEY>",
    };

    Json(json!({
        "service": config.service_name,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Background removal service",
        "authentication": authentication,
        "endpoints": {
            "health": "GET /health",
            "remove_bg": format!("POST {}", config.route("/remove-bg")),
            "remove_bg_base64": format!("POST {}", config.route("/remove-bg-base64")),
            "remove_bg_batch": format!("POST {}", config.route("/remove-bg-batch")),
        },
        "limits": {
            "max_batch_size": config.max_batch_size,
            "max_payload": config.payload_limit.describe(),
        },
        "status": "ready",
    }))
}

/// Fallback for unknown paths.
pub async fn not_found(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let config = &state.config;
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Endpoint not found",
            "message": format!(
                "Available endpoints: GET /, GET /health, POST {}, POST {}, POST {}",
                config.route("/remove-bg"),
                config.route("/remove-bg-base64"),
                config.route("/remove-bg-batch"),
            ),
        })),
    )
}
