//! Single-image API handlers.

use std::time::Instant;

use axum::{
    body::{to_bytes, Body},
    extract::{Multipart, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use super::multipart::extract_file_field;
use super::router::AppState;
use crate::config::PayloadLimit;
use crate::error::GatewayError;
use crate::remover::remove_background;

/// JSON envelope returned by the Base64 route.
#[derive(Debug, Serialize)]
pub struct Base64Response {
    pub success: bool,
    pub result: String,
    pub format: &'static str,
    pub message: &'static str,
}

/// Run the collaborator on one image and log the outcome.
pub(super) async fn process_image(
    state: &AppState,
    filename: &str,
    data: Bytes,
) -> Result<Vec<u8>, GatewayError> {
    let started = Instant::now();
    let input_bytes = data.len();
    let output = remove_background(state.remover.clone(), data).await?;
    matte_telemetry::log_image_processed!(
        filename = %filename,
        input_bytes,
        output_bytes = output.len(),
        duration_ms = started.elapsed().as_millis() as u64,
        "background removed"
    );
    Ok(output)
}

/// POST {prefix}/remove-bg
pub async fn remove_bg(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, GatewayError> {
    let upload = extract_file_field(multipart, state.config.payload_limit).await?;
    let png = process_image(&state, &upload.filename, upload.data).await?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    if let Ok(value) =
        HeaderValue::from_str(&state.config.disposition.header_value(&upload.filename))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if state.config.no_cache {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    }

    Ok((headers, png).into_response())
}

/// POST {prefix}/remove-bg-base64
pub async fn remove_bg_base64(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<Base64Response>, GatewayError> {
    let limit = state.config.payload_limit;
    let raw = to_bytes(body, limit.encoded_ceiling())
        .await
        .map_err(|e| {
            if e.into_inner()
                .downcast_ref::<http_body_util::LengthLimitError>()
                .is_some()
            {
                too_large(limit)
            } else {
                GatewayError::bad_request("Failed to read request body")
            }
        })?;

    let image = image_field(&raw)?;
    let data = decode_image(&image)?;
    if limit.exceeds(data.len()) {
        return Err(too_large(limit));
    }

    let png = process_image(&state, "base64", Bytes::from(data)).await?;

    Ok(Json(Base64Response {
        success: true,
        result: STANDARD.encode(png),
        format: "png",
        message: "Background removed successfully",
    }))
}

fn too_large(limit: PayloadLimit) -> GatewayError {
    GatewayError::bad_request(format!("Image size too large (max {})", limit.describe()))
}

/// Pull the `image` string out of a JSON request body.
fn image_field(raw: &[u8]) -> Result<String, GatewayError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| GatewayError::bad_request(format!("Invalid JSON body: {}", e)))?;
    let Value::Object(mut object) = value else {
        return Err(GatewayError::bad_request(
            "Request body must be a JSON object",
        ));
    };

    match object.remove("image") {
        None | Some(Value::Null) => Err(GatewayError::bad_request(
            "Request must contain 'image' field",
        )),
        Some(Value::String(image)) => Ok(image),
        Some(_) => Err(GatewayError::bad_request("'image' field must be a string")),
    }
}

/// Strip an optional `data:image/...;base64,` prefix.
fn strip_data_url(payload: &str) -> Result<&str, GatewayError> {
    if !payload.starts_with("data:image") {
        return Ok(payload);
    }
    payload
        .split_once(',')
        .map(|(_, rest)| rest)
        .ok_or_else(|| GatewayError::bad_request("Invalid data URL format"))
}

/// Decode a Base64 image payload, with or without a data URL prefix.
fn decode_image(payload: &str) -> Result<Vec<u8>, GatewayError> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(GatewayError::bad_request("Image data cannot be empty"));
    }

    // Line-wrapped Base64 is common in pasted data URLs.
    let encoded: String = strip_data_url(payload)?
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let data = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|_| GatewayError::bad_request("Invalid base64 image data"))?;

    if data.is_empty() {
        return Err(GatewayError::bad_request("Image data cannot be empty"));
    }
    Ok(data)
}
