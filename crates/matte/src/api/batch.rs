//! Batch upload handler.

use axum::{
    extract::{Multipart, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;

use super::images::process_image;
use super::multipart::extract_batch_fields;
use super::router::AppState;
use crate::error::GatewayError;

/// Outcome of one file in a batch.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Success { result: String, format: &'static str },
    Error { message: String },
}

#[derive(Debug, Serialize)]
pub struct BatchItem {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub total: usize,
    pub results: Vec<BatchItem>,
}

/// POST {prefix}/remove-bg-batch
///
/// Files are processed one at a time in submission order. A failing file
/// yields an `error` item and the rest of the batch carries on.
pub async fn remove_bg_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, GatewayError> {
    let parts = extract_batch_fields(
        multipart,
        state.config.payload_limit,
        state.config.max_batch_size,
    )
    .await?;

    if parts.is_empty() {
        return Err(GatewayError::bad_request("No files were uploaded"));
    }

    let total = parts.len();
    let mut results = Vec::with_capacity(total);
    for (filename, upload) in parts {
        let outcome = match upload {
            Ok(data) => match process_image(&state, &filename, data).await {
                Ok(png) => ItemOutcome::Success {
                    result: STANDARD.encode(png),
                    format: "png",
                },
                Err(e) => {
                    if let GatewayError::Processing(source) = &e {
                        matte_telemetry::log_processing_error!(
                            filename = %filename,
                            error = %source,
                            "batch item failed"
                        );
                    }
                    ItemOutcome::Error {
                        message: e.to_string(),
                    }
                }
            },
            Err(e) => {
                matte_telemetry::log_validation_failure!(
                    filename = %filename,
                    reason = %e,
                    "batch item rejected"
                );
                ItemOutcome::Error {
                    message: e.to_string(),
                }
            }
        };
        results.push(BatchItem { filename, outcome });
    }

    Ok(Json(BatchResponse { total, results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_shapes() {
        let ok = BatchItem {
            filename: "a.jpg".into(),
            outcome: ItemOutcome::Success {
                result: "iVBO".into(),
                format: "png",
            },
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({
                "filename": "a.jpg",
                "status": "success",
                "result": "iVBO",
                "format": "png"
            })
        );

        let failed = BatchItem {
            filename: "b.txt".into(),
            outcome: ItemOutcome::Error {
                message: "Only image files are supported".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({
                "filename": "b.txt",
                "status": "error",
                "message": "Only image files are supported"
            })
        );
    }
}
