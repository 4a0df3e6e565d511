//! Shared multipart form parsing helpers.

use axum::extract::multipart::{Field, Multipart};
use bytes::{Bytes, BytesMut};

use crate::config::PayloadLimit;
use crate::error::GatewayError;

/// One uploaded image, fully buffered.
#[derive(Debug)]
pub struct Upload {
    pub filename: String,
    pub data: Bytes,
}

/// Outcome of reading one `files` part of a batch upload.
pub type BatchPart = (String, Result<Bytes, GatewayError>);

fn is_image(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
}

async fn next_field(multipart: &mut Multipart) -> Result<Option<Field<'_>>, GatewayError> {
    multipart
        .next_field()
        .await
        .map_err(|e| GatewayError::bad_request(format!("Invalid multipart data: {}", e)))
}

/// Validate the declared type and buffer one field, stopping as soon as the
/// payload limit is crossed.
async fn read_image(mut field: Field<'_>, limit: PayloadLimit) -> Result<Bytes, GatewayError> {
    if !is_image(field.content_type()) {
        return Err(GatewayError::bad_request("Only image files are supported"));
    }

    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| GatewayError::bad_request(format!("Failed to read file: {}", e)))?
    {
        if limit.exceeds(buf.len() + chunk.len()) {
            return Err(GatewayError::bad_request(format!(
                "File size too large (max {})",
                limit.describe()
            )));
        }
        buf.extend_from_slice(&chunk);
    }

    if buf.is_empty() {
        return Err(GatewayError::bad_request("Uploaded file is empty"));
    }
    Ok(buf.freeze())
}

fn filename_of(field: &Field<'_>) -> String {
    field
        .file_name()
        .filter(|name| !name.is_empty())
        .unwrap_or("image")
        .to_string()
}

/// Extract the single `file` field from a multipart upload.
///
/// Fails with 400 if the field is missing, not an image, or too large.
pub async fn extract_file_field(
    mut multipart: Multipart,
    limit: PayloadLimit,
) -> Result<Upload, GatewayError> {
    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() == Some("file") {
            let filename = filename_of(&field);
            let data = read_image(field, limit).await?;
            return Ok(Upload { filename, data });
        }
    }

    Err(GatewayError::bad_request("Missing 'file' field"))
}

/// Collect every `files` field in submission order.
///
/// Per-file validation failures are kept alongside the filename so one bad
/// file never rejects the batch. A malformed multipart stream is fatal, and
/// so is a `files` field beyond `max`: it is rejected before its body is
/// read, so an oversized batch is never buffered.
pub async fn extract_batch_fields(
    mut multipart: Multipart,
    limit: PayloadLimit,
    max: usize,
) -> Result<Vec<BatchPart>, GatewayError> {
    let mut parts = Vec::new();

    while let Some(field) = next_field(&mut multipart).await? {
        if field.name() != Some("files") {
            continue;
        }
        if parts.len() == max {
            return Err(batch_too_large(max));
        }
        let filename = filename_of(&field);
        let outcome = read_image(field, limit).await;
        parts.push((filename, outcome));
    }

    Ok(parts)
}

fn batch_too_large(max: usize) -> GatewayError {
    GatewayError::bad_request(format!("Batch processing supports at most {} images", max))
}
