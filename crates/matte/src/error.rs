//! Gateway errors and their RFC 9457 Problem Details rendering.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::remover::RemovalError;

/// Failure of one handler stage.
///
/// Every variant is rendered as a structured response; none of them
/// escapes a handler as a fault.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Wrong content type, oversized payload, malformed Base64, missing
    /// field, or too many files. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Credential missing or mismatched.
    #[error("{source}")]
    Unauthorized {
        #[source]
        source: AuthError,
        challenge: &'static str,
    },

    /// The removal collaborator failed or returned an unusable result.
    #[error("Image processing failed: {0}")]
    Processing(#[from] RemovalError),
}

impl GatewayError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            Self::Validation(reason) => {
                matte_telemetry::log_validation_failure!(reason = %reason, "request rejected");
                ProblemDetails::bad_request(reason.clone()).into_response()
            }
            Self::Unauthorized { source, challenge } => {
                matte_telemetry::log_auth_failure!(reason = %source, "request unauthorized");
                let mut response = ProblemDetails::unauthorized(source.to_string()).into_response();
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(*challenge));
                response
            }
            Self::Processing(source) => {
                matte_telemetry::log_processing_error!(error = %source, "removal failed");
                ProblemDetails::internal_error_with_detail(self.to_string()).into_response()
            }
        }
    }
}

/// RFC 9457 Problem Details response.
#[derive(Debug, Clone, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub error_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProblemDetails {
    /// Create a 400 Bad Request error.
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            error_type: "urn:matte:error:bad-request".into(),
            title: "Bad Request".into(),
            status: 400,
            detail: Some(detail.into()),
        }
    }

    /// Create a 401 Unauthorized error.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            error_type: "urn:matte:error:authentication-failed".into(),
            title: "Unauthorized".into(),
            status: 401,
            detail: Some(detail.into()),
        }
    }

    /// Create a 500 Internal Server Error with details.
    pub fn internal_error_with_detail(detail: impl Into<String>) -> Self {
        Self {
            error_type: "urn:matte:error:internal-error".into(),
            title: "Internal Server Error".into(),
            status: 500,
            detail: Some(detail.into()),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Json(&self).into_response();
        *response.status_mut() = status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::bad_request("nope").status(),
            StatusCode::BAD_REQUEST
        );
        let unauthorized = GatewayError::Unauthorized {
            source: AuthError::Invalid,
            challenge: "Bearer",
        };
        assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GatewayError::from(RemovalError::NotPng).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_processing_message_carries_collaborator_text() {
        let err = GatewayError::from(RemovalError::Other("model exploded".into()));
        assert_eq!(err.to_string(), "Image processing failed: model exploded");
    }

    #[test]
    fn test_unauthorized_response_has_challenge() {
        let response = GatewayError::Unauthorized {
            source: AuthError::Invalid,
            challenge: "Bearer realm=\"matte\"",
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer realm=\"matte\""
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );
    }
}
