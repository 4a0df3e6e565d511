//! Shared-secret authentication for the image routes.
//!
//! One deployment accepts the credential from exactly one place: an
//! `Authorization: Bearer <token>` header or an `X-API-Key` header. The
//! credential must equal the configured key byte for byte.

use std::fmt;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use crate::api::AppState;
use crate::error::GatewayError;

/// Fallback shared secret. Deployments with auth enabled must override it.
pub const DEFAULT_API_KEY: &str = "my-secret-key";

/// Header carrying the key in [`AuthMode::HeaderKey`] deployments.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Which credential mechanism a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum AuthMode {
    /// Every request is admitted.
    #[default]
    #[value(alias = "none")]
    Disabled,
    /// `Authorization: Bearer <token>`.
    Bearer,
    /// `X-API-Key: <token>`.
    HeaderKey,
}

/// Credential check failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credential: {0}")]
    Missing(&'static str),

    #[error("invalid API key")]
    Invalid,
}

/// Active auth mode plus the shared secret.
#[derive(Clone)]
pub struct AuthConfig {
    mode: AuthMode,
    api_key: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AuthConfig {
    pub fn new(mode: AuthMode, api_key: impl Into<String>) -> Self {
        Self {
            mode,
            api_key: api_key.into(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(AuthMode::Disabled, DEFAULT_API_KEY)
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != AuthMode::Disabled
    }

    /// True when auth is on but still keyed with [`DEFAULT_API_KEY`].
    pub fn uses_default_key(&self) -> bool {
        self.is_enabled() && self.api_key == DEFAULT_API_KEY
    }

    /// Value for the `WWW-Authenticate` header on a 401.
    pub fn challenge(&self) -> &'static str {
        match self.mode {
            AuthMode::Bearer => "Bearer realm=\"matte\"",
            AuthMode::HeaderKey | AuthMode::Disabled => "ApiKey realm=\"matte\", header=\"X-API-Key\"",
        }
    }

    /// Check the request headers against the configured secret.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = match self.mode {
            AuthMode::Disabled => return Ok(()),
            AuthMode::Bearer => bearer_token(headers)
                .ok_or(AuthError::Missing("Authorization: Bearer <token> header required"))?,
            AuthMode::HeaderKey => header_key(headers)
                .ok_or(AuthError::Missing("X-API-Key header required"))?,
        };

        if presented.as_bytes() == self.api_key.as_bytes() {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn header_key(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(API_KEY_HEADER)?.to_str().ok()?.trim();
    (!value.is_empty()).then_some(value)
}

/// Middleware guarding the image routes.
///
/// Rejects before the handler runs, so the removal collaborator is never
/// reached on a failed check.
pub async fn require_credential(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    state
        .config
        .auth
        .verify(req.headers())
        .map_err(|e| GatewayError::Unauthorized {
            source: e,
            challenge: state.config.auth.challenge(),
        })?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn disabled_admits_everything() {
        let auth = AuthConfig::disabled();
        assert!(auth.verify(&HeaderMap::new()).is_ok());
        assert!(!auth.uses_default_key());
    }

    #[test]
    fn bearer_exact_match() {
        let auth = AuthConfig::new(AuthMode::Bearer, "s3cret");
        assert!(auth.verify(&headers(&[("authorization", "Bearer s3cret")])).is_ok());
        assert!(auth.verify(&headers(&[("authorization", "bearer s3cret")])).is_ok());
        assert_eq!(
            auth.verify(&headers(&[("authorization", "Bearer S3CRET")])),
            Err(AuthError::Invalid)
        );
        assert_eq!(
            auth.verify(&headers(&[("authorization", "Bearer s3cret2")])),
            Err(AuthError::Invalid)
        );
    }

    #[test]
    fn bearer_missing_or_wrong_scheme() {
        let auth = AuthConfig::new(AuthMode::Bearer, "s3cret");
        assert!(matches!(auth.verify(&HeaderMap::new()), Err(AuthError::Missing(_))));
        assert!(matches!(
            auth.verify(&headers(&[("authorization", "Basic s3cret")])),
            Err(AuthError::Missing(_))
        ));
        assert!(matches!(
            auth.verify(&headers(&[("authorization", "Bearer   ")])),
            Err(AuthError::Missing(_))
        ));
        // Only the active mechanism counts.
        assert!(matches!(
            auth.verify(&headers(&[("x-api-key", "s3cret")])),
            Err(AuthError::Missing(_))
        ));
    }

    #[test]
    fn header_key_mode() {
        let auth = AuthConfig::new(AuthMode::HeaderKey, "s3cret");
        assert!(auth.verify(&headers(&[("x-api-key", "s3cret")])).is_ok());
        assert_eq!(
            auth.verify(&headers(&[("x-api-key", "nope")])),
            Err(AuthError::Invalid)
        );
        assert!(matches!(
            auth.verify(&headers(&[("authorization", "Bearer s3cret")])),
            Err(AuthError::Missing(_))
        ));
    }

    #[test]
    fn default_key_detected() {
        assert!(AuthConfig::new(AuthMode::HeaderKey, DEFAULT_API_KEY).uses_default_key());
        assert!(!AuthConfig::new(AuthMode::HeaderKey, "rotated").uses_default_key());
    }

    #[test]
    fn debug_redacts_key() {
        let rendered = format!("{:?}", AuthConfig::new(AuthMode::Bearer, "s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
