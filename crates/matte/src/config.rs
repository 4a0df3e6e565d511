//! Gateway configuration.
//!
//! A [`GatewayConfig`] is built once at startup and shared read-only by
//! every request handler. The two deployments the gateway grew out of are
//! available as [`GatewayProfile`] presets; individual options override them.

use crate::auth::AuthConfig;

/// Default cap on the number of files in one batch request.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// Payload cap used by the `bolt` profile (20 MiB).
pub const BOLT_MAX_PAYLOAD_BYTES: usize = 20 * 1024 * 1024;

const MIB: usize = 1024 * 1024;

/// Deployment presets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum GatewayProfile {
    /// Root-mounted routes, unbounded payloads, attachment downloads.
    #[default]
    Standard,
    /// `/api`-prefixed routes, 20 MiB payload cap, inline uncached results.
    Bolt,
}

impl GatewayProfile {
    /// Listen port this deployment used by default.
    pub fn default_port(self) -> u16 {
        match self {
            Self::Standard => 8000,
            Self::Bolt => 8080,
        }
    }

    /// Build the configuration this profile describes.
    pub fn config(self) -> GatewayConfig {
        match self {
            Self::Standard => GatewayConfig {
                service_name: "rembg-api".to_string(),
                auth: AuthConfig::disabled(),
                route_prefix: String::new(),
                max_batch_size: DEFAULT_MAX_BATCH_SIZE,
                payload_limit: PayloadLimit::Unbounded,
                disposition: Disposition::Attachment,
                no_cache: false,
            },
            Self::Bolt => GatewayConfig {
                service_name: "bolt-rembg-api".to_string(),
                auth: AuthConfig::disabled(),
                route_prefix: "/api".to_string(),
                max_batch_size: DEFAULT_MAX_BATCH_SIZE,
                payload_limit: PayloadLimit::Bytes(BOLT_MAX_PAYLOAD_BYTES),
                disposition: Disposition::Inline,
                no_cache: true,
            },
        }
    }
}

/// Maximum accepted size of a single decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadLimit {
    Unbounded,
    Bytes(usize),
}

impl PayloadLimit {
    /// `0` means unbounded.
    pub fn from_bytes(bytes: usize) -> Self {
        if bytes == 0 {
            Self::Unbounded
        } else {
            Self::Bytes(bytes)
        }
    }

    pub fn exceeds(&self, len: usize) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Bytes(max) => len > *max,
        }
    }

    /// Upper bound for a Base64 JSON body carrying an image within the limit.
    ///
    /// Covers the 4/3 Base64 expansion plus room for a data URL prefix and
    /// the JSON envelope.
    pub fn encoded_ceiling(&self) -> usize {
        match self {
            Self::Unbounded => usize::MAX,
            Self::Bytes(max) => max.div_ceil(3).saturating_mul(4).saturating_add(64 * 1024),
        }
    }

    /// Human-readable form of the limit, e.g. `20MB`.
    pub fn describe(&self) -> String {
        match self {
            Self::Unbounded => "unbounded".to_string(),
            Self::Bytes(max) if max % MIB == 0 => format!("{}MB", max / MIB),
            Self::Bytes(max) => format!("{} bytes", max),
        }
    }
}

/// How the multipart route presents its PNG result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Disposition {
    #[default]
    Attachment,
    Inline,
}

impl Disposition {
    /// `Content-Disposition` value for a result derived from `filename`.
    pub fn header_value(&self, filename: &str) -> String {
        let kind = match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        };
        format!("{}; filename=\"removed_{}.png\"", kind, file_stem(filename))
    }
}

/// Everything before the first dot of the last path segment, restricted to
/// characters that are safe inside a quoted header parameter.
fn file_stem(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let stem: String = base
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_graphic() && *c != '"' && *c != ';' && *c != '\\')
        .collect();

    if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    }
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Reported by `/health` and the root descriptor.
    pub service_name: String,

    /// Credential check applied to the image routes.
    pub auth: AuthConfig,

    /// Prefix for the image routes (`""` or e.g. `"/api"`).
    pub route_prefix: String,

    /// Batches with more files than this are rejected outright.
    pub max_batch_size: usize,

    pub payload_limit: PayloadLimit,

    pub disposition: Disposition,

    /// Send `Cache-Control: no-cache` with PNG results.
    pub no_cache: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayProfile::Standard.config()
    }
}

impl GatewayConfig {
    /// Create a config with the standard profile's values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Set the route prefix. Trailing slashes are dropped and a leading
    /// slash is added, so `"api/"` and `"/api"` are equivalent.
    pub fn with_route_prefix(mut self, prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        self.route_prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn with_payload_limit(mut self, limit: PayloadLimit) -> Self {
        self.payload_limit = limit;
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Full path of an image route under the configured prefix.
    pub fn route(&self, path: &str) -> String {
        format!("{}{}", self.route_prefix, path)
    }
}
