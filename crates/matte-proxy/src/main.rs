//! matte proxy.
//!
//! Serves HTTPS on port 8443 (self-signed for localhost unless a
//! certificate is supplied) and forwards to a plain-HTTP matte gateway.

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use matte_proxy::config::{DEFAULT_FALLBACK_PORT, DEFAULT_PORT};
use matte_proxy::server::{self, ServerConfig};
use matte_proxy::{ListenerConfig, ProxyConfig, TlsMode, Upstream};
use matte_telemetry::{LogFormat, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(
    name = "matte-proxy",
    about = "TLS-terminating reverse proxy for the matte gateway",
    version
)]
struct Cli {
    /// Gateway base URL, e.g. http://127.0.0.1:8000.
    #[arg(long, env = "UPSTREAM_URL")]
    upstream: String,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Plain-HTTP port used when TLS setup fails.
    #[arg(long, env = "FALLBACK_PORT", default_value_t = DEFAULT_FALLBACK_PORT)]
    fallback_port: u16,

    /// TLS mode.
    #[arg(long, env = "TLS_MODE", value_enum, default_value_t = TlsMode::Auto)]
    tls: TlsMode,

    /// PEM certificate (generated if neither it nor the key exists).
    #[arg(long, env = "TLS_CERT", default_value = "cert.pem")]
    cert: PathBuf,

    /// PEM private key.
    #[arg(long, env = "TLS_KEY", default_value = "key.pem")]
    key: PathBuf,

    /// Upstream timeout for image requests, in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    request_timeout_secs: u64,

    /// Upstream timeout for health checks, in seconds.
    #[arg(long, env = "HEALTH_TIMEOUT_SECS", default_value_t = 5)]
    health_timeout_secs: u64,

    /// Log level (overridden by RUST_LOG).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format (json or pretty).
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(log_format) = LogFormat::parse(&cli.log_format) else {
        eprintln!("error: invalid log format: {}", cli.log_format);
        return ExitCode::from(2);
    };
    let telemetry = TelemetryConfig::new()
        .with_service_name("matte-proxy")
        .with_log_level(cli.log_level.clone())
        .with_log_format(log_format);
    if let Err(e) = matte_telemetry::init(&telemetry) {
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "proxy failed");
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    anyhow::ensure!(
        cli.request_timeout_secs > 0 && cli.health_timeout_secs > 0,
        "timeouts must be at least one second"
    );

    let upstream = Upstream::parse(&cli.upstream)?;
    let proxy = ProxyConfig::new(upstream)
        .with_request_timeout(Duration::from_secs(cli.request_timeout_secs))
        .with_health_timeout(Duration::from_secs(cli.health_timeout_secs));
    let listener = ListenerConfig {
        host: cli.host,
        port: cli.port,
        fallback_port: cli.fallback_port,
        tls: cli.tls,
        cert_path: cli.cert,
        key_path: cli.key,
    };

    matte_telemetry::log_startup!(
        version = env!("CARGO_PKG_VERSION"),
        upstream = %proxy.upstream.as_str(),
        port = listener.port,
        tls_mode = ?listener.tls,
        request_timeout_secs = cli.request_timeout_secs,
        "proxy starting"
    );

    server::run(ServerConfig { listener, proxy }).await
}
