//! matte gateway.
//!
//! Serves the background-removal API over plain HTTP. Put `matte-proxy`
//! in front of it when browsers need an HTTPS origin.

use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use matte_lib::auth::{AuthConfig, AuthMode, DEFAULT_API_KEY};
use matte_lib::config::{Disposition, GatewayProfile, PayloadLimit};
use matte_lib::remover::CommandRemover;
use matte_lib::server::{self, ServerConfig};
use matte_telemetry::{LogFormat, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "matte", about = "Background-removal HTTP gateway", version)]
struct Cli {
    /// Deployment preset; the options below override its values.
    #[arg(long, env = "MATTE_PROFILE", value_enum, default_value_t = GatewayProfile::Standard)]
    profile: GatewayProfile,

    /// Listen host.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Listen port (default: 8000, or 8080 for the bolt profile).
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Credential check applied to the image routes.
    #[arg(long, env = "AUTH_MODE", value_enum, default_value_t = AuthMode::Disabled)]
    auth_mode: AuthMode,

    /// Shared secret expected from clients when auth is enabled.
    #[arg(long, env = "API_KEY", default_value = DEFAULT_API_KEY, hide_env_values = true)]
    api_key: String,

    /// Prefix for the image routes, e.g. `/api`.
    #[arg(long, env = "ROUTE_PREFIX")]
    route_prefix: Option<String>,

    /// Maximum decoded image size in bytes (0 = unbounded).
    #[arg(long, env = "MAX_PAYLOAD_BYTES")]
    max_payload_bytes: Option<usize>,

    /// Maximum number of files in one batch request.
    #[arg(long, env = "MAX_BATCH_SIZE")]
    max_batch_size: Option<usize>,

    /// How multipart results are presented to browsers.
    #[arg(long, value_enum)]
    disposition: Option<Disposition>,

    /// External program that reads an image on stdin and writes a PNG to stdout.
    #[arg(long, env = "REMOVER_COMMAND", default_value = "rembg i - -")]
    remover_command: String,

    /// Kill the remover program after this many seconds (0 = no limit).
    #[arg(long, env = "REMOVER_TIMEOUT_SECS", default_value_t = 300)]
    remover_timeout_secs: u64,

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
        .with_service_name("matte")
        .with_log_level(cli.log_level.clone())
        .with_log_format(log_format);
    if let Err(e) = matte_telemetry::init(&telemetry) {
        eprintln!("error: {}", e);
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway failed");
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut gateway = cli
        .profile
        .config()
        .with_auth(AuthConfig::new(cli.auth_mode, cli.api_key));
    if let Some(prefix) = &cli.route_prefix {
        gateway = gateway.with_route_prefix(prefix);
    }
    if let Some(bytes) = cli.max_payload_bytes {
        gateway = gateway.with_payload_limit(PayloadLimit::from_bytes(bytes));
    }
    if let Some(max) = cli.max_batch_size {
        anyhow::ensure!(max > 0, "--max-batch-size must be at least 1");
        gateway = gateway.with_max_batch_size(max);
    }
    if let Some(disposition) = cli.disposition {
        gateway = gateway.with_disposition(disposition);
    }

    let mut remover = CommandRemover::from_command_line(&cli.remover_command)
        .ok_or_else(|| anyhow::anyhow!("--remover-command must not be empty"))?;
    if cli.remover_timeout_secs > 0 {
        remover = remover.with_timeout(Duration::from_secs(cli.remover_timeout_secs));
    }

    matte_telemetry::log_startup!(
        version = env!("CARGO_PKG_VERSION"),
        profile = ?cli.profile,
        service = %gateway.service_name,
        auth_mode = ?gateway.auth.mode(),
        route_prefix = %gateway.route_prefix,
        max_batch_size = gateway.max_batch_size,
        max_payload = %gateway.payload_limit.describe(),
        remover = %remover.program(),
        remover_timeout_secs = cli.remover_timeout_secs,
        "gateway starting"
    );
    if gateway.auth.uses_default_key() {
        tracing::warn!("authentication is enabled with the default API key; set API_KEY");
    }

    let port = cli.port.unwrap_or_else(|| cli.profile.default_port());
    server::run(ServerConfig {
        listen_addr: SocketAddr::new(cli.host, port),
        gateway,
        remover: Arc::new(remover),
    })
    .await
}
