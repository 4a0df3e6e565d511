//! Proxy listeners.
//!
//! HTTPS connections are accepted one by one, handshaken with rustls and
//! served with hyper's HTTP/1.1 connection driver. Plain HTTP goes through
//! `axum::serve`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;

use crate::config::{ListenerConfig, ProxyConfig, TlsMode};
use crate::router::{create_router, Binding, Protocol};
use crate::tls::{self, TlsMaterial};

/// Server configuration.
pub struct ServerConfig {
    pub listener: ListenerConfig,
    pub proxy: ProxyConfig,
}

/// Run the proxy until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let listener = config.listener;
    let proxy = Arc::new(config.proxy);

    let (tls_config, binding) = select_listener(&listener);
    let app = create_router(proxy, binding)?;
    let tcp = TcpListener::bind(SocketAddr::new(listener.host, binding.port)).await?;
    log_listening(&tcp, binding, &listener)?;

    match tls_config {
        Some(tls_config) => serve_tls(tcp, tls_config, app, shutdown_signal()).await?,
        None => {
            axum::serve(tcp, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?
        }
    }

    matte_telemetry::log_shutdown!("proxy stopped");
    Ok(())
}

/// Pick the listener before anything binds: HTTPS on the main port when the
/// certificate pair is usable, plain HTTP otherwise.
///
/// A deliberate plain listener (`--tls off`) takes the main port. A fallback
/// keeps off it so clients expecting HTTPS there fail loudly.
fn select_listener(listener: &ListenerConfig) -> (Option<Arc<rustls::ServerConfig>>, Binding) {
    match listener.tls {
        TlsMode::Off => (
            None,
            Binding {
                port: listener.port,
                protocol: Protocol::Http,
            },
        ),
        TlsMode::Auto => match prepare_tls(listener) {
            Ok(tls_config) => (
                Some(tls_config),
                Binding {
                    port: listener.port,
                    protocol: Protocol::Https,
                },
            ),
            Err(e) => {
                matte_telemetry::log_tls_fallback!(
                    error = %e,
                    fallback_port = listener.fallback_port,
                    "TLS unavailable, serving plain HTTP"
                );
                (
                    None,
                    Binding {
                        port: listener.fallback_port,
                        protocol: Protocol::Http,
                    },
                )
            }
        },
    }
}

fn prepare_tls(listener: &ListenerConfig) -> Result<Arc<rustls::ServerConfig>, tls::TlsError> {
    let material = TlsMaterial {
        cert_path: listener.cert_path.clone(),
        key_path: listener.key_path.clone(),
    };
    if tls::ensure_material(&material)? {
        tracing::info!(
            cert = %material.cert_path.display(),
            key = %material.key_path.display(),
            "generated self-signed certificate for localhost"
        );
    }
    tls::load_server_config(&material)
}

fn log_listening(
    tcp: &TcpListener,
    binding: Binding,
    listener: &ListenerConfig,
) -> std::io::Result<()> {
    let address = tcp.local_addr()?;
    matte_telemetry::log_listening!(
        address = %address,
        protocol = binding.protocol.as_str(),
        tls_mode = ?listener.tls,
        "proxy listening"
    );
    Ok(())
}

/// Serve `app` over TLS until `shutdown` resolves.
///
/// A failed handshake or a broken connection only affects that connection.
/// On shutdown the listener stops accepting, open connections finish their
/// in-flight request and close, and the call returns once all are done.
pub async fn serve_tls(
    listener: TcpListener,
    tls_config: Arc<rustls::ServerConfig>,
    app: Router,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    let acceptor = TlsAcceptor::from(tls_config);
    let (closing_tx, closing_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        while connections.try_join_next().is_some() {}

        let (stream, remote) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            () = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        let mut closing = closing_rx.clone();

        connections.spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    tracing::debug!(remote = %remote, error = %e, "TLS handshake failed");
                    return;
                }
            };

            let service = service_fn(move |req: Request<Incoming>| app.clone().oneshot(req));
            let conn = http1::Builder::new().serve_connection(TokioIo::new(tls_stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = closing.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.as_mut().await
                }
            };
            if let Err(e) = result {
                tracing::debug!(remote = %remote, error = %e, "connection error");
            }
        });
    }

    drop(listener);
    let _ = closing_tx.send(true);
    tracing::debug!(open = connections.len(), "draining TLS connections");
    while connections.join_next().await.is_some() {}
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
