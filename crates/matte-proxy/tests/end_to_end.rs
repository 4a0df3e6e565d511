//! End-to-end tests: a real gateway on an ephemeral port, fronted by the
//! proxy over plain HTTP and over TLS.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use matte_lib::auth::{AuthConfig, AuthMode};
use matte_lib::config::GatewayConfig;
use matte_lib::remover::{BackgroundRemover, RemovalError, PNG_SIGNATURE};
use matte_proxy::tls::{self, TlsMaterial};
use matte_proxy::{create_router, Binding, Protocol, ProxyConfig, Upstream};

const API_KEY: &str = "e2e-key";

/// Prefixes the input with a PNG signature.
struct EchoRemover;

impl BackgroundRemover for EchoRemover {
    fn remove(&self, image: &[u8]) -> Result<Vec<u8>, RemovalError> {
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend_from_slice(image);
        Ok(out)
    }
}

async fn spawn(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_gateway() -> SocketAddr {
    let config = GatewayConfig::default()
        .with_route_prefix("/api")
        .with_auth(AuthConfig::new(AuthMode::HeaderKey, API_KEY));
    spawn(matte_lib::api::create_router(Arc::new(config), Arc::new(EchoRemover))).await
}

fn proxy_config(gateway: SocketAddr) -> Arc<ProxyConfig> {
    let upstream = Upstream::parse(&format!("http://{}", gateway)).unwrap();
    Arc::new(ProxyConfig::new(upstream))
}

fn multipart(filename: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "e2e-boundary";
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\n\
         Content-Type: {ct}\r\n\r\n",
        b = boundary,
        f = filename,
        ct = content_type
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

#[tokio::test]
async fn test_plain_proxy_round_trip() {
    let gateway = start_gateway().await;
    let binding = Binding {
        port: 0,
        protocol: Protocol::Http,
    };
    let proxy = spawn(create_router(proxy_config(gateway), binding).unwrap()).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", proxy);

    // Multipart through the proxy, authenticated.
    let (content_type, body) = multipart("cat.jpg", "image/jpeg", b"jpeg-bytes");
    let resp = client
        .post(format!("{}/api/remove-bg", base))
        .header("content-type", content_type)
        .header("x-api-key", API_KEY)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=\"removed_cat.png\""
    );
    let png = resp.bytes().await.unwrap();
    assert!(png.starts_with(&PNG_SIGNATURE));
    assert!(png.ends_with(b"jpeg-bytes"));

    // Missing key: the gateway's 401 is relayed unchanged.
    let (content_type, body) = multipart("cat.jpg", "image/jpeg", b"jpeg-bytes");
    let resp = client
        .post(format!("{}/api/remove-bg", base))
        .header("content-type", content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");

    // Base64 route, with a data URL.
    let resp = client
        .post(format!("{}/api/remove-bg-base64", base))
        .header("x-api-key", API_KEY)
        .json(&json!({ "image": format!("data:image/png;base64,{}", STANDARD.encode(b"raw")) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["success"], true);
    let png = STANDARD.decode(json["result"].as_str().unwrap()).unwrap();
    assert!(png.ends_with(b"raw"));

    // Validation errors from the gateway keep their status.
    let resp = client
        .post(format!("{}/api/remove-bg-base64", base))
        .header("x-api-key", API_KEY)
        .json(&json!({ "image": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Health is annotated by the proxy.
    let json: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["proxy_status"], "healthy");
    assert_eq!(json["protocol"], "http");
}

#[tokio::test]
async fn test_tls_proxy_with_generated_certificate() {
    let gateway = start_gateway().await;

    let dir = tempfile::tempdir().unwrap();
    let material = TlsMaterial {
        cert_path: dir.path().join("cert.pem"),
        key_path: dir.path().join("key.pem"),
    };
    assert!(tls::ensure_material(&material).unwrap());
    let tls_config = tls::load_server_config(&material).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let binding = Binding {
        port: addr.port(),
        protocol: Protocol::Https,
    };
    let app = create_router(proxy_config(gateway), binding).unwrap();
    tokio::spawn(matte_proxy::server::serve_tls(
        listener,
        tls_config,
        app,
        std::future::pending(),
    ));

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();

    let json: Value = client
        .get(format!("https://127.0.0.1:{}/health", addr.port()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["protocol"], "https");
    assert_eq!(json["service"], "rembg-api");

    let resp = client
        .request(
            reqwest::Method::OPTIONS,
            format!("https://127.0.0.1:{}/api/remove-bg", addr.port()),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["access-control-max-age"], "86400");
}

#[tokio::test]
async fn test_tls_shutdown_lets_in_flight_request_finish() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remove-bg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(PNG_SIGNATURE.to_vec())
                .insert_header("content-type", "image/png")
                .set_delay(Duration::from_millis(800)),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let material = TlsMaterial {
        cert_path: dir.path().join("cert.pem"),
        key_path: dir.path().join("key.pem"),
    };
    tls::ensure_material(&material).unwrap();
    let tls_config = tls::load_server_config(&material).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let binding = Binding {
        port: addr.port(),
        protocol: Protocol::Https,
    };
    let app = create_router(proxy_config(*upstream.address()), binding).unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(matte_proxy::server::serve_tls(
        listener,
        tls_config,
        app,
        async move {
            let _ = stop_rx.await;
        },
    ));

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap();
    let (content_type, body) = multipart("cat.jpg", "image/jpeg", b"jpeg-bytes");
    let request = tokio::spawn(
        client
            .post(format!("https://127.0.0.1:{}/remove-bg", addr.port()))
            .header("content-type", content_type)
            .body(body)
            .send(),
    );

    // Stop while the upstream is still sitting on the request.
    tokio::time::sleep(Duration::from_millis(300)).await;
    stop_tx.send(()).unwrap();

    let resp = request.await.unwrap().unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");
    assert!(resp.bytes().await.unwrap().starts_with(&PNG_SIGNATURE));

    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("listener drained and returned")
        .unwrap()
        .unwrap();
}
