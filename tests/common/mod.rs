//! Shared utilities for integration testing.
//!
//! Mock backends, a mock key set endpoint, assertion minting, and a helper
//! that runs the shield on a fixed port.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    extract::{ws::Message, ws::WebSocket, OriginalUri, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use gateway_shield::config::{EnvSource, ShieldConfig};
use gateway_shield::http::HttpServer;
use gateway_shield::lifecycle::Shutdown;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing-key-1.pem");
pub const OTHER_KEY_PEM: &str = include_str!("../fixtures/signing-key-2.pem");
pub const KEY_JWK: &str = include_str!("../fixtures/key-1.jwk.json");

pub const AUDIENCE: &str = "aud-integration";
pub const ISSUER: &str = "https://team.example.com";
pub const TOKEN: &str = "integration-secret";

async fn serve(addr: SocketAddr, app: Router) {
    let listener = TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
}

/// Echo what the backend received: path, query, and selected headers.
async fn echo(OriginalUri(uri): OriginalUri, headers: HeaderMap) -> Json<Value> {
    Json(json!({
        "path": uri.path(),
        "query": uri.query(),
        "host": headers.get(header::HOST).and_then(|v| v.to_str().ok()),
    }))
}

/// Redirect that echoes the credential back, as a login redirect would.
async fn redirect(OriginalUri(uri): OriginalUri) -> Response {
    let location = format!("/login?{}", uri.query().unwrap_or_default());
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Start an HTTP backend that echoes requests and serves `/ws`.
///
/// The WebSocket endpoint echoes text frames, with two commands:
/// `fail` answers with an error envelope carrying internal detail, and
/// `crash` drops the connection without a close frame.
pub async fn start_backend(addr: SocketAddr) {
    let app = Router::new()
        .route("/redirect", get(redirect))
        .route("/ws", get(ws_backend))
        .fallback(echo);
    serve(addr, app).await;
}

async fn ws_backend(upgrade: WebSocketUpgrade) -> Response {
    upgrade
        .protocols(["gateway.v1"])
        .on_upgrade(ws_session)
}

async fn ws_session(mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        match message {
            Message::Text(text) if text.as_str() == "fail" => {
                let envelope = json!({
                    "type": "res",
                    "id": "7",
                    "ok": false,
                    "error": { "message": "connect ECONNREFUSED 10.1.2.3:5432" },
                });
                if socket.send(Message::Text(envelope.to_string().into())).await.is_err() {
                    return;
                }
            }
            Message::Text(text) if text.as_str() == "crash" => return,
            Message::Text(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            Message::Close(_) => return,
            _ => {}
        }
    }
}

/// Start a key set endpoint serving the fixture key at `/certs`.
pub async fn start_key_server(addr: SocketAddr) {
    let jwk: Value = serde_json::from_str(KEY_JWK).unwrap();
    let app = Router::new().route(
        "/certs",
        get(move || {
            let jwk = jwk.clone();
            async move { Json(json!({ "keys": [jwk] })) }
        }),
    );
    serve(addr, app).await;
}

/// Mint an assertion signed by `pem` with the fixture key id.
pub fn mint_with(pem: &str, email: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("key-1".to_string());
    let claims = json!({
        "email": email,
        "name": "Integration User",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": jsonwebtoken::get_current_timestamp() + 300,
    });
    encode(
        &header,
        &claims,
        &EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
    )
    .unwrap()
}

pub fn mint(email: &str) -> String {
    mint_with(SIGNING_KEY_PEM, email)
}

/// Configuration pointing at a local backend and key server.
pub fn shield_config(proxy: SocketAddr, backend: SocketAddr, keys: Option<SocketAddr>) -> ShieldConfig {
    let mut config = ShieldConfig::default();
    config.listener.bind_address = proxy.to_string();
    config.backend.address = backend.to_string();
    config.health.enabled = false;
    if let Some(keys) = keys {
        config.identity.trust_domain = Some("team.example.com".into());
        config.identity.audience = Some(AUDIENCE.into());
        config.identity.certs_url = Some(format!("http://{}/certs", keys));
    }
    config
}

pub fn env_with_token() -> EnvSource {
    EnvSource::from_pairs([("GATEWAY_TOKEN", TOKEN)])
}

/// Run the shield until the returned handle is triggered.
pub async fn start_shield(config: ShieldConfig, env: EnvSource) -> Shutdown {
    let addr = config.listener.bind_address.clone();
    let shutdown = Shutdown::new();
    let (_, config_updates) = mpsc::unbounded_channel();
    let server = HttpServer::new(config, env).unwrap();
    let listener = TcpListener::bind(&addr).await.unwrap();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    shutdown
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Send a GET with the request target written exactly as given; HTTP clients
/// would otherwise resolve dot segments before sending. Returns status and body.
pub async fn raw_get(addr: SocketAddr, target: &str, headers: &[(&str, &str)]) -> (u16, String) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut request = format!("GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n", target, addr);
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response).into_owned();
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap();
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
