//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Turn a prepared backend request into a WebSocket client handshake
//! - Dial the backend before accepting the client upgrade
//! - Hand both sockets to the relay
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Design Decisions
//! - A dead backend yields 502 to the client instead of an upgrade that
//!   closes immediately
//! - The client's `sec-websocket-key` is reused so the backend's accept
//!   value is the one the client expects
//! - Extensions are stripped; the relay does not negotiate compression
//! - The backend's selected subprotocol is offered to the client

use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{header, HeaderValue, Request, Version};
use axum::response::Response;
use futures_util::{future, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::ShieldError;
use crate::http::request::ProxyPreparation;
use crate::observability::metrics;
use crate::relay::{run_relay, ErrorSanitizer, Frame, RelayHalves, RelaySession};

type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// True if the headers ask for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &axum::http::HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Backend handshake request for a prepared upgrade.
pub fn backend_handshake(prep: &ProxyPreparation) -> Result<Request<()>, ShieldError> {
    let mut url: Url = prep.resolved_url.clone();
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| ShieldError::Internal(format!("cannot use {} scheme for {}", scheme, url)))?;

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(ShieldError::Internal("backend URL has no host".into())),
    };

    let mut builder = Request::builder()
        .method("GET")
        .uri(url.as_str())
        .version(Version::HTTP_11);
    if let Some(headers) = builder.headers_mut() {
        for (name, value) in prep.request.headers() {
            if name == header::HOST || name == header::SEC_WEBSOCKET_EXTENSIONS {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        let host = HeaderValue::from_str(&host)
            .map_err(|e| ShieldError::Internal(e.to_string()))?;
        headers.insert(header::HOST, host);
    }
    builder
        .body(())
        .map_err(|e| ShieldError::Internal(e.to_string()))
}

/// Dial the backend, then accept the client upgrade and relay.
pub async fn proxy_websocket(
    upgrade: WebSocketUpgrade,
    prep: ProxyPreparation,
    sanitizer: ErrorSanitizer,
    connect_timeout: Duration,
) -> Result<Response, ShieldError> {
    let handshake = backend_handshake(&prep)?;

    let (backend, response) = tokio::time::timeout(connect_timeout, connect_async(handshake))
        .await
        .map_err(|_| ShieldError::Upstream("backend websocket handshake timed out".into()))?
        .map_err(|e| ShieldError::Upstream(e.to_string()))?;

    let protocol = response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let upgrade = match protocol {
        Some(protocol) => upgrade.protocols([protocol]),
        None => upgrade,
    };

    Ok(upgrade
        .on_failed_upgrade(|e| {
            tracing::warn!(error = %e, "Client WebSocket upgrade failed after backend dial");
        })
        .on_upgrade(move |client| relay_session(client, backend, sanitizer, connect_timeout)))
}

async fn relay_session(
    client: WebSocket,
    backend: BackendSocket,
    sanitizer: ErrorSanitizer,
    close_timeout: Duration,
) {
    let session = RelaySession::new();
    metrics::relay_opened();
    tracing::info!(session = %session.id(), "WebSocket relay opened");

    let (client_sink, client_stream) = client.split();
    let (backend_sink, backend_stream) = backend.split();

    let halves = RelayHalves {
        client_stream: client_stream.map(|msg| msg.map(Frame::from_client)),
        client_sink: client_sink
            .with(|frame: Frame| future::ready(Ok::<_, axum::Error>(frame.into_client()))),
        backend_stream: backend_stream.filter_map(|msg| {
            future::ready(match msg {
                Ok(msg) => Frame::from_backend(msg).map(Ok),
                Err(e) => Some(Err(e)),
            })
        }),
        backend_sink: backend_sink
            .with(|frame: Frame| future::ready(Ok::<_, tungstenite::Error>(frame.into_backend()))),
    };

    let end = run_relay(halves, &sanitizer, &session, close_timeout).await;

    metrics::relay_closed();
    tracing::info!(
        session = %session.id(),
        end = ?end,
        frames_to_backend = session.frames_to_backend(),
        frames_to_client = session.frames_to_client(),
        faults = session.faults(),
        duration_ms = session.duration().as_millis() as u64,
        "WebSocket relay closed"
    );
}
