//! WebSocket relay through the shield: frames flow both ways, backend
//! error detail never reaches the client, and backend loss is reported
//! with a generic close.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

mod common;

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(proxy_addr: SocketAddr) -> ClientSocket {
    let mut request = format!("ws://{}/ws", proxy_addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("sec-websocket-protocol", "gateway.v1".parse().unwrap());

    let (socket, response) = connect_async(request).await.expect("Relay unreachable");
    assert_eq!(response.headers()["sec-websocket-protocol"], "gateway.v1");
    socket
}

/// Next non-control message, with a deadline.
async fn next_message(socket: &mut ClientSocket) -> Option<Message> {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("Timed out waiting for relay");
        match next {
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(message)) => return Some(message),
            Some(Err(WsError::ConnectionClosed)) | None => return None,
            Some(Err(e)) => panic!("relay error: {e}"),
        }
    }
}

#[tokio::test]
async fn test_frames_relay_in_both_directions() {
    let backend_addr: SocketAddr = "127.0.0.1:28601".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28602".parse().unwrap();

    common::start_backend(backend_addr).await;
    let config = common::shield_config(proxy_addr, backend_addr, None);
    let shutdown = common::start_shield(config, common::env_with_token()).await;

    let mut socket = connect(proxy_addr).await;
    for text in ["hello", r#"{"type":"req","id":"1","method":"ping"}"#] {
        socket.send(Message::Text(text.into())).await.unwrap();
        match next_message(&mut socket).await {
            Some(Message::Text(echoed)) => assert_eq!(echoed.as_str(), text),
            other => panic!("expected echo, got {:?}", other),
        }
    }

    socket.close(None).await.unwrap();
    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_error_detail_is_sanitized() {
    let backend_addr: SocketAddr = "127.0.0.1:28603".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28604".parse().unwrap();

    common::start_backend(backend_addr).await;
    let config = common::shield_config(proxy_addr, backend_addr, None);
    let generic = config.relay.client_error_message.clone();
    let shutdown = common::start_shield(config, common::env_with_token()).await;

    let mut socket = connect(proxy_addr).await;
    socket.send(Message::Text("fail".into())).await.unwrap();

    let text = match next_message(&mut socket).await {
        Some(Message::Text(text)) => text,
        other => panic!("expected error envelope, got {:?}", other),
    };
    assert!(!text.as_str().contains("10.1.2.3"), "{}", text.as_str());
    assert!(!text.as_str().contains("ECONNREFUSED"), "{}", text.as_str());

    let envelope: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(envelope["type"], "res");
    assert_eq!(envelope["id"], "7");
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["message"], generic.as_str());

    // The relay stays open after a scrubbed frame.
    socket.send(Message::Text("still here".into())).await.unwrap();
    match next_message(&mut socket).await {
        Some(Message::Text(echoed)) => assert_eq!(echoed.as_str(), "still here"),
        other => panic!("expected echo, got {:?}", other),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_backend_loss_closes_client_with_internal_error() {
    let backend_addr: SocketAddr = "127.0.0.1:28605".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28606".parse().unwrap();

    common::start_backend(backend_addr).await;
    let config = common::shield_config(proxy_addr, backend_addr, None);
    let reason = config.relay.client_close_reason.clone();
    let shutdown = common::start_shield(config, common::env_with_token()).await;

    let mut socket = connect(proxy_addr).await;
    socket.send(Message::Text("crash".into())).await.unwrap();

    match next_message(&mut socket).await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(frame.code, CloseCode::Error);
            assert_eq!(frame.reason.as_str(), reason);
        }
        other => panic!("expected close frame, got {:?}", other),
    }

    shutdown.trigger();
}

#[tokio::test]
async fn test_dead_backend_refuses_upgrade() {
    // Nothing listens on the backend port.
    let backend_addr: SocketAddr = "127.0.0.1:28607".parse().unwrap();
    let proxy_addr: SocketAddr = "127.0.0.1:28608".parse().unwrap();

    let config = common::shield_config(proxy_addr, backend_addr, None);
    let shutdown = common::start_shield(config, common::env_with_token()).await;

    let err = connect_async(format!("ws://{}/ws", proxy_addr))
        .await
        .expect_err("upgrade must fail without a backend");
    match err {
        WsError::Http(response) => assert_eq!(response.status(), 502),
        other => panic!("expected HTTP 502, got {other}"),
    }

    shutdown.trigger();
}
