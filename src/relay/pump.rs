//! Bidirectional frame pump.
//!
//! # Data Flow
//! ```text
//! client stream ──────────────────────────→ backend sink
//! client sink   ←── ErrorSanitizer ←──────── backend stream
//! ```
//!
//! Both directions run under one `select!`; whichever finishes first
//! decides how the other side is closed, and the unfinished direction is
//! dropped. There is no half-open state and no idle timeout.
//!
//! Closing the surviving side is bounded by `close_timeout`; a peer that
//! stops reading is dropped rather than awaited.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};

use crate::observability::metrics;
use crate::relay::frame::{Frame, CLOSE_GOING_AWAY};
use crate::relay::sanitize::ErrorSanitizer;
use crate::relay::state::{RelaySession, SocketState};

/// Why one direction stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// The source sent a close frame, which was forwarded.
    PeerClosed,
    /// The source ended or failed without a close frame.
    SourceLost(Option<String>),
    /// Writing to the sink failed.
    SinkFailed(String),
}

/// How the relay as a whole ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    Client(PumpEnd),
    Backend(PumpEnd),
}

/// Client sockets and backend sockets, split into read and write halves.
pub struct RelayHalves<CS, CK, BS, BK> {
    pub client_stream: CS,
    pub client_sink: CK,
    pub backend_stream: BS,
    pub backend_sink: BK,
}

/// Relay frames until either side closes, then close the other side.
pub async fn run_relay<CS, CK, BS, BK, CE, BE>(
    halves: RelayHalves<CS, CK, BS, BK>,
    sanitizer: &ErrorSanitizer,
    session: &RelaySession,
    close_timeout: Duration,
) -> RelayEnd
where
    CS: Stream<Item = Result<Frame, CE>> + Unpin,
    BS: Stream<Item = Result<Frame, BE>> + Unpin,
    CK: Sink<Frame> + Unpin,
    BK: Sink<Frame> + Unpin,
    CK::Error: Display,
    BK::Error: Display,
    CE: Display,
    BE: Display,
{
    let RelayHalves {
        mut client_stream,
        mut client_sink,
        mut backend_stream,
        mut backend_sink,
    } = halves;

    session.open();

    let end = tokio::select! {
        end = pump(&mut client_stream, &mut backend_sink, |frame| {
            session.count_to_backend();
            frame
        }) => RelayEnd::Client(end),
        end = pump(&mut backend_stream, &mut client_sink, |frame| {
            session.count_to_client();
            let (frame, fault) = sanitizer.sanitize(frame);
            if let Some(fault) = fault {
                session.count_fault();
                metrics::record_relay_fault();
                tracing::debug!(
                    session = %session.id(),
                    kind = ?fault.kind,
                    detail = %fault.detail,
                    "Sanitized backend error frame"
                );
            }
            frame
        }) => RelayEnd::Backend(end),
    };

    let teardown = async {
        match &end {
            RelayEnd::Client(PumpEnd::PeerClosed) => {
                session.backend.advance(SocketState::Closing);
            }
            RelayEnd::Client(PumpEnd::SourceLost(_)) | RelayEnd::Backend(PumpEnd::SinkFailed(_)) => {
                session.backend.advance(SocketState::Closing);
                let _ = backend_sink.send(Frame::close(CLOSE_GOING_AWAY, "")).await;
            }
            RelayEnd::Backend(PumpEnd::PeerClosed) => {
                session.client.advance(SocketState::Closing);
            }
            RelayEnd::Backend(PumpEnd::SourceLost(_)) | RelayEnd::Client(PumpEnd::SinkFailed(_)) => {
                session.client.advance(SocketState::Closing);
                let _ = client_sink.send(sanitizer.backend_lost()).await;
            }
        }

        let _ = client_sink.close().await;
        let _ = backend_sink.close().await;
    };
    if tokio::time::timeout(close_timeout, teardown).await.is_err() {
        tracing::warn!(
            session = %session.id(),
            timeout_ms = close_timeout.as_millis() as u64,
            "Relay close handshake timed out, dropping sockets"
        );
    }
    session.client.advance(SocketState::Closed);
    session.backend.advance(SocketState::Closed);

    end
}

/// Forward frames from `source` to `sink` in order until a close frame,
/// the end of the source, or a write failure.
async fn pump<S, K, E, F>(source: &mut S, sink: &mut K, mut map: F) -> PumpEnd
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    K: Sink<Frame> + Unpin,
    K::Error: Display,
    E: Display,
    F: FnMut(Frame) -> Frame,
{
    loop {
        let frame = match source.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return PumpEnd::SourceLost(Some(e.to_string())),
            None => return PumpEnd::SourceLost(None),
        };

        let frame = map(frame);
        let is_close = frame.is_close();
        if let Err(e) = sink.send(frame).await {
            return PumpEnd::SinkFailed(e.to_string());
        }
        if is_close {
            return PumpEnd::PeerClosed;
        }
    }
}
