//! Library-neutral WebSocket frames.
//!
//! The client side speaks axum's `Message`, the backend side speaks
//! tungstenite's. Both are converted to [`Frame`] at the edges so the relay
//! loop does not care which socket it is reading.

use axum::extract::ws::{self as client_ws, Message as ClientMessage};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as BackendCloseFrame;
use tokio_tungstenite::tungstenite::Message as BackendMessage;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Maximum close reason length in bytes (125-byte control payload minus the code).
pub const MAX_CLOSE_REASON: usize = 123;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<CloseInfo>),
}

impl Frame {
    pub fn close(code: u16, reason: &str) -> Self {
        Frame::Close(Some(CloseInfo::new(code, reason)))
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Frame::Close(_))
    }

    pub fn from_client(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            ClientMessage::Binary(data) => Frame::Binary(data.to_vec()),
            ClientMessage::Ping(data) => Frame::Ping(data.to_vec()),
            ClientMessage::Pong(data) => Frame::Pong(data.to_vec()),
            ClientMessage::Close(close) => Frame::Close(
                close.map(|c| CloseInfo::new(c.code, c.reason.as_str())),
            ),
        }
    }

    pub fn into_client(self) -> ClientMessage {
        match self {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(data) => ClientMessage::Binary(data.into()),
            Frame::Ping(data) => ClientMessage::Ping(data.into()),
            Frame::Pong(data) => ClientMessage::Pong(data.into()),
            Frame::Close(close) => ClientMessage::Close(
                close
                    .and_then(CloseInfo::wire_safe)
                    .map(|c| client_ws::CloseFrame {
                        code: c.code,
                        reason: c.reason.into(),
                    }),
            ),
        }
    }

    /// Raw frames only appear on the write path; they yield `None`.
    pub fn from_backend(msg: BackendMessage) -> Option<Self> {
        Some(match msg {
            BackendMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            BackendMessage::Binary(data) => Frame::Binary(data.to_vec()),
            BackendMessage::Ping(data) => Frame::Ping(data.to_vec()),
            BackendMessage::Pong(data) => Frame::Pong(data.to_vec()),
            BackendMessage::Close(close) => Frame::Close(
                close.map(|c| CloseInfo::new(u16::from(c.code), c.reason.as_str())),
            ),
            BackendMessage::Frame(_) => return None,
        })
    }

    pub fn into_backend(self) -> BackendMessage {
        match self {
            Frame::Text(text) => BackendMessage::Text(text.into()),
            Frame::Binary(data) => BackendMessage::Binary(data.into()),
            Frame::Ping(data) => BackendMessage::Ping(data.into()),
            Frame::Pong(data) => BackendMessage::Pong(data.into()),
            Frame::Close(close) => BackendMessage::Close(
                close
                    .and_then(CloseInfo::wire_safe)
                    .map(|c| BackendCloseFrame {
                        code: CloseCode::from(c.code),
                        reason: c.reason.into(),
                    }),
            ),
        }
    }
}

/// Close code and reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    /// The reason is truncated to [`MAX_CLOSE_REASON`] bytes on a character
    /// boundary.
    pub fn new(code: u16, reason: &str) -> Self {
        Self {
            code,
            reason: truncate_reason(reason).to_string(),
        }
    }

    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL || self.code == CLOSE_GOING_AWAY
    }

    /// `None` for codes that must never be sent (1005, 1006, 1015).
    pub fn wire_safe(self) -> Option<Self> {
        match self.code {
            1005 | 1006 | 1015 => None,
            _ => Some(Self::new(self.code, &self.reason)),
        }
    }
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_reason_truncates_on_char_boundary() {
        let reason = "é".repeat(100); // 200 bytes
        let info = CloseInfo::new(4000, &reason);
        assert!(info.reason.len() <= MAX_CLOSE_REASON);
        assert_eq!(info.reason.len(), 122);
        assert!(reason.starts_with(&info.reason));
    }

    #[test]
    fn reserved_codes_are_not_sent() {
        for code in [1005, 1006, 1015] {
            let msg = Frame::close(code, "x").into_backend();
            assert_eq!(msg, BackendMessage::Close(None));
        }
        let msg = Frame::close(1011, "gone").into_backend();
        match msg {
            BackendMessage::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 1011);
                assert_eq!(frame.reason.as_str(), "gone");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn client_frames_convert_both_ways() {
        let frame = Frame::from_client(ClientMessage::Text("hi".into()));
        assert_eq!(frame, Frame::Text("hi".into()));
        match Frame::close(1000, "bye").into_client() {
            ClientMessage::Close(Some(c)) => {
                assert_eq!(c.code, 1000);
                assert_eq!(c.reason.as_str(), "bye");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
