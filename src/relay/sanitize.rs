//! Backend error scrubbing.
//!
//! Backend frames that describe an error are rewritten before they reach
//! the client. Correlation fields survive so the client can still match a
//! failed response to its request; only the detail is replaced.
//!
//! Binary frames holding UTF-8 JSON are inspected the same way as text and
//! keep their opcode after rewriting.

use serde_json::{json, Map, Value};

use crate::relay::frame::{CloseInfo, Frame, CLOSE_INTERNAL_ERROR};

/// What kind of backend frame was scrubbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    ErrorEnvelope,
    CloseReason,
}

/// Original backend detail removed from a frame. Logged at debug, then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFault {
    pub kind: FaultKind,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ErrorSanitizer {
    message: String,
    close_reason: String,
}

impl ErrorSanitizer {
    pub fn new(message: impl Into<String>, close_reason: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            close_reason: close_reason.into(),
        }
    }

    /// Rewrite one backend-to-client frame.
    pub fn sanitize(&self, frame: Frame) -> (Frame, Option<RelayFault>) {
        match frame {
            Frame::Text(text) => match self.scrub_envelope(&text) {
                Some((scrubbed, fault)) => (Frame::Text(scrubbed), Some(fault)),
                None => (Frame::Text(text), None),
            },
            Frame::Binary(data) => {
                let scrubbed = std::str::from_utf8(&data)
                    .ok()
                    .and_then(|text| self.scrub_envelope(text));
                match scrubbed {
                    Some((scrubbed, fault)) => (Frame::Binary(scrubbed.into_bytes()), Some(fault)),
                    None => (Frame::Binary(data), None),
                }
            }
            Frame::Close(Some(info)) if !info.is_normal() && !info.reason.is_empty() => {
                let fault = RelayFault {
                    kind: FaultKind::CloseReason,
                    detail: info.reason,
                };
                (
                    Frame::Close(Some(CloseInfo::new(info.code, &self.close_reason))),
                    Some(fault),
                )
            }
            other => (other, None),
        }
    }

    /// Close frame sent to the client when the backend vanished.
    pub fn backend_lost(&self) -> Frame {
        Frame::close(CLOSE_INTERNAL_ERROR, &self.close_reason)
    }

    /// The rewritten envelope, or `None` if `text` is not a JSON error envelope.
    fn scrub_envelope(&self, text: &str) -> Option<(String, RelayFault)> {
        let mut object = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(object)) if is_error_envelope(&object) => object,
            _ => return None,
        };

        let detail = object
            .get("error")
            .filter(|e| !e.is_null())
            .or_else(|| object.get("message"))
            .map(Value::to_string)
            .unwrap_or_default();

        object.insert("error".to_string(), json!({ "message": self.message }));
        if object.contains_key("message") {
            object.insert("message".to_string(), Value::String(self.message.clone()));
        }

        let fault = RelayFault {
            kind: FaultKind::ErrorEnvelope,
            detail,
        };
        Some((Value::Object(object).to_string(), fault))
    }
}

fn is_error_envelope(object: &Map<String, Value>) -> bool {
    if object.get("error").is_some_and(|e| !e.is_null()) {
        return true;
    }
    match object.get("type").and_then(Value::as_str) {
        Some("error") => true,
        Some("res") => object.get("ok") == Some(&Value::Bool(false)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERIC: &str = "The gateway encountered an error processing this request.";

    fn sanitizer() -> ErrorSanitizer {
        ErrorSanitizer::new(GENERIC, "Backend unavailable")
    }

    fn text_json(frame: &Frame) -> Value {
        match frame {
            Frame::Text(t) => serde_json::from_str(t).unwrap(),
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn failed_response_keeps_correlation_fields() {
        let raw = r#"{"type":"res","id":"42","ok":false,"error":{"code":"E_INTERNAL","message":"db at 10.0.0.5 refused"}}"#;
        let (frame, fault) = sanitizer().sanitize(Frame::Text(raw.into()));

        let value = text_json(&frame);
        assert_eq!(value["type"], "res");
        assert_eq!(value["id"], "42");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], json!({ "message": GENERIC }));

        let fault = fault.unwrap();
        assert_eq!(fault.kind, FaultKind::ErrorEnvelope);
        assert!(fault.detail.contains("10.0.0.5"));
    }

    #[test]
    fn error_type_with_top_level_message_is_scrubbed() {
        let raw = r#"{"type":"error","message":"stack trace here"}"#;
        let (frame, fault) = sanitizer().sanitize(Frame::Text(raw.into()));
        let value = text_json(&frame);
        assert_eq!(value["message"], GENERIC);
        assert_eq!(value["error"]["message"], GENERIC);
        assert!(!frame_contains(&frame, "stack trace"));
        assert!(fault.is_some());
    }

    #[test]
    fn ordinary_frames_pass_unchanged() {
        let cases = [
            Frame::Text(r#"{"type":"res","id":"1","ok":true,"payload":{}}"#.into()),
            Frame::Text(r#"{"type":"event","error":null}"#.into()),
            Frame::Text("not json".into()),
            Frame::Text("[1,2,3]".into()),
            Frame::Binary(vec![1, 2, 3]),
            Frame::Binary(vec![0xff, 0xfe, b'{']),
            Frame::Binary(br#"{"type":"res","id":"1","ok":true}"#.to_vec()),
            Frame::Ping(vec![]),
            Frame::close(1000, "done"),
            Frame::close(4000, ""),
            Frame::Close(None),
        ];
        for frame in cases {
            let (out, fault) = sanitizer().sanitize(frame.clone());
            assert_eq!(out, frame);
            assert!(fault.is_none());
        }
    }

    #[test]
    fn binary_error_envelope_is_scrubbed() {
        let raw = br#"{"type":"res","id":"9","ok":false,"error":"ENOENT /srv/secrets.json"}"#;
        let (frame, fault) = sanitizer().sanitize(Frame::Binary(raw.to_vec()));

        let value: Value = match &frame {
            Frame::Binary(data) => serde_json::from_slice(data).unwrap(),
            other => panic!("expected binary, got {:?}", other),
        };
        assert_eq!(value["id"], "9");
        assert_eq!(value["ok"], false);
        assert_eq!(value["error"], json!({ "message": GENERIC }));
        assert!(fault.unwrap().detail.contains("/srv/secrets.json"));
    }

    #[test]
    fn abnormal_close_reason_is_replaced() {
        let (frame, fault) = sanitizer().sanitize(Frame::close(4008, "token mismatch for abc"));
        assert_eq!(frame, Frame::close(4008, "Backend unavailable"));
        assert_eq!(fault.unwrap().detail, "token mismatch for abc");
    }

    #[test]
    fn backend_lost_is_internal_error() {
        assert_eq!(sanitizer().backend_lost(), Frame::close(1011, "Backend unavailable"));
    }

    fn frame_contains(frame: &Frame, needle: &str) -> bool {
        matches!(frame, Frame::Text(t) if t.contains(needle))
    }
}
