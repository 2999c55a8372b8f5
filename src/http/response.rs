//! Backend response handling.
//!
//! # Responsibilities
//! - Stream the backend response back to the client
//! - Remove injected parameter names from redirect targets
//!
//! # Design Decisions
//! - Bodies are streamed, never buffered
//! - Only `Location` can echo the backend URL back; other headers pass

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use hyper::body::Incoming;

use crate::injection::strip_query_params;

/// Remove `names` from a `Location` header. Returns true if it changed.
pub fn scrub_location<S: AsRef<str>>(headers: &mut HeaderMap, names: &[S]) -> bool {
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let scrubbed = strip_query_params(location, names);
    if scrubbed == location {
        return false;
    }
    match HeaderValue::from_str(&scrubbed) {
        Ok(value) => {
            headers.insert(header::LOCATION, value);
            true
        }
        Err(_) => {
            headers.remove(header::LOCATION);
            true
        }
    }
}

/// Convert a backend response for the client.
pub fn to_client<S: AsRef<str>>(response: hyper::Response<Incoming>, names: &[S]) -> Response {
    let (mut parts, body) = response.into_parts();
    if scrub_location(&mut parts.headers, names) {
        tracing::debug!("Scrubbed injected parameters from Location header");
    }
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_loses_injected_params() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::LOCATION,
            HeaderValue::from_static("http://127.0.0.1:18789/login?token=secret&next=%2F"),
        );
        assert!(scrub_location(&mut headers, &["token"]));
        assert_eq!(headers[header::LOCATION], "http://127.0.0.1:18789/login?next=%2F");
    }

    #[test]
    fn clean_location_is_untouched() {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, HeaderValue::from_static("/home?tab=1"));
        assert!(!scrub_location(&mut headers, &["token"]));
        assert_eq!(headers[header::LOCATION], "/home?tab=1");

        let mut empty = HeaderMap::new();
        assert!(!scrub_location(&mut empty, &["token"]));
    }
}
