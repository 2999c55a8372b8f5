//! Request body limit and request deadline.
//!
//! Both are read from the runtime snapshot on every request, so a reload
//! applies to the next request without a restart.

use std::time::Duration;

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
    BoxError,
};
use futures_util::StreamExt;

use crate::error::ShieldError;
use crate::http::state::AppState;

pub async fn request_limits(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (max_body, deadline) = {
        let runtime = state.runtime();
        (
            runtime.config.listener.max_body_bytes,
            Duration::from_secs(runtime.config.timeouts.request_secs),
        )
    };

    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .or_else(|| req.body().size_hint().exact());
    let req = match declared {
        Some(len) if len > max_body as u64 => {
            tracing::warn!(length = len, limit = max_body, "Request body over limit");
            return ShieldError::PayloadTooLarge(max_body).into_response();
        }
        Some(_) => req,
        None => req.map(|body| limit_body(body, max_body)),
    };

    match tokio::time::timeout(deadline, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(timeout_secs = deadline.as_secs(), "Request deadline exceeded");
            ShieldError::Timeout(deadline).into_response()
        }
    }
}

/// A body of unknown length fails once more than `limit` bytes have been read.
fn limit_body(body: Body, limit: usize) -> Body {
    let mut seen = 0usize;
    Body::from_stream(body.into_data_stream().map(
        move |chunk| -> Result<Bytes, BoxError> {
            let chunk = chunk.map_err(BoxError::from)?;
            seen += chunk.len();
            if seen > limit {
                return Err(format!("request body exceeds {} bytes", limit).into());
            }
            Ok(chunk)
        },
    ))
}
