//! Request-path errors and their HTTP mapping.
//!
//! | Error                  | Status | Body                               |
//! |------------------------|--------|------------------------------------|
//! | `MissingCredential`    | 500    | JSON, names of the missing keys    |
//! | `Unauthenticated`      | 401    | JSON, coarse reason code           |
//! | `KeySetUnavailable`    | 503    | JSON                               |
//! | `VerifierMisconfigured`| 500    | fixed text                         |
//! | `PayloadTooLarge`      | 413    | fixed text                         |
//! | `Timeout`              | 408    | fixed text                         |
//! | `Upstream`             | 502    | generic text                       |
//! | `Internal`             | 500    | generic text                       |
//!
//! Bodies never include credential values or backend error detail.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::http::request::PrepareError;
use crate::identity::IdentityError;
use crate::injection::InjectionError;

/// Body returned when a gated route is hit without trust settings.
pub const MISCONFIGURED_BODY: &str = "Identity verification is not configured. \
Set ACCESS_TEAM_DOMAIN and ACCESS_AUD, or set DEV_MODE=true for local development.";

/// Body returned when the backend cannot be reached.
pub const UPSTREAM_BODY: &str = "Backend unavailable";

#[derive(Debug, Error)]
pub enum ShieldError {
    #[error("backend credential unavailable: {0}")]
    MissingCredential(InjectionError),

    #[error("identity verification failed: {0}")]
    Unauthenticated(IdentityError),

    #[error("identity key set unavailable: {0}")]
    KeySetUnavailable(IdentityError),

    #[error("identity verifier misconfigured: {0}")]
    VerifierMisconfigured(IdentityError),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("request not completed within {0:?}")]
    Timeout(Duration),

    #[error("backend request failed: {0}")]
    Upstream(String),

    #[error("request could not be forwarded: {0}")]
    Internal(String),
}

impl From<InjectionError> for ShieldError {
    fn from(err: InjectionError) -> Self {
        ShieldError::MissingCredential(err)
    }
}

impl From<PrepareError> for ShieldError {
    fn from(err: PrepareError) -> Self {
        match err {
            PrepareError::Injection(e) => ShieldError::MissingCredential(e),
            other => ShieldError::Internal(other.to_string()),
        }
    }
}

impl From<IdentityError> for ShieldError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Misconfigured(_) => ShieldError::VerifierMisconfigured(err),
            IdentityError::KeySetUnavailable(_) => ShieldError::KeySetUnavailable(err),
            other => ShieldError::Unauthenticated(other),
        }
    }
}

impl ShieldError {
    pub fn status(&self) -> StatusCode {
        match self {
            ShieldError::MissingCredential(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShieldError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ShieldError::KeySetUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ShieldError::VerifierMisconfigured(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShieldError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ShieldError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            ShieldError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ShieldError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ShieldError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ShieldError::MissingCredential(err) => (
                status,
                Json(json!({
                    "error": "missing_credential",
                    "missing": err.missing(),
                })),
            )
                .into_response(),
            ShieldError::Unauthenticated(err) => (
                status,
                Json(json!({
                    "error": "unauthorized",
                    "reason": err.reason(),
                })),
            )
                .into_response(),
            ShieldError::KeySetUnavailable(_) => (
                status,
                Json(json!({ "error": "identity_unavailable" })),
            )
                .into_response(),
            ShieldError::VerifierMisconfigured(_) => (status, MISCONFIGURED_BODY).into_response(),
            ShieldError::PayloadTooLarge(_) => (status, "Request body too large").into_response(),
            ShieldError::Timeout(_) => (status, "Request timed out").into_response(),
            ShieldError::Upstream(_) => (status, UPSTREAM_BODY).into_response(),
            ShieldError::Internal(_) => (status, "Internal error").into_response(),
        }
    }
}
