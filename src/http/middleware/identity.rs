//! Identity gate middleware.
//! Requires a verified identity on gated paths.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::admin::LIVENESS_PATH;
use crate::error::ShieldError;
use crate::http::state::AppState;
use crate::identity::IdentityError;
use crate::observability::metrics;
use crate::routing::canonical_path;

pub async fn identity_gate(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let runtime = state.runtime();
    let raw = req.uri().path();
    // Gate on the path the backend will see, not the one that was sent
    let path = canonical_path(runtime.router.route().http_base(), raw);

    // 1. Ungated paths pass straight through
    if raw == LIVENESS_PATH || !runtime.gate.is_gated(&path) {
        return next.run(req).await;
    }

    // 2. Verify
    let verified = state
        .verifier
        .authenticate(req.headers(), &runtime.config.identity)
        .await;
    match verified {
        Ok(identity) => {
            tracing::info!(
                email = %identity.email,
                path = %path,
                "Authenticated request"
            );
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(e) => {
            metrics::record_auth_failure(e.reason());
            match &e {
                IdentityError::Misconfigured(_) => {
                    tracing::error!(error = %e, path = %path, "Gated route hit without identity configuration");
                }
                IdentityError::KeySetUnavailable(_) => {
                    tracing::warn!(error = %e, "Identity key set unavailable");
                }
                _ => {
                    tracing::warn!(reason = e.reason(), path = %path, "Identity verification failed");
                }
            }
            ShieldError::from(e).into_response()
        }
    }
}
