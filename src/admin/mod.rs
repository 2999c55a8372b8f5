//! Local status endpoints.
//!
//! Served by the shield itself, never proxied. The diagnostics endpoint sits
//! under the default gated `/debug/*` subtree; liveness is always ungated.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::state::AppState;
use self::handlers::{debug_shield, shield_health};

/// Ungated liveness endpoint.
pub const LIVENESS_PATH: &str = "/shield-health";
/// Diagnostics endpoint.
pub const DIAGNOSTICS_PATH: &str = "/debug/shield";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(LIVENESS_PATH, get(shield_health))
        .route(DIAGNOSTICS_PATH, get(debug_shield))
}
