//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: local status endpoints plus a catch-all proxy
//! - Wire up middleware (identity gate, request ID, tracing, timeout, body limit)
//! - Forward HTTP requests and WebSocket upgrades to the routed backend instance
//! - Apply configuration updates and run the scheduled instance probe
//! - Observability (metrics, correlation IDs)

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{FromRequestParts, State, WebSocketUpgrade},
    http::{HeaderName, Request},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{EnvSource, ShieldConfig};
use crate::error::ShieldError;
use crate::health::InstanceProbe;
use crate::http::middleware::{identity_gate, request_limits};
use crate::http::response;
use crate::http::state::{AppState, Runtime};
use crate::http::websocket;
use crate::identity::{IdentityVerifier, KeyFetchError};
use crate::observability::metrics;
use crate::routing::RoutingError;

pub const X_REQUEST_ID: &str = "x-request-id";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error("identity key source could not be created: {0}")]
    KeySource(#[from] KeyFetchError),
}

/// HTTP server for the shield.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new server. `secrets` is the injection value source.
    pub fn new(config: ShieldConfig, secrets: EnvSource) -> Result<Self, ServerError> {
        let verifier =
            IdentityVerifier::with_http(Duration::from_secs(config.identity.fetch_timeout_secs))?;
        Self::with_verifier(config, secrets, verifier)
    }

    /// Create a server with an explicit identity verifier.
    pub fn with_verifier(
        config: ShieldConfig,
        secrets: EnvSource,
        verifier: IdentityVerifier,
    ) -> Result<Self, ServerError> {
        if config.identity.bypass {
            tracing::warn!("Identity bypass is enabled; gated routes accept every caller");
        }
        let runtime = Runtime::build(config)?;
        let state = AppState::new(runtime, verifier, secrets);
        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let x_request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new()
            .merge(admin::routes())
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .layer(middleware::from_fn_with_state(state.clone(), identity_gate))
            .layer(middleware::from_fn_with_state(state.clone(), request_limits))
            .with_state(state)
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ShieldConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        let runtime = self.state.runtime();
        tracing::info!(
            address = %addr,
            environment = runtime.config.environment.as_deref().unwrap_or("(legacy)"),
            instance = %runtime.router.route().id(),
            backend = %runtime.router.route().address(),
            "HTTP server starting"
        );

        // Scheduled probe of the routed instance
        if runtime.config.health.enabled {
            let probe = InstanceProbe::new(self.state.clone());
            let probe_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                probe.run(probe_shutdown).await;
            });
        }

        // Config updates
        let reload_state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                if let Err(e) = reload_state.reload(config) {
                    tracing::error!(error = %e, "Rejected configuration update");
                }
            }
        });

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the backend instance, injects credentials, and forwards.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let response = match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            match &e {
                ShieldError::MissingCredential(_) => {
                    metrics::record_injection_failure();
                    tracing::error!(request_id = %request_id, error = %e, "Refusing to proxy without backend credential");
                }
                _ => {
                    tracing::warn!(request_id = %request_id, path = %path, error = %e, "Proxy request failed");
                }
            }
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start_time);
    response
}

async fn forward(state: &AppState, request: Request<Body>) -> Result<Response, ShieldError> {
    let runtime = state.runtime();
    let instance = runtime.router.route();

    let (mut parts, body) = request.into_parts();
    let upgrade = if websocket::is_websocket_upgrade(&parts.headers) {
        WebSocketUpgrade::from_request_parts(&mut parts, state).await.ok()
    } else {
        None
    };
    let request = Request::from_parts(parts, body);

    let prep = runtime
        .builder
        .prepare(request, instance.http_base(), state.secrets.as_ref())?;

    tracing::debug!(
        instance = %instance.id(),
        method = %prep.request.method(),
        path = %prep.resolved_url.path(),
        websocket = upgrade.is_some(),
        "Proxying request"
    );

    if let Some(upgrade) = upgrade {
        return websocket::proxy_websocket(
            upgrade,
            prep,
            runtime.sanitizer.clone(),
            runtime.connect_timeout(),
        )
        .await;
    }

    let backend_response = state
        .client
        .request(prep.request)
        .await
        .map_err(|e| ShieldError::Upstream(e.to_string()))?;

    Ok(response::to_client(
        backend_response,
        &runtime.builder.injection().target_names(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MISCONFIGURED_BODY;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(config: ShieldConfig, secrets: EnvSource) -> HttpServer {
        let verifier = IdentityVerifier::with_http(Duration::from_secs(1)).unwrap();
        HttpServer::with_verifier(config, secrets, verifier).unwrap()
    }

    async fn send(server: &HttpServer, uri: &str) -> (StatusCode, String, Option<String>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = server.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let request_id = response
            .headers()
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned(), request_id)
    }

    #[tokio::test]
    async fn liveness_answers_without_backend() {
        let server = server(ShieldConfig::default(), EnvSource::default());
        let (status, body, request_id) = send(&server, admin::LIVENESS_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"status\":\"ok\""), "{body}");
        assert!(request_id.is_some());
    }

    #[tokio::test]
    async fn gated_route_without_trust_settings_is_refused() {
        let server = server(
            ShieldConfig::default(),
            EnvSource::from_pairs([("GATEWAY_TOKEN", "secret")]),
        );
        let (status, body, _) = send(&server, "/_admin/devices").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, MISCONFIGURED_BODY);
    }

    #[tokio::test]
    async fn missing_credential_is_refused_before_dialing() {
        let server = server(ShieldConfig::default(), EnvSource::default());
        let (status, body, _) = send(&server, "/chat?session=main").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("GATEWAY_TOKEN"), "{body}");
        assert!(body.contains("missing_credential"), "{body}");
    }

    #[tokio::test]
    async fn body_limit_follows_reload() {
        let server = server(ShieldConfig::default(), EnvSource::default());
        let post = || {
            Request::builder()
                .method("POST")
                .uri("/chat")
                .body(Body::from("0123456789abcdef"))
                .unwrap()
        };

        // Within the default limit: refused later, for the missing credential.
        let response = server.router.clone().oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let mut config = ShieldConfig::default();
        config.listener.max_body_bytes = 8;
        server.state().reload(config).unwrap();

        let response = server.router.clone().oneshot(post()).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn request_deadline_follows_reload() {
        // Accepts connections and never answers.
        let silent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = ShieldConfig::default();
        config.backend.address = silent.local_addr().unwrap().to_string();
        config.timeouts.request_secs = 600;
        let server = server(config.clone(), EnvSource::from_pairs([("GATEWAY_TOKEN", "t")]));

        config.timeouts.request_secs = 1;
        server.state().reload(config).unwrap();

        let (status, _, _) = tokio::time::timeout(Duration::from_secs(5), send(&server, "/chat"))
            .await
            .expect("reloaded deadline was not applied");
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }
}
