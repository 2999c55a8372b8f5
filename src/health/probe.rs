//! Scheduled instance probe.
//!
//! # Responsibilities
//! - Periodically probe the routed backend instance
//! - Update its health state and the health gauge
//!
//! The probe resolves its target through `InstanceRouter::route()` and builds
//! its request with the same `ProxyRequestBuilder` as live traffic, so it
//! always checks the instance requests are actually sent to, with the same
//! credential.

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderValue, Request};
use tokio::sync::broadcast;
use tokio::time;

use crate::http::state::AppState;
use crate::observability::metrics;

pub struct InstanceProbe {
    state: AppState,
}

impl InstanceProbe {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.state.runtime().config.health.clone();
        if !config.enabled {
            tracing::info!("Instance probe disabled");
            return;
        }

        tracing::info!(
            interval = config.interval_secs,
            path = %config.path,
            "Instance probe starting"
        );

        let mut ticker = time::interval(Duration::from_secs(config.interval_secs.max(1)));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Instance probe received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe the routed instance once. Returns the observed result.
    pub async fn check(&self) -> bool {
        let runtime = self.state.runtime();
        let config = &runtime.config.health;
        let instance = runtime.router.route();

        let mut request = match Request::builder()
            .method("GET")
            .uri(config.path.as_str())
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build probe request");
                return false;
            }
        };
        request
            .headers_mut()
            .insert(header::USER_AGENT, HeaderValue::from_static("gateway-shield-probe"));

        let prep = match runtime
            .builder
            .prepare(request, instance.http_base(), self.state.secrets.as_ref())
        {
            Ok(prep) => prep,
            Err(e) => {
                tracing::warn!(instance = %instance.id(), error = %e, "Probe skipped: request could not be prepared");
                return false;
            }
        };

        let timeout = Duration::from_secs(config.timeout_secs);
        let healthy = match time::timeout(timeout, self.state.client.request(prep.request)).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(instance = %instance.id(), status = %response.status(), "Probe failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(instance = %instance.id(), error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(instance = %instance.id(), "Probe failed: timeout");
                false
            }
        };

        if healthy {
            instance.mark_success(config.healthy_threshold as usize);
        } else {
            instance.mark_failure(config.unhealthy_threshold as usize);
        }
        metrics::record_instance_health(instance.id().as_str(), instance.is_healthy());
        healthy
    }
}
