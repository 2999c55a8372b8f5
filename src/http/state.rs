//! Shared handler state.
//!
//! Everything derived from configuration lives in a [`Runtime`] snapshot
//! held in an `ArcSwap`. A reload builds a complete new snapshot and swaps
//! it in; a request loads the snapshot once and uses it throughout, so it
//! never sees half of an old config and half of a new one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::{EnvSource, ShieldConfig};
use crate::http::request::ProxyRequestBuilder;
use crate::identity::IdentityVerifier;
use crate::injection::InjectionConfig;
use crate::relay::ErrorSanitizer;
use crate::routing::{GatedPaths, InstanceRouter, RoutingError};

/// Configuration-derived components, rebuilt on reload.
#[derive(Debug)]
pub struct Runtime {
    pub config: ShieldConfig,
    pub gate: GatedPaths,
    pub builder: ProxyRequestBuilder,
    pub router: InstanceRouter,
    pub sanitizer: ErrorSanitizer,
}

impl Runtime {
    pub fn build(config: ShieldConfig) -> Result<Self, RoutingError> {
        let router = InstanceRouter::new(config.environment.clone(), &config.backend)?;
        let gate = GatedPaths::compile(&config.identity.gated_paths);
        let builder = ProxyRequestBuilder::new(InjectionConfig::from_rules(&config.injection.params))
            .with_injection_logging(config.observability.log_injection);
        let sanitizer = ErrorSanitizer::new(
            config.relay.client_error_message.clone(),
            config.relay.client_close_reason.clone(),
        );

        Ok(Self {
            config,
            gate,
            builder,
            router,
            sanitizer,
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeouts.connect_secs)
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<ArcSwap<Runtime>>,
    pub verifier: Arc<IdentityVerifier>,
    /// Environment snapshot; the injection value source.
    pub secrets: Arc<EnvSource>,
    pub client: Client<HttpConnector, Body>,
    pub started: Instant,
}

impl AppState {
    pub fn new(runtime: Runtime, verifier: IdentityVerifier, secrets: EnvSource) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(runtime.connect_timeout()));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            runtime: Arc::new(ArcSwap::from_pointee(runtime)),
            verifier: Arc::new(verifier),
            secrets: Arc::new(secrets),
            client,
            started: Instant::now(),
        }
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        self.runtime.load_full()
    }

    /// Swap in a rebuilt runtime. Instances whose address is unchanged keep
    /// their health; the body limit and request deadline apply from the next
    /// request.
    pub fn reload(&self, config: ShieldConfig) -> Result<(), RoutingError> {
        let current = self.runtime();
        if config.listener.bind_address != current.config.listener.bind_address {
            tracing::warn!(
                bind_address = %config.listener.bind_address,
                "Listener address changes take effect after a restart"
            );
        }
        let mut runtime = Runtime::build(config)?;
        runtime.router.adopt_instances(&current.router);
        tracing::info!(
            instance = %runtime.router.route().id(),
            gated_patterns = runtime.gate.len(),
            "Runtime configuration reloaded"
        );
        self.runtime.store(Arc::new(runtime));
        Ok(())
    }
}
