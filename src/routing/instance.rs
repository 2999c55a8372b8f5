//! Backend instance routing.
//!
//! # Responsibilities
//! - Resolve the environment to a backend instance id (via the resolver)
//! - Map instance ids to addressable backend instances
//! - Track instance health reported by the scheduled probe
//!
//! # Design Decisions
//! - The environment is resolved once, when the router is built; the request
//!   path and the scheduled probe both take their instance from `route()`
//! - The resolved id always has an instance: an explicit table entry, or the
//!   fallback address
//! - The instance itself is opaque; no locking over it
//! - A rebuilt router adopts the previous router's instances where id and
//!   address are unchanged, so health survives a configuration reload

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use url::Url;

use crate::config::BackendConfig;
use crate::routing::resolver::{self, BackendInstanceId};

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// Errors building the instance table.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("backend address '{address}' for instance '{id}' is invalid: {source}")]
    InvalidAddress {
        id: String,
        address: String,
        #[source]
        source: url::ParseError,
    },
}

/// A single addressable backend instance.
#[derive(Debug)]
pub struct BackendInstance {
    id: BackendInstanceId,
    address: String,
    /// `http://<address>/`
    http_base: Url,

    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl BackendInstance {
    pub fn new(id: BackendInstanceId, address: &str) -> Result<Self, RoutingError> {
        let http_base =
            Url::parse(&format!("http://{}/", address)).map_err(|source| {
                RoutingError::InvalidAddress {
                    id: id.to_string(),
                    address: address.to_string(),
                    source,
                }
            })?;
        Ok(Self {
            id,
            address: address.to_string(),
            http_base,
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> &BackendInstanceId {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Base URL for HTTP requests to this instance.
    pub fn http_base(&self) -> &Url {
        &self.http_base
    }

    pub fn health(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if the instance is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health() != HealthState::Unhealthy
    }

    /// Report a successful probe.
    pub fn mark_success(&self, healthy_threshold: usize) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Healthy {
            return;
        }
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            tracing::info!(instance = %self.id, "Backend instance marked healthy");
        }
    }

    /// Report a failed probe.
    pub fn mark_failure(&self, unhealthy_threshold: usize) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.health() == HealthState::Unhealthy {
            return;
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            tracing::warn!(instance = %self.id, failures, "Backend instance marked unhealthy");
        }
    }
}

/// Dispatches to the backend instance owned by the configured environment.
#[derive(Debug)]
pub struct InstanceRouter {
    environment: Option<String>,
    instances: HashMap<BackendInstanceId, Arc<BackendInstance>>,
    routed: Arc<BackendInstance>,
}

impl InstanceRouter {
    /// Build the instance table for an environment.
    pub fn new(environment: Option<String>, config: &BackendConfig) -> Result<Self, RoutingError> {
        let mut instances = HashMap::new();
        for (id, address) in &config.instances {
            let id = BackendInstanceId::from(id.as_str());
            instances.insert(id.clone(), Arc::new(BackendInstance::new(id, address)?));
        }

        let resolved = Self::resolve_instance(environment.as_deref());
        let routed = match instances.get(&resolved) {
            Some(instance) => instance.clone(),
            None => {
                let fallback = Arc::new(BackendInstance::new(resolved.clone(), &config.address)?);
                instances.insert(resolved, fallback.clone());
                fallback
            }
        };

        Ok(Self {
            environment,
            instances,
            routed,
        })
    }

    /// Reuse `previous`'s instance wherever the id and address still match.
    pub fn adopt_instances(&mut self, previous: &InstanceRouter) {
        for (id, instance) in self.instances.iter_mut() {
            if let Some(old) = previous.instances.get(id) {
                if old.address() == instance.address() {
                    *instance = old.clone();
                }
            }
        }
        if let Some(routed) = self.instances.get(self.routed.id()).cloned() {
            self.routed = routed;
        }
    }

    /// Instance id for an environment. Delegates to the resolver.
    pub fn resolve_instance(environment: Option<&str>) -> BackendInstanceId {
        resolver::instance_id(environment)
    }

    /// The instance this deployment dispatches to.
    pub fn route(&self) -> Arc<BackendInstance> {
        self.routed.clone()
    }

    /// All known instances, sorted by id.
    pub fn instances(&self) -> Vec<Arc<BackendInstance>> {
        let mut all: Vec<_> = self.instances.values().cloned().collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }
}
