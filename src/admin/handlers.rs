use axum::{
    extract::{Request, State},
    Json,
};
use serde::Serialize;

use crate::http::state::AppState;
use crate::identity::AuthenticatedIdentity;
use crate::injection::ParamSource;
use crate::routing::resolver;

#[derive(Serialize)]
pub struct Liveness {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ResolvedIdentifiers {
    pub bucket: String,
    pub mount_path: String,
    pub instance_id: String,
}

#[derive(Serialize)]
pub struct InstanceStatus {
    pub id: String,
    pub address: String,
    pub health: String,
    pub routed: bool,
}

/// Readiness of one injected parameter. Names only.
#[derive(Serialize)]
pub struct InjectionStatus {
    pub target_name: String,
    pub source_key: String,
    pub required: bool,
    pub ready: bool,
}

#[derive(Serialize)]
pub struct IdentityStatus {
    pub bypass: bool,
    pub trust_domain_configured: bool,
    pub audience_configured: bool,
    pub gated_paths: Vec<String>,
    pub key_set_age_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct Diagnostics {
    pub version: &'static str,
    pub environment: Option<String>,
    pub resolved: ResolvedIdentifiers,
    pub instances: Vec<InstanceStatus>,
    pub injection: Vec<InjectionStatus>,
    pub identity: IdentityStatus,
    pub caller: Option<AuthenticatedIdentity>,
}

pub async fn shield_health(State(state): State<AppState>) -> Json<Liveness> {
    Json(Liveness {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn debug_shield(
    State(state): State<AppState>,
    request: Request,
) -> Json<Diagnostics> {
    let caller = request.extensions().get::<AuthenticatedIdentity>().cloned();
    let runtime = state.runtime();
    let environment = runtime.router.environment();
    let routed = runtime.router.route();

    let instances = runtime
        .router
        .instances()
        .into_iter()
        .map(|instance| InstanceStatus {
            id: instance.id().to_string(),
            address: instance.address().to_string(),
            health: format!("{:?}", instance.health()).to_lowercase(),
            routed: instance.id() == routed.id(),
        })
        .collect();

    let injection = runtime
        .builder
        .injection()
        .specs()
        .iter()
        .map(|spec| InjectionStatus {
            target_name: spec.target_name().to_string(),
            source_key: spec.source_key().to_string(),
            required: spec.is_required(),
            ready: state
                .secrets
                .lookup(spec.source_key())
                .is_some_and(|v| !v.is_empty()),
        })
        .collect();

    let identity = &runtime.config.identity;

    Json(Diagnostics {
        version: env!("CARGO_PKG_VERSION"),
        environment: environment.map(str::to_string),
        resolved: ResolvedIdentifiers {
            bucket: resolver::bucket_name(environment),
            mount_path: resolver::mount_path(environment),
            instance_id: routed.id().to_string(),
        },
        instances,
        injection,
        identity: IdentityStatus {
            bypass: identity.bypass,
            trust_domain_configured: identity.trust_domain.is_some(),
            audience_configured: identity.audience.is_some(),
            gated_paths: identity.gated_paths.clone(),
            key_set_age_secs: state.verifier.key_age().map(|age| age.as_secs()),
        },
        caller,
    })
}
