//! Environment-scoped identifier resolution.
//!
//! Every identifier that depends on the deployment environment (storage
//! bucket, storage mount path, backend instance id) is derived here, by one
//! function, so two call sites can never disagree for the same environment.
//!
//! ```text
//! environment   bucket                    mount path                  instance id
//! (absent)      gateway-data              /data/gateway               gateway
//! production    gateway-data-production   /data/gateway-production    gateway-production
//! ```

use std::fmt;

/// An environment-scoped capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    StorageBucket,
    MountPath,
    InstanceId,
}

impl Capability {
    /// Legacy identifier used when no environment is set. Also the base the
    /// environment suffix is appended to.
    pub const fn legacy_default(self) -> &'static str {
        match self {
            Capability::StorageBucket => "gateway-data",
            Capability::MountPath => "/data/gateway",
            Capability::InstanceId => "gateway",
        }
    }

    pub const ALL: [Capability; 3] = [
        Capability::StorageBucket,
        Capability::MountPath,
        Capability::InstanceId,
    ];
}

/// Resolve a capability identifier for an optional environment name.
///
/// Total: absent, empty and whitespace-only names all yield the legacy
/// default.
pub fn resolve(capability: Capability, environment: Option<&str>) -> String {
    let base = capability.legacy_default();
    match environment.map(str::trim).filter(|e| !e.is_empty()) {
        Some(env) => format!("{}-{}", base, env),
        None => base.to_string(),
    }
}

/// Storage bucket name for an environment.
pub fn bucket_name(environment: Option<&str>) -> String {
    resolve(Capability::StorageBucket, environment)
}

/// Storage mount path for an environment.
pub fn mount_path(environment: Option<&str>) -> String {
    resolve(Capability::MountPath, environment)
}

/// Backend instance id for an environment.
pub fn instance_id(environment: Option<&str>) -> BackendInstanceId {
    BackendInstanceId(resolve(Capability::InstanceId, environment))
}

/// Identifier of an addressable backend instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendInstanceId(String);

impl BackendInstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendInstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
