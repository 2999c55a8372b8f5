//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics: addresses parse,
//! patterns are well formed, the injection table is unambiguous. All errors
//! are collected, not just the first.

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ShieldConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    InvalidBindAddress(String),

    #[error("environment name '{0}' may only contain ASCII letters, digits, '-' and '_'")]
    InvalidEnvironment(String),

    #[error("backend address '{address}' for '{id}' is not host:port")]
    InvalidBackendAddress { id: String, address: String },

    #[error("injection.params[{0}] has an empty source_key")]
    EmptySourceKey(usize),

    #[error("injection target '{0}' is written by more than one rule")]
    DuplicateTarget(String),

    #[error("gated path pattern '{0}' must start with '/'")]
    InvalidGatedPattern(String),

    #[error("identity.certs_url '{0}' is not an absolute URL")]
    InvalidCertsUrl(String),

    #[error("health.interval_secs must be greater than zero")]
    ZeroProbeInterval,

    #[error("observability.log_format '{0}' must be 'pretty' or 'json'")]
    InvalidLogFormat(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a configuration, returning every problem found.
pub fn validate_config(config: &ShieldConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if let Some(env) = config.environment.as_deref() {
        let env = env.trim();
        if !env.is_empty()
            && !env
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            errors.push(ValidationError::InvalidEnvironment(env.to_string()));
        }
    }

    if !is_host_port(&config.backend.address) {
        errors.push(ValidationError::InvalidBackendAddress {
            id: "backend.address".to_string(),
            address: config.backend.address.clone(),
        });
    }
    for (id, address) in &config.backend.instances {
        if !is_host_port(address) {
            errors.push(ValidationError::InvalidBackendAddress {
                id: id.clone(),
                address: address.clone(),
            });
        }
    }

    let mut targets = HashSet::new();
    for (i, rule) in config.injection.params.iter().enumerate() {
        if rule.source_key.trim().is_empty() {
            errors.push(ValidationError::EmptySourceKey(i));
            continue;
        }
        let target = rule.target_name.as_deref().unwrap_or(&rule.source_key);
        if !targets.insert(target.to_string()) {
            errors.push(ValidationError::DuplicateTarget(target.to_string()));
        }
    }

    for pattern in &config.identity.gated_paths {
        if !pattern.starts_with('/') {
            errors.push(ValidationError::InvalidGatedPattern(pattern.clone()));
        }
    }

    if let Some(url) = config.identity.certs_url.as_deref() {
        if Url::parse(url).is_err() {
            errors.push(ValidationError::InvalidCertsUrl(url.to_string()));
        }
    }

    if config.health.enabled && config.health.interval_secs == 0 {
        errors.push(ValidationError::ZeroProbeInterval);
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::InvalidLogFormat(other.to_string())),
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Accepts `host:port` where host may be a name or an IP literal.
fn is_host_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            !host.is_empty() && !host.contains('/') && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ParamRule;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ShieldConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ShieldConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.environment = Some("prod/eu".into());
        config.backend.instances.insert("gateway".into(), "nope".into());
        config.identity.gated_paths.push("admin".into());
        config.injection.params.push(ParamRule {
            source_key: "OTHER".into(),
            target_name: Some("token".into()),
            required: false,
            transform: None,
        });
        config.health.interval_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6, "{errors:?}");
        assert!(errors.contains(&ValidationError::DuplicateTarget("token".into())));
        assert!(errors.contains(&ValidationError::InvalidGatedPattern("admin".into())));
        assert!(errors.contains(&ValidationError::ZeroProbeInterval));
    }

    #[test]
    fn host_port_accepts_names_and_ips() {
        assert!(is_host_port("127.0.0.1:18789"));
        assert!(is_host_port("gateway.internal:80"));
        assert!(!is_host_port("gateway.internal"));
        assert!(!is_host_port("127.0.0.1:18789/path"));
    }
}
