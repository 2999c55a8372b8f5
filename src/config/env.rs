//! Environment variable overlay.
//!
//! The process environment is captured once at startup into an [`EnvSource`].
//! It serves two purposes: overriding file configuration, and acting as the
//! value source for parameter injection (the shared backend credential lives
//! here and nowhere else).

use std::collections::HashMap;

use crate::config::schema::ShieldConfig;

/// Shared backend credential, injected as the `token` query parameter.
pub const GATEWAY_TOKEN: &str = "GATEWAY_TOKEN";
/// Trust domain for identity verification.
pub const ACCESS_TEAM_DOMAIN: &str = "ACCESS_TEAM_DOMAIN";
/// Expected audience for identity verification.
pub const ACCESS_AUD: &str = "ACCESS_AUD";
/// `true` enables identity bypass (local development only).
pub const DEV_MODE: &str = "DEV_MODE";
/// Deployment environment name.
pub const GATEWAY_ENV: &str = "GATEWAY_ENV";
/// Listener bind address.
pub const SHIELD_BIND: &str = "SHIELD_BIND";

/// Snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    vars: HashMap<String, String>,
}

impl EnvSource {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs (tests, embedding).
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Look up a variable, treating empty values as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// The raw variable map.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Apply environment overrides on top of file configuration.
    ///
    /// Bypass is only ever switched *on* by the literal value `true`; any
    /// other value (or absence) leaves the file setting untouched.
    pub fn apply_overrides(&self, config: &mut ShieldConfig) {
        if let Some(env) = self.get(GATEWAY_ENV) {
            config.environment = Some(env.trim().to_string());
        }
        if let Some(domain) = self.get(ACCESS_TEAM_DOMAIN) {
            config.identity.trust_domain = Some(domain.trim().to_string());
        }
        if let Some(aud) = self.get(ACCESS_AUD) {
            config.identity.audience = Some(aud.trim().to_string());
        }
        if self.get(DEV_MODE) == Some("true") {
            config.identity.bypass = true;
        }
        if let Some(bind) = self.get(SHIELD_BIND) {
            config.listener.bind_address = bind.trim().to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_file_values() {
        let mut config = ShieldConfig::default();
        config.identity.audience = Some("from-file".into());

        let env = EnvSource::from_pairs([
            (GATEWAY_ENV, "production"),
            (ACCESS_TEAM_DOMAIN, "team.example.com"),
            (ACCESS_AUD, "from-env"),
        ]);
        env.apply_overrides(&mut config);

        assert_eq!(config.environment.as_deref(), Some("production"));
        assert_eq!(config.identity.trust_domain.as_deref(), Some("team.example.com"));
        assert_eq!(config.identity.audience.as_deref(), Some("from-env"));
        assert!(!config.identity.bypass);
    }

    #[test]
    fn bypass_requires_literal_true() {
        for value in ["1", "yes", "TRUE", ""] {
            let mut config = ShieldConfig::default();
            EnvSource::from_pairs([(DEV_MODE, value)]).apply_overrides(&mut config);
            assert!(!config.identity.bypass, "DEV_MODE={value:?} must not enable bypass");
        }

        let mut config = ShieldConfig::default();
        EnvSource::from_pairs([(DEV_MODE, "true")]).apply_overrides(&mut config);
        assert!(config.identity.bypass);
    }

    #[test]
    fn empty_values_are_unset() {
        let env = EnvSource::from_pairs([(GATEWAY_ENV, "  ")]);
        assert_eq!(env.get(GATEWAY_ENV), None);

        let mut config = ShieldConfig::default();
        env.apply_overrides(&mut config);
        assert_eq!(config.environment, None);
    }
}
