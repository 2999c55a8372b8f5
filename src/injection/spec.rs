//! Declarative injection table.

use std::fmt;
use std::sync::Arc;

use crate::config::{ParamRule, TransformKind};

/// Value transform applied before a parameter is written.
#[derive(Clone)]
pub enum Transform {
    Builtin(TransformKind),
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Transform {
    pub fn apply(&self, value: &str) -> String {
        match self {
            Transform::Builtin(TransformKind::Trim) => value.trim().to_string(),
            Transform::Builtin(TransformKind::Lowercase) => value.to_lowercase(),
            Transform::Builtin(TransformKind::Uppercase) => value.to_uppercase(),
            Transform::Custom(f) => f(value),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Builtin(kind) => f.debug_tuple("Builtin").field(kind).finish(),
            Transform::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One injected parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    source_key: String,
    target_name: Option<String>,
    required: bool,
    transform: Option<Transform>,
}

impl ParamSpec {
    /// A parameter that aborts the request when its source value is absent.
    pub fn required(source_key: impl Into<String>) -> Self {
        Self {
            source_key: source_key.into(),
            target_name: None,
            required: true,
            transform: None,
        }
    }

    /// A parameter that is skipped when its source value is absent.
    pub fn optional(source_key: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(source_key)
        }
    }

    /// Write under a different query parameter name.
    pub fn rename(mut self, target_name: impl Into<String>) -> Self {
        self.target_name = Some(target_name.into());
        self
    }

    pub fn with_transform<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.transform = Some(Transform::Custom(Arc::new(f)));
        self
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Query parameter name; defaults to the source key.
    pub fn target_name(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.source_key)
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }
}

impl From<&ParamRule> for ParamSpec {
    fn from(rule: &ParamRule) -> Self {
        Self {
            source_key: rule.source_key.clone(),
            target_name: rule.target_name.clone(),
            required: rule.required,
            transform: rule.transform.map(Transform::Builtin),
        }
    }
}

/// Immutable, shareable list of parameter specs.
#[derive(Debug, Clone)]
pub struct InjectionConfig {
    specs: Arc<[ParamSpec]>,
}

impl InjectionConfig {
    pub fn new(specs: Vec<ParamSpec>) -> Self {
        Self {
            specs: specs.into(),
        }
    }

    /// Compile the config-file table.
    pub fn from_rules(rules: &[ParamRule]) -> Self {
        Self::new(rules.iter().map(ParamSpec::from).collect())
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Target names this config can write.
    pub fn target_names(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.target_name().to_string()).collect()
    }
}

impl Default for InjectionConfig {
    /// The shared backend credential, required, written as `token`.
    fn default() -> Self {
        Self::new(vec![
            ParamSpec::required(crate::config::env::GATEWAY_TOKEN).rename("token")
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_defaults_to_source_key() {
        let spec = ParamSpec::optional("locale");
        assert_eq!(spec.target_name(), "locale");
        assert!(!spec.is_required());
        assert_eq!(spec.rename("lang").target_name(), "lang");
    }

    #[test]
    fn compiles_config_rules() {
        let rules = vec![ParamRule {
            source_key: "REGION".into(),
            target_name: None,
            required: false,
            transform: Some(TransformKind::Uppercase),
        }];
        let config = InjectionConfig::from_rules(&rules);
        let spec = &config.specs()[0];
        assert_eq!(spec.target_name(), "REGION");
        assert_eq!(spec.transform().map(|t| t.apply("eu-west")).as_deref(), Some("EU-WEST"));
    }

    #[test]
    fn default_is_required_token() {
        let config = InjectionConfig::default();
        assert_eq!(config.target_names(), vec!["token"]);
        assert_eq!(config.specs()[0].source_key(), "GATEWAY_TOKEN");
        assert!(config.specs()[0].is_required());
    }
}
