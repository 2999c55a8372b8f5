//! Structured logging.
//!
//! # Design Decisions
//! - `RUST_LOG` wins when set; otherwise `observability.log_level`
//! - JSON output for production, pretty output for development
//! - Initialisation happens once; later calls are ignored

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

/// Crate and HTTP stack at the configured level.
fn default_directives(level: &str) -> String {
    format!("gateway_shield={level},tower_http={level},warn", level = level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_scope_level_to_crate() {
        assert_eq!(
            default_directives("debug"),
            "gateway_shield=debug,tower_http=debug,warn"
        );
    }
}
