//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (environment overrides)
//!     → validation.rs (semantic checks, all errors reported)
//!     → ShieldConfig (validated, immutable)
//!     → compiled into a Runtime snapshot held in ArcSwap
//!
//! On file change (--watch):
//!     watcher.rs detects change
//!     → loader.rs + env.rs + validation.rs
//!     → new Runtime swapped in atomically
//!     → in-flight requests finish on the old snapshot
//! ```
//!
//! # Design Decisions
//! - Secrets never come from the file; only from the environment snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use env::EnvSource;
pub use loader::ConfigError;
pub use schema::{
    BackendConfig, HealthCheckConfig, IdentityConfig, ListenerConfig, ObservabilityConfig,
    ParamRule, RelayConfig, ShieldConfig, TimeoutConfig, TransformKind,
};
