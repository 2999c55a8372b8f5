//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Environment name (config / GATEWAY_ENV)
//!     → resolver.rs (one pure function per capability)
//!     → instance.rs (instance id → addressable backend instance)
//!
//! Incoming request path
//!     → matcher.rs (is this an identity-gated route?)
//! ```
//!
//! # Design Decisions
//! - Identifier derivation lives in exactly one function
//! - Gated paths are configuration, compiled at startup/reload
//! - Deterministic: same environment always routes to the same instance

pub mod instance;
pub mod matcher;
pub mod resolver;

pub use instance::{BackendInstance, HealthState, InstanceRouter, RoutingError};
pub use matcher::{canonical_path, GatedPaths};
pub use resolver::{BackendInstanceId, Capability};
