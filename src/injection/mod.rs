//! Parameter injection subsystem.
//!
//! # Data Flow
//! ```text
//! [[injection.params]] (TOML) or Vec<ParamSpec>
//!     → InjectionConfig (immutable, shared)
//!
//! inbound URL + ParamSource (environment snapshot, map, JSON object)
//!     → inject()
//!     → InjectionOutcome { url, injected, skipped }
//!       or MissingRequired { every missing key }
//! ```
//!
//! # Design Decisions
//! - Values are looked up, never logged; outcomes carry names only
//! - A failure never carries a partially injected URL

pub mod injector;
pub mod source;
pub mod spec;

pub use injector::{inject, strip_query_params, InjectionError, InjectionOutcome};
pub use source::ParamSource;
pub use spec::{InjectionConfig, ParamSpec, Transform};
