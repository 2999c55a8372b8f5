//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic timer
//!     → InstanceRouter::route() (same resolution as live traffic)
//!     → ProxyRequestBuilder (same credential injection)
//!     → GET <health.path>
//!     → BackendInstance::mark_success / mark_failure
//! ```
//!
//! # Design Decisions
//! - State transitions require consecutive successes/failures
//! - Health is reported, not enforced: there is one routed instance and
//!   traffic is never redirected away from it

pub mod probe;

pub use probe::InstanceProbe;
