//! Request middleware.

pub mod identity;
pub mod limits;

pub use identity::identity_gate;
pub use limits::request_limits;
