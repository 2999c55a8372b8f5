//! Gateway Shield Library
//!
//! An authenticating reverse proxy in front of a single backend gateway
//! instance: verifies caller identity on gated routes, injects the shared
//! backend credential, and relays HTTP and WebSocket traffic.

pub mod admin;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod identity;
pub mod injection;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod routing;

pub use config::schema::ShieldConfig;
pub use error::ShieldError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
