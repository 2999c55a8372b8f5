//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → middleware/identity.rs (gated paths only)
//!     → admin endpoints, or the proxy handler:
//!         → InstanceRouter::route()
//!         → request.rs (ProxyRequestBuilder: inject credential, copy request)
//!         → websocket.rs (dial backend, upgrade, relay)
//!           or hyper client → response.rs (scrub Location, stream body)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;
pub mod state;
pub mod websocket;

pub use request::{PrepareError, ProxyPreparation, ProxyRequestBuilder};
pub use server::{HttpServer, ServerError, X_REQUEST_ID};
pub use state::{AppState, Runtime};
