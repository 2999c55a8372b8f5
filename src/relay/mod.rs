//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! axum WebSocket (client)          tungstenite stream (backend)
//!     → Frame::from_client              → Frame::from_backend
//!     → pump.rs ───────────────────────→ backend sink
//!     ← ErrorSanitizer ← pump.rs ←────── backend stream
//! ```
//!
//! # Design Decisions
//! - Frames are converted at the socket edges; the pump is generic over
//!   streams and sinks of [`Frame`]
//! - Backend error detail is kept only long enough to log at debug

pub mod frame;
pub mod pump;
pub mod sanitize;
pub mod state;

pub use frame::{CloseInfo, Frame};
pub use pump::{run_relay, PumpEnd, RelayEnd, RelayHalves};
pub use sanitize::{ErrorSanitizer, FaultKind, RelayFault};
pub use state::{RelaySession, SideState, SocketState};
