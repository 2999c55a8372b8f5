//! Identity verification subsystem.
//!
//! # Data Flow
//! ```text
//! gated request
//!     → verifier.rs (extract assertion, verify)
//!         → jwks.rs (cached key set, single-flight refresh)
//!             → KeySource (HTTPS fetch of the trust domain's certs)
//!     → AuthenticatedIdentity in request extensions
//! ```

pub mod jwks;
pub mod verifier;

pub use jwks::{CachePolicy, HttpKeySource, JwksCache, KeyFetchError, KeySource};
pub use verifier::{
    extract_assertion, AuthenticatedIdentity, IdentityError, IdentityVerifier, VerifierSettings,
};
