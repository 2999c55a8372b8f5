//! Signed identity assertion verification.
//!
//! # Data Flow
//! ```text
//! request headers
//!     → assertion (header, else cookie)
//!     → decode header (algorithm, key id)
//!     → key set (JwksCache)
//!     → signature + exp + iss + aud
//!     → AuthenticatedIdentity { email, display_name }
//! ```
//!
//! # Design Decisions
//! - Only asymmetric algorithms are accepted; a symmetric `alg` can never
//!   be verified against a published key
//! - An unknown key id triggers one forced refresh and one retry
//! - Missing trust domain or audience is a configuration error, not a bypass
//! - Nothing here logs the identity; the caller owns the audit line

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderMap};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::IdentityConfig;
use crate::identity::jwks::{CachePolicy, CachedKeys, HttpKeySource, JwksCache, KeyFetchError, KeySource};

/// Identity of a verified caller. Lives for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    pub email: String,
    pub display_name: String,
}

impl AuthenticatedIdentity {
    /// Fixed identity returned in bypass mode.
    pub fn bypass() -> Self {
        Self {
            email: "dev@localhost".to_string(),
            display_name: "Local Developer".to_string(),
        }
    }
}

/// Verification failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no identity assertion presented")]
    MissingAssertion,

    #[error("identity assertion is malformed: {0}")]
    Malformed(String),

    #[error("assertion algorithm {0:?} is not accepted")]
    UnsupportedAlgorithm(Algorithm),

    #[error("no trusted key matches the assertion")]
    UnknownKey,

    #[error("identity assertion rejected: {0}")]
    Rejected(#[source] jsonwebtoken::errors::Error),

    #[error("identity assertion carries no email")]
    MissingEmail,

    #[error("trusted key set unavailable: {0}")]
    KeySetUnavailable(#[from] KeyFetchError),

    #[error("identity verification is not configured: {0} is missing")]
    Misconfigured(&'static str),
}

impl IdentityError {
    /// Coarse reason code, safe to return to the caller and use as a
    /// metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            IdentityError::MissingAssertion => "missing_assertion",
            IdentityError::Malformed(_) => "malformed",
            IdentityError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            IdentityError::UnknownKey => "unknown_key",
            IdentityError::Rejected(e) => match e.kind() {
                ErrorKind::ExpiredSignature => "expired",
                ErrorKind::ImmatureSignature => "not_yet_valid",
                ErrorKind::InvalidAudience => "invalid_audience",
                ErrorKind::InvalidIssuer => "invalid_issuer",
                ErrorKind::InvalidSignature => "invalid_signature",
                ErrorKind::MissingRequiredClaim(_) => "missing_claim",
                _ => "invalid",
            },
            IdentityError::MissingEmail => "missing_email",
            IdentityError::KeySetUnavailable(_) => "keys_unavailable",
            IdentityError::Misconfigured(_) => "misconfigured",
        }
    }
}

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    email: Option<String>,
    name: Option<String>,
}

/// Verification parameters derived from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierSettings {
    pub certs_url: String,
    pub issuer: String,
    pub audience: String,
    pub policy_ttl: Duration,
    pub min_refresh_interval: Duration,
}

impl VerifierSettings {
    pub fn from_config(config: &IdentityConfig) -> Result<Self, IdentityError> {
        let domain = non_empty(config.trust_domain.as_deref())
            .ok_or(IdentityError::Misconfigured("trust domain"))?;
        let audience = non_empty(config.audience.as_deref())
            .ok_or(IdentityError::Misconfigured("audience"))?;

        let domain = domain
            .trim_start_matches("https://")
            .trim_end_matches('/');

        Ok(Self {
            certs_url: non_empty(config.certs_url.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://{}/cdn-cgi/access/certs", domain)),
            issuer: non_empty(config.issuer.as_deref())
                .map(str::to_string)
                .unwrap_or_else(|| format!("https://{}", domain)),
            audience: audience.to_string(),
            policy_ttl: Duration::from_secs(config.key_ttl_secs),
            min_refresh_interval: Duration::from_secs(config.min_refresh_interval_secs),
        })
    }

    fn policy(&self) -> CachePolicy {
        CachePolicy {
            ttl: self.policy_ttl,
            min_refresh_interval: self.min_refresh_interval,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Pull the assertion from the configured header, falling back to the
/// configured cookie.
pub fn extract_assertion<'a>(headers: &'a HeaderMap, config: &IdentityConfig) -> Option<&'a str> {
    let from_header = headers
        .get(config.assertion_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if from_header.is_some() {
        return from_header;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == config.assertion_cookie && !value.is_empty())
        .map(|(_, value)| value)
}

/// Verifies identity assertions against the trust domain's key set.
#[derive(Debug)]
pub struct IdentityVerifier {
    cache: JwksCache,
}

impl IdentityVerifier {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            cache: JwksCache::new(source),
        }
    }

    /// Verifier backed by HTTPS key set fetches.
    pub fn with_http(fetch_timeout: Duration) -> Result<Self, KeyFetchError> {
        Ok(Self::new(Arc::new(HttpKeySource::new(fetch_timeout)?)))
    }

    pub fn cache(&self) -> &JwksCache {
        &self.cache
    }

    /// Authenticate a request.
    ///
    /// Bypass mode returns the fixed development identity without looking at
    /// the request.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        config: &IdentityConfig,
    ) -> Result<AuthenticatedIdentity, IdentityError> {
        if config.bypass {
            return Ok(AuthenticatedIdentity::bypass());
        }
        let settings = VerifierSettings::from_config(config)?;
        let token = extract_assertion(headers, config).ok_or(IdentityError::MissingAssertion)?;
        self.verify(token, &settings).await
    }

    /// Verify one assertion.
    pub async fn verify(
        &self,
        token: &str,
        settings: &VerifierSettings,
    ) -> Result<AuthenticatedIdentity, IdentityError> {
        let header = decode_header(token).map_err(|e| IdentityError::Malformed(e.to_string()))?;
        if !is_asymmetric(header.alg) {
            return Err(IdentityError::UnsupportedAlgorithm(header.alg));
        }

        let policy = settings.policy();
        let keys = self.cache.get(&settings.certs_url, policy).await?;

        match verify_with(keys.keys(), token, &header, settings) {
            Err(IdentityError::UnknownKey) => {
                let refreshed = self
                    .cache
                    .force_refresh(&settings.certs_url, &keys, policy)
                    .await?;
                if Arc::ptr_eq(&refreshed, &keys) {
                    return Err(IdentityError::UnknownKey);
                }
                verify_with(refreshed.keys(), token, &header, settings)
            }
            other => other,
        }
    }

    /// Age of the cached key set, if one is held.
    pub fn key_age(&self) -> Option<Duration> {
        self.cache.snapshot().map(|c: Arc<CachedKeys>| c.age())
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
            | Algorithm::EdDSA
    )
}

fn verify_with(
    keys: &JwkSet,
    token: &str,
    header: &Header,
    settings: &VerifierSettings,
) -> Result<AuthenticatedIdentity, IdentityError> {
    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[settings.audience.as_str()]);
    validation.set_issuer(&[settings.issuer.as_str()]);
    validation.set_required_spec_claims(&["exp", "iss", "aud"]);

    let claims = match &header.kid {
        Some(kid) => {
            let jwk = keys.find(kid).ok_or(IdentityError::UnknownKey)?;
            decode_with(jwk, token, &validation)?
        }
        None => {
            // Kid-less assertion: the first key that verifies the signature
            // decides the outcome.
            let mut verified = None;
            for jwk in &keys.keys {
                match decode_with(jwk, token, &validation) {
                    Ok(claims) => {
                        verified = Some(claims);
                        break;
                    }
                    Err(IdentityError::Rejected(e)) if is_key_mismatch(e.kind()) => continue,
                    Err(e) => return Err(e),
                }
            }
            verified.ok_or(IdentityError::UnknownKey)?
        }
    };

    let email = non_empty(claims.email.as_deref())
        .ok_or(IdentityError::MissingEmail)?
        .to_string();
    let display_name = non_empty(claims.name.as_deref())
        .map(str::to_string)
        .unwrap_or_else(|| email.clone());

    Ok(AuthenticatedIdentity {
        email,
        display_name,
    })
}

fn decode_with(
    jwk: &Jwk,
    token: &str,
    validation: &Validation,
) -> Result<AssertionClaims, IdentityError> {
    let key = DecodingKey::from_jwk(jwk).map_err(IdentityError::Rejected)?;
    decode::<AssertionClaims>(token, &key, validation)
        .map(|data| data.claims)
        .map_err(IdentityError::Rejected)
}

fn is_key_mismatch(kind: &ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidKeyFormat
            | ErrorKind::InvalidRsaKey(_)
            | ErrorKind::InvalidEcdsaKey
    )
}
