//! Outbound request construction.
//!
//! # Responsibilities
//! - Resolve the backend URL for an inbound request (base + path + query)
//! - Inject configured parameters into that URL
//! - Build a fresh outbound request carrying the inbound method, headers
//!   and body stream
//!
//! # Design Decisions
//! - The inbound request is consumed; its extensions (identity, upgrade
//!   handle) never reach the backend request
//! - Multi-valued headers are copied value by value
//! - Injection failure means no outbound request exists at all

use axum::body::Body;
use axum::http::{uri::InvalidUri, Request, Uri, Version};
use thiserror::Error;
use url::Url;

use crate::injection::{inject, InjectionConfig, InjectionError, ParamSource};
use crate::routing::canonical_path;

#[derive(Debug, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error("backend URL is not a valid request URI: {0}")]
    InvalidUri(#[from] InvalidUri),

    #[error("outbound request could not be built: {0}")]
    Build(#[from] axum::http::Error),
}

/// A ready-to-send backend request.
#[derive(Debug)]
pub struct ProxyPreparation {
    pub request: Request<Body>,
    pub resolved_url: Url,
    pub injected: Vec<String>,
    pub skipped: Vec<String>,
}

/// Builds backend requests with injected parameters.
#[derive(Debug, Clone, Default)]
pub struct ProxyRequestBuilder {
    injection: InjectionConfig,
    log_injection: bool,
}

impl ProxyRequestBuilder {
    pub fn new(injection: InjectionConfig) -> Self {
        Self {
            injection,
            log_injection: false,
        }
    }

    /// Emit a debug event naming injected and skipped parameters.
    pub fn with_injection_logging(mut self, enabled: bool) -> Self {
        self.log_injection = enabled;
        self
    }

    pub fn injection(&self) -> &InjectionConfig {
        &self.injection
    }

    /// Backend URL for an inbound URI: `backend_base` with the canonical
    /// inbound path and raw query.
    pub fn target_url(backend_base: &Url, inbound: &Uri) -> Url {
        let mut url = backend_base.clone();
        url.set_path(&canonical_path(backend_base, inbound.path()));
        url.set_query(inbound.query());
        url
    }

    /// Consume an inbound request and produce the backend request.
    pub fn prepare<S>(
        &self,
        inbound: Request<Body>,
        backend_base: &Url,
        source: &S,
    ) -> Result<ProxyPreparation, PrepareError>
    where
        S: ParamSource + ?Sized,
    {
        let target = Self::target_url(backend_base, inbound.uri());
        let outcome = inject(&target, source, &self.injection)?;

        if self.log_injection {
            tracing::debug!(
                injected = ?outcome.injected,
                skipped = ?outcome.skipped,
                "Backend parameters injected"
            );
        }

        let uri: Uri = outcome.url.as_str().parse()?;
        let (parts, body) = inbound.into_parts();

        // The backend client speaks HTTP/1.1.
        let version = match parts.version {
            Version::HTTP_09 | Version::HTTP_10 => parts.version,
            _ => Version::HTTP_11,
        };

        let mut builder = Request::builder()
            .method(parts.method)
            .uri(uri)
            .version(version);
        if let Some(headers) = builder.headers_mut() {
            for (name, value) in parts.headers.iter() {
                headers.append(name.clone(), value.clone());
            }
        }
        let request = builder.body(body)?;

        Ok(ProxyPreparation {
            request,
            resolved_url: outcome.url,
            injected: outcome.injected,
            skipped: outcome.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::ParamSpec;
    use axum::http::{header, Method};
    use std::collections::HashMap;

    fn base() -> Url {
        Url::parse("http://127.0.0.1:18789/").unwrap()
    }

    fn secrets(token: &str) -> HashMap<String, String> {
        HashMap::from([("GATEWAY_TOKEN".to_string(), token.to_string())])
    }

    #[test]
    fn end_to_end_injection_preserves_request() {
        let inbound = Request::builder()
            .method(Method::POST)
            .uri("/path?foo=bar")
            .header(header::ACCEPT, "text/html")
            .header("x-multi", "one")
            .header("x-multi", "two")
            .body(Body::from("payload"))
            .unwrap();

        let prep = ProxyRequestBuilder::default()
            .prepare(inbound, &base(), &secrets("abc123"))
            .unwrap();

        assert_eq!(prep.resolved_url.as_str(), "http://127.0.0.1:18789/path?foo=bar&token=abc123");
        assert_eq!(prep.injected, vec!["token"]);
        assert!(prep.skipped.is_empty());

        let request = prep.request;
        assert_eq!(request.method(), Method::POST);
        assert_eq!(request.uri().to_string(), "http://127.0.0.1:18789/path?foo=bar&token=abc123");
        assert_eq!(request.headers()[header::ACCEPT], "text/html");
        let multi: Vec<_> = request.headers().get_all("x-multi").iter().collect();
        assert_eq!(multi, vec!["one", "two"]);
    }

    #[test]
    fn forwarded_path_is_canonical() {
        let cases = [
            ("/x/../api/devices?a=1", "http://127.0.0.1:18789/api/devices?a=1"),
            ("/./api/devices", "http://127.0.0.1:18789/api/devices"),
            ("/%61pi/x", "http://127.0.0.1:18789/api/x"),
        ];
        for (inbound, expected) in cases {
            let uri: Uri = inbound.parse().unwrap();
            assert_eq!(ProxyRequestBuilder::target_url(&base(), &uri).as_str(), expected);
        }
    }

    #[test]
    fn missing_credential_builds_nothing() {
        let inbound = Request::builder().uri("/path").body(Body::empty()).unwrap();
        let err = ProxyRequestBuilder::default()
            .prepare(inbound, &base(), &HashMap::<String, String>::new())
            .unwrap_err();
        match err {
            PrepareError::Injection(e) => assert_eq!(e.missing(), ["GATEWAY_TOKEN"]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn websocket_upgrade_headers_are_forwarded() {
        let inbound = Request::builder()
            .uri("/ws")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .header(header::SEC_WEBSOCKET_VERSION, "13")
            .body(Body::empty())
            .unwrap();
        let prep = ProxyRequestBuilder::default()
            .prepare(inbound, &base(), &secrets("t"))
            .unwrap();
        let headers = prep.request.headers();
        assert_eq!(headers[header::UPGRADE], "websocket");
        assert_eq!(headers[header::SEC_WEBSOCKET_KEY], "dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(prep.resolved_url.query(), Some("token=t"));
    }

    #[test]
    fn optional_params_are_reported_as_skipped() {
        let builder = ProxyRequestBuilder::new(InjectionConfig::new(vec![
            ParamSpec::required("GATEWAY_TOKEN").rename("token"),
            ParamSpec::optional("GATEWAY_LOCALE").rename("locale"),
        ]))
        .with_injection_logging(true);
        let inbound = Request::builder().uri("/").body(Body::empty()).unwrap();
        let prep = builder.prepare(inbound, &base(), &secrets("t")).unwrap();
        assert_eq!(prep.injected, vec!["token"]);
        assert_eq!(prep.skipped, vec!["locale"]);
    }
}
