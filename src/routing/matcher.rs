//! Path pattern matching for identity-gated routes.
//!
//! # Pattern Syntax
//! - `/_admin/*` matches `/_admin` and anything under `/_admin/`
//! - `/exact` matches only `/exact`
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - No regex, so matching is a linear prefix scan
//! - `/_admin/*` does not match `/_administrator`
//! - Matching runs on the canonical path, the same one the backend receives,
//!   so dot segments and encoded unreserved characters cannot step around it

use std::borrow::Cow;

use url::Url;

/// Trait for matching a request path against a condition.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the path matches this condition.
    fn matches(&self, path: &str) -> bool;
}

/// Matches one path exactly.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    path: String,
}

impl ExactMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactMatcher {
    fn matches(&self, path: &str) -> bool {
        path == self.path
    }
}

/// Matches a path segment prefix: the base itself or anything below it.
#[derive(Debug, Clone)]
pub struct SubtreeMatcher {
    base: String,
}

impl SubtreeMatcher {
    /// `base` is normalized to have no trailing slash.
    pub fn new(base: impl Into<String>) -> Self {
        let base: String = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

impl Matcher for SubtreeMatcher {
    fn matches(&self, path: &str) -> bool {
        if self.base.is_empty() {
            // "/*" gates everything
            return true;
        }
        match path.strip_prefix(&self.base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

/// The set of identity-gated path patterns, compiled from configuration.
#[derive(Debug, Default)]
pub struct GatedPaths {
    matchers: Vec<Box<dyn Matcher>>,
}

impl GatedPaths {
    /// Compile patterns. Patterns ending in `/*` gate a subtree; others are exact.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        let matchers = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                match p.strip_suffix("/*") {
                    Some(base) => Box::new(SubtreeMatcher::new(base)) as Box<dyn Matcher>,
                    None => Box::new(ExactMatcher::new(p)),
                }
            })
            .collect();
        Self { matchers }
    }

    /// True if any pattern matches (OR semantics).
    pub fn is_gated(&self, path: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(path))
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// The path a backend at `base` receives for the raw inbound `path`.
///
/// Percent-encoded unreserved characters are decoded, then dot segments are
/// resolved the way `Url::set_path` resolves them.
pub fn canonical_path(base: &Url, path: &str) -> String {
    let mut url = base.clone();
    url.set_path(&decode_unreserved(path));
    url.path().to_string()
}

/// Decode `%XX` triplets that encode an RFC 3986 unreserved character.
/// Everything else, including `%2F`, is left as written.
fn decode_unreserved(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = hi << 4 | lo;
                if is_unreserved(decoded) {
                    out.push(decoded);
                    i += 3;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    match String::from_utf8(out) {
        Ok(decoded) => Cow::Owned(decoded),
        Err(_) => Cow::Borrowed(path),
    }
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~')
}
