//! Query-string injection.
//!
//! Query manipulation works on raw `&`-separated segments rather than on
//! decoded pairs: only segments whose decoded key equals an injected target
//! name are touched, so every other segment keeps its exact encoding.

use std::borrow::Cow;

use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::injection::source::ParamSource;
use crate::injection::spec::InjectionConfig;

/// Injection failed; no URL is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectionError {
    /// Every required source key that was absent, in table order.
    #[error("missing required parameters: {}", .missing.join(", "))]
    MissingRequired { missing: Vec<String> },
}

impl InjectionError {
    pub fn missing(&self) -> &[String] {
        match self {
            InjectionError::MissingRequired { missing } => missing,
        }
    }
}

/// Result of a successful injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionOutcome {
    pub url: Url,
    /// Target names written, in table order.
    pub injected: Vec<String>,
    /// Target names of optional parameters with no value.
    pub skipped: Vec<String>,
}

/// Inject configured parameters into a copy of `url`.
///
/// The input URL is never modified. Absent, null and empty values are all
/// treated as absent. On failure the full list of missing required source
/// keys is returned and nothing is written.
pub fn inject<S>(
    url: &Url,
    source: &S,
    config: &InjectionConfig,
) -> Result<InjectionOutcome, InjectionError>
where
    S: ParamSource + ?Sized,
{
    let mut writes: Vec<(&str, String)> = Vec::with_capacity(config.specs().len());
    let mut missing = Vec::new();
    let mut skipped = Vec::new();

    for spec in config.specs() {
        let value = source
            .lookup(spec.source_key())
            .filter(|v| !v.is_empty());

        match value {
            Some(value) => {
                let value = match spec.transform() {
                    Some(transform) => transform.apply(&value),
                    None => value.into_owned(),
                };
                writes.push((spec.target_name(), value));
            }
            None if spec.is_required() => missing.push(spec.source_key().to_string()),
            None => skipped.push(spec.target_name().to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(InjectionError::MissingRequired { missing });
    }

    let mut url = url.clone();
    if !writes.is_empty() {
        let mut segments: Vec<Cow<'_, str>> = split_query(url.query());
        for (name, value) in &writes {
            set_param(&mut segments, name, value);
        }
        let query = segments.join("&");
        url.set_query(Some(&query));
    }

    Ok(InjectionOutcome {
        url,
        injected: writes.iter().map(|(name, _)| name.to_string()).collect(),
        skipped,
    })
}

/// Remove every occurrence of the named parameters from a URL or relative
/// reference. Returns the input unchanged when nothing matched.
pub fn strip_query_params<'a, S: AsRef<str>>(reference: &'a str, names: &[S]) -> Cow<'a, str> {
    let (before_fragment, fragment) = match reference.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (reference, None),
    };
    let Some((path, query)) = before_fragment.split_once('?') else {
        return Cow::Borrowed(reference);
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|segment| {
            segment_key(segment)
                .map(|key| !names.iter().any(|n| n.as_ref() == key))
                .unwrap_or(true)
        })
        .collect();
    if kept.len() == query.split('&').count() {
        return Cow::Borrowed(reference);
    }

    let mut out = String::with_capacity(reference.len());
    out.push_str(path);
    if !kept.is_empty() {
        out.push('?');
        out.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    Cow::Owned(out)
}

fn split_query(query: Option<&str>) -> Vec<Cow<'_, str>> {
    match query {
        Some(q) if !q.is_empty() => q.split('&').map(Cow::Borrowed).collect(),
        _ => Vec::new(),
    }
}

/// Set semantics: replace the first match in place, drop later duplicates,
/// otherwise append.
fn set_param(segments: &mut Vec<Cow<'_, str>>, name: &str, value: &str) {
    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(name, value)
        .finish();

    let mut replaced = false;
    segments.retain_mut(|segment| {
        if segment_key(segment).as_deref() != Some(name) {
            return true;
        }
        if replaced {
            return false;
        }
        *segment = Cow::Owned(encoded.clone());
        replaced = true;
        true
    });

    if !replaced {
        segments.push(Cow::Owned(encoded));
    }
}

/// Decoded key of one raw query segment. Empty segments have no key.
fn segment_key(segment: &str) -> Option<Cow<'_, str>> {
    if segment.is_empty() {
        return None;
    }
    form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(key, _)| key)
}
