//! Value sources for parameter injection.

use std::borrow::Cow;
use std::collections::HashMap;
use std::hash::BuildHasher;

use serde_json::Value;

use crate::config::EnvSource;

/// A keyed source of parameter values.
///
/// Implementations return `None` for missing keys and for explicit nulls;
/// the injector additionally treats empty strings as absent.
pub trait ParamSource {
    fn lookup(&self, key: &str) -> Option<Cow<'_, str>>;
}

impl<S: BuildHasher> ParamSource for HashMap<String, String, S> {
    fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key).map(|v| Cow::Borrowed(v.as_str()))
    }
}

impl<S: BuildHasher> ParamSource for HashMap<String, Option<String>, S> {
    fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(key)
            .and_then(Option::as_deref)
            .map(Cow::Borrowed)
    }
}

/// JSON values are coerced to strings: numbers and booleans by their
/// display form, arrays and objects as compact JSON.
impl ParamSource for serde_json::Map<String, Value> {
    fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        match self.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            other => Some(Cow::Owned(other.to_string())),
        }
    }
}

impl ParamSource for EnvSource {
    fn lookup(&self, key: &str) -> Option<Cow<'_, str>> {
        self.vars().lookup(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_values_are_coerced() {
        let map = json!({
            "s": "text",
            "n": 42,
            "b": true,
            "null": null,
            "list": [1, 2],
        });
        let map = map.as_object().unwrap();

        assert_eq!(map.lookup("s").as_deref(), Some("text"));
        assert_eq!(map.lookup("n").as_deref(), Some("42"));
        assert_eq!(map.lookup("b").as_deref(), Some("true"));
        assert_eq!(map.lookup("null"), None);
        assert_eq!(map.lookup("missing"), None);
        assert_eq!(map.lookup("list").as_deref(), Some("[1,2]"));
    }

    #[test]
    fn optional_map_treats_none_as_absent() {
        let mut map: HashMap<String, Option<String>> = HashMap::new();
        map.insert("a".into(), None);
        map.insert("b".into(), Some("x".into()));
        assert_eq!(map.lookup("a"), None);
        assert_eq!(map.lookup("b").as_deref(), Some("x"));
    }
}
