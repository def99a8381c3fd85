//! Fields parsed from a request body

use serde_json::Value;

/// Named fields of a parsed request body
///
/// Only the first occurrence of a field is considered by [`get`][Self::get].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct BodyFields(Vec<(String, String)>);

impl BodyFields {
    /// An empty set of fields
    #[inline]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Parses an `application/x-www-form-urlencoded` body
    pub fn from_form_urlencoded(body: &[u8]) -> Self {
        Self(
            url::form_urlencoded::parse(body)
                .into_owned()
                .collect(),
        )
    }

    /// Parses a JSON body
    ///
    /// Only string members of a top-level object are kept. Any other
    /// document, including invalid JSON, yields no fields.
    pub fn from_json(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Self(
                map.into_iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k, s)),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => Self::new(),
        }
    }

    /// Adds a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    /// Looks up the first value of a field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether no fields were parsed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for BodyFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
