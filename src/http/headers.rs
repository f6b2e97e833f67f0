//! Ordered header mapping with case-insensitive lookup.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// A header name or value that cannot be sent on the wire.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid header {name:?}: {reason}")]
pub struct InvalidHeader {
    /// The offending header name.
    pub name: String,
    /// Which part was rejected.
    pub reason: &'static str,
}

/// Ordered list of header name/value pairs.
///
/// Names keep the casing the caller used; lookups ignore case. [`Headers::set`]
/// replaces an existing entry in place, so insertion order is stable across
/// updates. [`Headers::append`] keeps repeated headers such as
/// `WWW-Authenticate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `name` to `value`, replacing every existing entry with that name.
    ///
    /// The first existing entry keeps its position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => {
                self.entries[index] = (name.clone(), value);
                let mut seen_first = false;
                self.entries.retain(|(existing, _)| {
                    if !existing.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    if seen_first {
                        false
                    } else {
                        seen_first = true;
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Appends an entry without touching existing entries of the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Returns the first value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    /// Returns every value for `name`, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns true if at least one entry has `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Removes every entry named `name`, returning the first removed value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let first = self.get(name).map(str::to_string);
        self.entries
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        first
    }

    /// Iterates over all entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts to a wire header map, skipping names in `skip`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidHeader`] when a name or value is not valid HTTP.
    pub fn to_header_map(&self, skip: &[&str]) -> Result<HeaderMap, InvalidHeader> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            if skip.iter().any(|skipped| skipped.eq_ignore_ascii_case(name)) {
                continue;
            }
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| InvalidHeader {
                    name: name.clone(),
                    reason: "name is not a valid token",
                })?;
            let header_value = HeaderValue::from_str(value).map_err(|_| InvalidHeader {
                name: name.clone(),
                reason: "value contains forbidden characters",
            })?;
            map.append(header_name, header_value);
        }
        Ok(map)
    }

    /// Builds a header list from a wire header map.
    ///
    /// Non-UTF-8 values are decoded lossily.
    #[must_use]
    pub fn from_header_map(map: &HeaderMap) -> Self {
        map.iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}
