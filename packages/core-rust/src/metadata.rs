//! Call metadata: case-insensitive key/value pairs exchanged alongside a call.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::status::Status;

/// Response metadata key carrying the per-call trace identifier.
pub const TRACE_ID_KEY: &str = "trace-id";

/// Request metadata key carrying `<scheme> <credential>`.
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Incoming or outgoing call metadata.
///
/// Keys are ASCII and compared case-insensitively. Values that are not
/// visible ASCII are stored but never returned by [`Metadata::get`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    headers: HeaderMap,
}

impl Metadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds metadata from key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if any key or value is not valid metadata.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, Status>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut metadata = Self::new();
        for (key, value) in pairs {
            metadata.append(key, value)?;
        }
        Ok(metadata)
    }

    /// Returns the first value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    /// Returns every readable value stored under `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(key)
            .iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Replaces all values under `key` with `value`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the key or value is not valid metadata.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), Status> {
        let (name, value) = parse_pair(key, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Adds `value` under `key`, keeping existing values.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the key or value is not valid metadata.
    pub fn append(&mut self, key: &str, value: &str) -> Result<(), Status> {
        let (name, value) = parse_pair(key, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Copies every entry of `other` into `self`, replacing existing keys.
    pub fn merge(&mut self, other: &Metadata) {
        for name in other.headers.keys() {
            self.headers.remove(name);
            for value in other.headers.get_all(name) {
                self.headers.append(name.clone(), value.clone());
            }
        }
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.headers.contains_key(key)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Borrows the underlying header map, for transport adapters.
    #[must_use]
    pub fn as_header_map(&self) -> &HeaderMap {
        &self.headers
    }
}

impl From<HeaderMap> for Metadata {
    fn from(headers: HeaderMap) -> Self {
        Self { headers }
    }
}

fn parse_pair(key: &str, value: &str) -> Result<(HeaderName, HeaderValue), Status> {
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|_| Status::internal(format!("invalid metadata key: {key:?}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| Status::internal(format!("invalid metadata value for key {key:?}")))?;
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let md = Metadata::from_pairs([("Authorization", "bearer abc")]).unwrap();
        assert_eq!(md.get(AUTHORIZATION_KEY), Some("bearer abc"));
        assert_eq!(md.get("AUTHORIZATION"), Some("bearer abc"));
    }

    #[test]
    fn insert_replaces_and_append_keeps() {
        let mut md = Metadata::new();
        md.append("x-tag", "a").unwrap();
        md.append("x-tag", "b").unwrap();
        assert_eq!(md.get_all("x-tag").collect::<Vec<_>>(), vec!["a", "b"]);

        md.insert("x-tag", "c").unwrap();
        assert_eq!(md.get_all("x-tag").collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(md.len(), 1);
    }

    #[test]
    fn invalid_key_is_rejected_as_internal() {
        let err = Metadata::new().insert("bad key", "v").unwrap_err();
        assert_eq!(err.code(), crate::Code::Internal);
    }

    #[test]
    fn invalid_value_is_rejected() {
        assert!(Metadata::new().insert("k", "line\nbreak").is_err());
    }

    #[test]
    fn merge_replaces_existing_keys() {
        let mut target = Metadata::from_pairs([("a", "1"), ("b", "2")]).unwrap();
        let source = Metadata::from_pairs([("b", "3"), ("c", "4")]).unwrap();
        target.merge(&source);
        assert_eq!(target.get("a"), Some("1"));
        assert_eq!(target.get("b"), Some("3"));
        assert_eq!(target.get("c"), Some("4"));
    }

    #[test]
    fn missing_key_returns_none() {
        assert!(Metadata::new().get(TRACE_ID_KEY).is_none());
        assert!(Metadata::new().is_empty());
    }
}
