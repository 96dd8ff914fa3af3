//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].

use std::fmt;

/// Request header carrying the date validator of a conditional GET.
pub const IF_MODIFIED_SINCE: &str = "if-modified-since";
/// Request header carrying the entity-tag validators of a conditional GET.
pub const IF_NONE_MATCH: &str = "if-none-match";
/// Response header carrying the synthesized caching directives.
pub const CACHE_CONTROL: &str = "cache-control";
/// Response header carrying the resource modification date.
pub const LAST_MODIFIED: &str = "last-modified";
/// Response header carrying the resource entity tag.
pub const ETAG: &str = "etag";

/// A case-insensitive, multi-value HTTP header map.
///
/// Preserves insertion order and allows multiple values per header name,
/// matching the semantics of HTTP/1.1 header fields (RFC 9110 §5.3).
///
/// # Examples
///
/// ```
/// use pipewright::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Cache-Control", "no-cache");
/// headers.set("cache-control", "private, max-age=3600");
///
/// assert_eq!(headers.get("CACHE-CONTROL"), Some("private, max-age=3600"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry named `name` with a single `value`.
    ///
    /// Stages that decorate a shared response use this so that running a
    /// decorator twice does not duplicate the header.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("If-Modified-Since", "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(h.get(IF_MODIFIED_SINCE), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(h.get("IF-MODIFIED-SINCE"), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
    }

    #[test]
    fn insert_keeps_every_value() {
        let mut h = Headers::new();
        h.insert("If-None-Match", "\"a\"");
        h.insert("if-none-match", "\"b\"");
        let vals: Vec<_> = h.get_all(IF_NONE_MATCH).collect();
        assert_eq!(vals, vec!["\"a\"", "\"b\""]);
    }

    #[test]
    fn set_replaces_all_previous_values() {
        let mut h = Headers::new();
        h.insert("Cache-Control", "no-store");
        h.insert("cache-control", "no-cache");
        h.set(CACHE_CONTROL, "private, max-age=3600");
        let vals: Vec<_> = h.get_all(CACHE_CONTROL).collect();
        assert_eq!(vals, vec!["private, max-age=3600"]);
    }

    #[test]
    fn remove_reports_whether_anything_went() {
        let mut h = Headers::new();
        h.insert("ETag", "\"v1\"");
        assert!(h.remove(ETAG));
        assert!(h.is_empty());
        assert!(!h.remove(ETAG));
    }

    #[test]
    fn display_uses_wire_format() {
        let mut h = Headers::new();
        h.insert("etag", "\"v1\"");
        assert_eq!(h.to_string(), "etag: \"v1\"\r\n");
    }
}
