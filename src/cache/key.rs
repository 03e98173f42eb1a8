//! Canonical cache keys
//!
//! Only the image routes are cacheable. A request path must match one of
//! three shapes exactly, with an identifier of the configured length:
//!
//! ```text
//! /{id}[.ext]
//! /{w}/{h}/{id}[.ext]
//! /{id}[.ext]/{w}/{h}
//! ```
//!
//! Anything else bypasses the cache.

use regex::Regex;
use std::fmt;

const EXTENSIONS: &str = r"(\.(png|jpg|jpeg|gif))?";

/// Normalized path and query of a cacheable request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Matches request paths against the cacheable shapes
#[derive(Debug, Clone)]
pub struct CacheKeyMatcher {
    shapes: Vec<Regex>,
}

impl CacheKeyMatcher {
    pub fn new(id_length: usize) -> Result<Self, regex::Error> {
        let id = format!("[a-zA-Z0-9]{{{id_length}}}");
        let shapes = [
            format!("^/{id}{EXTENSIONS}$"),
            format!("^/[0-9]+/[0-9]+/{id}{EXTENSIONS}$"),
            format!("^/{id}{EXTENSIONS}/[0-9]+/[0-9]+$"),
        ]
        .iter()
        .map(|pattern| Regex::new(pattern))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { shapes })
    }

    /// Canonical key for a request, or `None` when it must not be cached
    pub fn key_for(&self, path: &str, query: Option<&str>) -> Option<CacheKey> {
        if !self.shapes.iter().any(|shape| shape.is_match(path)) {
            return None;
        }
        let key = match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{path}?{query}"),
            None => path.to_string(),
        };
        Some(CacheKey(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/abc123", true)]
    #[case("/abc123.png", true)]
    #[case("/abc123.jpeg", true)]
    #[case("/120/0/abc123", true)]
    #[case("/120/80/abc123.gif", true)]
    #[case("/abc123.jpg/120/80", true)]
    #[case("/abc123/120/80", true)]
    #[case("/abc12", false)]
    #[case("/abc1234", false)]
    #[case("/abc123.bmp", false)]
    #[case("/abc123.PNG", false)]
    #[case("/x/0/abc123", false)]
    #[case("/", false)]
    #[case("/120/0/abc123/extra", false)]
    fn test_cacheable_shapes(#[case] path: &str, #[case] cacheable: bool) {
        let matcher = CacheKeyMatcher::new(6).unwrap();
        assert_eq!(matcher.key_for(path, None).is_some(), cacheable, "{path}");
    }

    #[test]
    fn test_query_is_part_of_key() {
        let matcher = CacheKeyMatcher::new(6).unwrap();
        let plain = matcher.key_for("/abc123", None).unwrap();
        let empty = matcher.key_for("/abc123", Some("")).unwrap();
        let queried = matcher.key_for("/abc123", Some("v=2")).unwrap();

        assert_eq!(plain, empty);
        assert_eq!(queried.as_str(), "/abc123?v=2");
        assert_ne!(plain, queried);
    }

    #[test]
    fn test_id_length_is_configurable() {
        let matcher = CacheKeyMatcher::new(8).unwrap();
        assert!(matcher.key_for("/abcd1234.png", None).is_some());
        assert!(matcher.key_for("/abc123.png", None).is_none());
    }
}
