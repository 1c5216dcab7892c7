//! URL canonicalization and origin comparison.

use url::{Origin, Url};

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<UrlError> for haven_core::Error {
    fn from(err: UrlError) -> Self {
        haven_core::Error::InvalidUrl(err.to_string())
    }
}

/// Canonicalize a URL string before it becomes a request.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http(s) scheme
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Serialized origin (`scheme://host[:port]`) of a URL.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}

/// Whether two URLs share scheme, host and port.
///
/// Opaque origins (e.g. `data:` URLs) never match anything.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    match (a.origin(), b.origin()) {
        (Origin::Tuple(..), Origin::Tuple(..)) => a.origin() == b.origin(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("  https://EXAMPLE.COM/app/#top ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/app/");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://example.com?a=1&b=2").unwrap();
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn test_canonicalize_rejects() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("file:///etc/passwd"), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!(canonicalize("not a url"), Err(UrlError::InvalidUrl(_))));
    }

    #[test]
    fn test_origin_of() {
        let url = Url::parse("https://example.com:8443/app/index.html").unwrap();
        assert_eq!(origin_of(&url), "https://example.com:8443");
    }

    #[test]
    fn test_same_origin() {
        let a = Url::parse("https://example.com/app/").unwrap();
        let b = Url::parse("https://example.com/other?x=1").unwrap();
        let c = Url::parse("http://example.com/app/").unwrap();
        let d = Url::parse("https://cdn.example.com/app/").unwrap();
        assert!(same_origin(&a, &b));
        assert!(!same_origin(&a, &c));
        assert!(!same_origin(&a, &d));
    }

    #[test]
    fn test_opaque_origins_never_match() {
        let a = Url::parse("data:text/plain,hi").unwrap();
        assert!(!same_origin(&a, &a));
    }
}
