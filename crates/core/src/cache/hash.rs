//! Revisioned precache keys and manifest generation hashing.

use sha2::{Digest, Sha256};

/// Query parameter that carries an asset's revision in its precache key.
pub const REVISION_PARAM: &str = "__rev";

/// Prefix shared by every precache bucket name.
pub const PRECACHE_PREFIX: &str = "precache-";

/// Compute the cache key for a precached asset.
///
/// Assets without a revision are already content-hashed by the build, so the
/// URL itself is the key.
pub fn revisioned_key(url: &str, revision: Option<&str>) -> String {
    match revision {
        Some(rev) if !rev.is_empty() => {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}{REVISION_PARAM}={rev}")
        }
        _ => url.to_string(),
    }
}

/// Compute the generation id of a manifest.
///
/// Entries are sorted first so the id does not depend on manifest order.
pub fn manifest_generation<'a>(entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let mut pairs: Vec<_> = entries.into_iter().collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    for (url, revision) in pairs {
        hasher.update(url.as_bytes());
        hasher.update(b"\n");
        hasher.update(revision.unwrap_or("").as_bytes());
        hasher.update(b"\n");
    }
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

/// Bucket name for a precache generation.
pub fn precache_bucket_name(generation: &str) -> String {
    format!("{PRECACHE_PREFIX}{generation}")
}

pub fn is_precache_bucket(name: &str) -> bool {
    name.starts_with(PRECACHE_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revisioned_key() {
        assert_eq!(revisioned_key("/app/index.html", Some("abc")), "/app/index.html?__rev=abc");
        assert_eq!(revisioned_key("/app/a.js?v=1", Some("abc")), "/app/a.js?v=1&__rev=abc");
    }

    #[test]
    fn test_revisioned_key_without_revision() {
        assert_eq!(revisioned_key("/app/assets/a.1f2e.js", None), "/app/assets/a.1f2e.js");
        assert_eq!(revisioned_key("/app/assets/a.1f2e.js", Some("")), "/app/assets/a.1f2e.js");
    }

    #[test]
    fn test_generation_stability() {
        let a = manifest_generation([("index.html", Some("1")), ("offline.html", Some("2"))]);
        let b = manifest_generation([("offline.html", Some("2")), ("index.html", Some("1"))]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generation_changes_with_revision() {
        let a = manifest_generation([("index.html", Some("1"))]);
        let b = manifest_generation([("index.html", Some("2"))]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_precache_bucket_name() {
        let name = precache_bucket_name("0123456789abcdef");
        assert_eq!(name, "precache-0123456789abcdef");
        assert!(is_precache_bucket(&name));
        assert!(!is_precache_bucket("html-cache"));
    }
}
