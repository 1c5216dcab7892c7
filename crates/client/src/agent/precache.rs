//! Build manifest loading, precache install and old-generation cleanup.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use haven_core::cache::hash::{is_precache_bucket, manifest_generation, precache_bucket_name, revisioned_key};
use haven_core::{CacheDb, Error, Request};

use super::scope::RegistrationScope;
use crate::fetch::Network;

/// One build output and its revision token.
///
/// Content-hashed files carry no revision; their URL already changes with
/// their content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub url: String,
    #[serde(default)]
    pub revision: Option<String>,
}

/// The list of assets the build wants available offline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrecacheManifest {
    entries: Vec<ManifestEntry>,
}

impl PrecacheManifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON array of `{"url", "revision"}` objects.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let entries: Vec<ManifestEntry> =
            serde_json::from_str(json).map_err(|e| Error::Manifest(format!("invalid manifest JSON: {e}")))?;
        Ok(Self { entries })
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Manifest(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Identifier of this build, stable under reordering.
    pub fn generation(&self) -> String {
        manifest_generation(self.entries.iter().map(|e| (e.url.as_str(), e.revision.as_deref())))
    }

    pub fn bucket_name(&self) -> String {
        precache_bucket_name(&self.generation())
    }
}

/// Outcome of one install pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub generation: String,
    pub bucket: String,
    /// Downloaded from the network.
    pub fetched: usize,
    /// Copied from an earlier generation's bucket.
    pub reused: usize,
    /// Already present in this generation's bucket.
    pub skipped: usize,
    /// URLs that could not be precached. They fall through to runtime strategies.
    pub failed: Vec<String>,
}

/// Downloads manifest assets into the precache bucket.
#[derive(Clone)]
pub struct PrecacheLoader {
    cache: CacheDb,
    network: Arc<dyn Network>,
}

impl PrecacheLoader {
    pub fn new(cache: CacheDb, network: Arc<dyn Network>) -> Self {
        Self { cache, network }
    }

    /// Store every manifest entry under its revisioned key.
    ///
    /// A missing asset never aborts the install; it is logged and reported.
    ///
    /// # Errors
    ///
    /// Only storage failures abort the install.
    pub async fn install(&self, manifest: &PrecacheManifest, scope: &RegistrationScope) -> Result<InstallReport, Error> {
        let generation = manifest.generation();
        let bucket = precache_bucket_name(&generation);
        self.cache.open_bucket(&bucket).await?;

        let previous: Vec<String> = self
            .cache
            .bucket_names()
            .await?
            .into_iter()
            .filter(|name| is_precache_bucket(name) && *name != bucket)
            .collect();

        let mut report = InstallReport { generation, bucket: bucket.clone(), ..Default::default() };

        for entry in manifest.entries() {
            let url = match scope.resolve_url(&entry.url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(url = %entry.url, "skipping precache entry: {}", e);
                    report.failed.push(entry.url.clone());
                    continue;
                }
            };
            let key = revisioned_key(url.as_str(), entry.revision.as_deref());

            if self.cache.match_entry(&bucket, &key, None).await?.is_some() {
                report.skipped += 1;
                continue;
            }

            if self.reuse(&previous, &bucket, &key).await? {
                report.reused += 1;
                continue;
            }

            match self.fetch_into(&bucket, &key, url).await {
                Ok(()) => report.fetched += 1,
                Err(e) => {
                    tracing::warn!(url = %entry.url, "precache fetch failed: {}", e);
                    report.failed.push(entry.url.clone());
                }
            }
        }

        tracing::info!(
            bucket = %report.bucket,
            fetched = report.fetched,
            reused = report.reused,
            skipped = report.skipped,
            failed = report.failed.len(),
            "precache install finished"
        );
        Ok(report)
    }

    /// Delete every precache bucket other than `current`.
    pub async fn cleanup(&self, current: &str) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.cache.bucket_names().await? {
            if is_precache_bucket(&name) && name != current && self.cache.delete_bucket(&name).await? {
                tracing::info!(bucket = %name, "deleted outdated precache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    async fn reuse(&self, previous: &[String], bucket: &str, key: &str) -> Result<bool, Error> {
        for old in previous {
            if self.cache.copy_entry(old, bucket, key).await? {
                tracing::debug!(key, from = %old, "reused precached asset");
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn fetch_into(&self, bucket: &str, key: &str, url: Url) -> Result<(), Error> {
        let source = url.to_string();
        let response = self.network.fetch(&Request::get(url)).await?;
        if response.status != 200 {
            return Err(Error::Network(format!("{source} answered {}", response.status)));
        }
        self.cache.put_entry(bucket, key, &source, &response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockNetwork;
    use std::io::Write;

    const SCOPE: &str = "https://example.com/app/";

    fn manifest(entries: &[(&str, Option<&str>)]) -> PrecacheManifest {
        PrecacheManifest::new(
            entries
                .iter()
                .map(|(url, rev)| ManifestEntry { url: url.to_string(), revision: rev.map(str::to_string) })
                .collect(),
        )
    }

    async fn loader() -> (PrecacheLoader, Arc<MockNetwork>, CacheDb) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(MockNetwork::new());
        (PrecacheLoader::new(cache.clone(), network.clone()), network, cache)
    }

    #[test]
    fn test_manifest_from_json() {
        let m = PrecacheManifest::from_json(
            r#"[{"url": "index.html", "revision": "a1"}, {"url": "assets/index-9f8e.js", "revision": null}, {"url": "offline.html"}]"#,
        )
        .unwrap();
        assert_eq!(m.entries().len(), 3);
        assert_eq!(m.entries()[0].revision.as_deref(), Some("a1"));
        assert_eq!(m.entries()[2].revision, None);
    }

    #[test]
    fn test_manifest_from_bad_json() {
        assert!(matches!(PrecacheManifest::from_json("{\"url\": 1}"), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_generation_ignores_order() {
        let a = manifest(&[("index.html", Some("1")), ("offline.html", Some("2"))]);
        let b = manifest(&[("offline.html", Some("2")), ("index.html", Some("1"))]);
        let c = manifest(&[("offline.html", Some("3")), ("index.html", Some("1"))]);
        assert_eq!(a.generation(), b.generation());
        assert_ne!(a.generation(), c.generation());
        assert!(a.bucket_name().starts_with("precache-"));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"url": "index.html", "revision": "r1"}}]"#).unwrap();
        let m = PrecacheManifest::load(file.path()).await.unwrap();
        assert_eq!(m.entries().len(), 1);

        assert!(matches!(PrecacheManifest::load("/nonexistent/manifest.json").await, Err(Error::Manifest(_))));
    }

    #[tokio::test]
    async fn test_install_fetches_and_keys_by_revision() {
        let (loader, network, cache) = loader().await;
        network.respond("https://example.com/app/index.html", 200, "<html>shell</html>");
        network.respond("https://example.com/app/assets/index-9f8e.js", 200, "js");
        let m = manifest(&[("index.html", Some("r1")), ("assets/index-9f8e.js", None)]);

        let report = loader.install(&m, &RegistrationScope::new(SCOPE)).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert!(report.failed.is_empty());

        let keys = cache.entry_keys(&report.bucket).await.unwrap();
        assert!(keys.contains(&"https://example.com/app/index.html?__rev=r1".to_string()));
        assert!(keys.contains(&"https://example.com/app/assets/index-9f8e.js".to_string()));

        let shell = cache.match_source(&report.bucket, "https://example.com/app/index.html").await.unwrap();
        assert!(shell.is_some());
    }

    #[tokio::test]
    async fn test_partial_install_is_tolerated() {
        let (loader, network, cache) = loader().await;
        network.respond("https://example.com/app/index.html", 200, "shell");
        let m = manifest(&[("index.html", Some("r1")), ("missing.html", Some("r1"))]);

        let report = loader.install(&m, &RegistrationScope::new(SCOPE)).await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(report.failed, vec!["missing.html".to_string()]);
        assert_eq!(cache.bucket_len(&report.bucket).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reinstall_skips_present_entries() {
        let (loader, network, _) = loader().await;
        network.respond("https://example.com/app/index.html", 200, "shell");
        let m = manifest(&[("index.html", Some("r1"))]);
        let scope = RegistrationScope::new(SCOPE);

        loader.install(&m, &scope).await.unwrap();
        let second = loader.install(&m, &scope).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(network.call_count("https://example.com/app/index.html"), 1);
    }

    #[tokio::test]
    async fn test_new_generation_reuses_unchanged_assets() {
        let (loader, network, _) = loader().await;
        network.respond("https://example.com/app/index.html", 200, "shell");
        network.respond("https://example.com/app/offline.html", 200, "offline");
        let scope = RegistrationScope::new(SCOPE);

        loader.install(&manifest(&[("index.html", Some("r1")), ("offline.html", Some("o1"))]), &scope).await.unwrap();
        let next = loader
            .install(&manifest(&[("index.html", Some("r2")), ("offline.html", Some("o1"))]), &scope)
            .await
            .unwrap();

        assert_eq!(next.reused, 1);
        assert_eq!(next.fetched, 1);
        assert_eq!(network.call_count("https://example.com/app/offline.html"), 1);
        assert_eq!(network.call_count("https://example.com/app/index.html"), 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_only_current_generation() {
        let (loader, network, cache) = loader().await;
        network.respond("https://example.com/app/index.html", 200, "shell");
        let scope = RegistrationScope::new(SCOPE);
        let old = loader.install(&manifest(&[("index.html", Some("r1"))]), &scope).await.unwrap();
        let new = loader.install(&manifest(&[("index.html", Some("r2"))]), &scope).await.unwrap();
        cache.open_bucket("image-cache").await.unwrap();

        let deleted = loader.cleanup(&new.bucket).await.unwrap();
        assert_eq!(deleted, vec![old.bucket.clone()]);
        assert!(cache.has_bucket(&new.bucket).await.unwrap());
        assert!(cache.has_bucket("image-cache").await.unwrap());
        assert!(!cache.has_bucket(&old.bucket).await.unwrap());
    }
}
