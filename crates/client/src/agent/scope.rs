//! Registration scope and scope-relative path construction.
//!
//! The scope is read once at registration and never changes, but the base path
//! is recomputed on every call. A malformed or missing scope degrades to `/`
//! so that path resolution can never block request handling.

use url::Url;

use haven_core::Error;

/// The absolute URL prefix the agent is authorized to act under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationScope {
    raw: Option<String>,
}

impl RegistrationScope {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: Some(raw.into()) }
    }

    /// A scope that was never supplied by the host.
    pub fn absent() -> Self {
        Self { raw: None }
    }

    pub fn raw(&self) -> Option<&str> {
        self.raw.as_deref()
    }

    /// The parsed scope URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the scope is absent, blank or malformed.
    pub fn url(&self) -> Result<Url, Error> {
        match self.raw.as_deref().map(str::trim) {
            None | Some("") => Err(Error::InvalidUrl("registration scope is not set".into())),
            Some(scope) => Ok(Url::parse(scope)?),
        }
    }

    /// Serialized origin of the scope.
    pub fn origin(&self) -> Result<String, Error> {
        Ok(crate::fetch::origin_of(&self.url()?))
    }

    /// Path component of the scope, e.g. `/app/`. Falls back to `/`.
    pub fn base_path(&self) -> String {
        match self.url() {
            Ok(url) => url.path().to_string(),
            Err(e) => {
                tracing::error!(scope = ?self.raw, "base path resolution failed: {}", e);
                "/".to_string()
            }
        }
    }

    /// Prefix `relative` with the base path, dropping one leading `/`.
    pub fn resolve_path(&self, relative: &str) -> String {
        let clean = relative.strip_prefix('/').unwrap_or(relative);
        format!("{}{}", self.base_path(), clean)
    }

    /// Absolute URL of a scope-relative path, resolved against the scope URL.
    pub fn resolve_url(&self, relative: &str) -> Result<Url, Error> {
        Ok(self.url()?.join(relative)?)
    }

    /// Absolute URL of `resolve_path(relative)` on the scope's origin.
    pub fn resolve_absolute(&self, relative: &str) -> Result<Url, Error> {
        let path = self.resolve_path(relative);
        Ok(self.url()?.join(&path)?)
    }
}
