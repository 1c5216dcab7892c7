//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (HAVEN_*)
//! 2. TOML config file (if HAVEN_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (HAVEN_*)
/// 2. TOML config file (if HAVEN_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding cache buckets and the durable store.
    ///
    /// Set via HAVEN_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Absolute URL under which the agent acts, e.g. `https://example.com/app/`.
    ///
    /// Set via HAVEN_REGISTRATION_SCOPE environment variable.
    #[serde(default)]
    pub registration_scope: Option<String>,

    /// Build manifest listing `{ "url", "revision" }` pairs to precache.
    ///
    /// Set via HAVEN_MANIFEST_PATH environment variable.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via HAVEN_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via HAVEN_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via HAVEN_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long a document navigation waits on the network before the cache
    /// is consulted.
    ///
    /// Set via HAVEN_NAVIGATION_TIMEOUT_MS environment variable.
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Scope-relative path of the SPA shell.
    #[serde(default = "default_entry_document")]
    pub entry_document: String,

    /// Scope-relative path of the offline page.
    #[serde(default = "default_offline_document")]
    pub offline_document: String,

    /// Route matching inputs.
    #[serde(default)]
    pub routes: RoutesConfig,
}

/// Hosts, path markers and patterns the route classifier matches against.
///
/// Nested keys are set with a double underscore, e.g.
/// `HAVEN_ROUTES__PROBE_MARKER`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutesConfig {
    /// Path suffix of the connectivity probe.
    #[serde(default = "default_probe_marker")]
    pub probe_marker: String,

    /// Origin of the primary CDN mirror of versioned historical data.
    #[serde(default = "default_history_primary_origin")]
    pub history_primary_origin: String,

    /// Origin of the secondary historical-data mirror; also serves the latest value.
    #[serde(default = "default_history_mirror_origin")]
    pub history_mirror_origin: String,

    /// Path segment shared by every historical snapshot.
    #[serde(default = "default_history_path_marker")]
    pub history_path_marker: String,

    /// Path of the singleton "latest value" document.
    #[serde(default = "default_latest_feed_path")]
    pub latest_feed_path: String,

    /// Path regexes that navigation interception must never touch.
    #[serde(default = "default_navigation_denylist")]
    pub navigation_denylist: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./haven-cache.sqlite")
}

fn default_user_agent() -> String {
    "haven/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_navigation_timeout_ms() -> u64 {
    2_000
}

fn default_entry_document() -> String {
    "index.html".into()
}

fn default_offline_document() -> String {
    "offline.html".into()
}

fn default_probe_marker() -> String {
    "/__network_probe__".into()
}

fn default_history_primary_origin() -> String {
    "https://cdn.jsdelivr.net".into()
}

fn default_history_mirror_origin() -> String {
    "https://raw.githubusercontent.com".into()
}

fn default_history_path_marker() -> String {
    "/public/rates/history/".into()
}

fn default_latest_feed_path() -> String {
    "/public/rates/latest.json".into()
}

fn default_navigation_denylist() -> Vec<String> {
    vec![
        r"^/api".into(),
        r"^/rates".into(),
        r"\.[a-zA-Z0-9]+$".into(),
        r"/sw\.js$".into(),
        r"/workbox-.*\.js$".into(),
    ]
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            probe_marker: default_probe_marker(),
            history_primary_origin: default_history_primary_origin(),
            history_mirror_origin: default_history_mirror_origin(),
            history_path_marker: default_history_path_marker(),
            latest_feed_path: default_latest_feed_path(),
            navigation_denylist: default_navigation_denylist(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            registration_scope: None,
            manifest_path: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            entry_document: default_entry_document(),
            offline_document: default_offline_document(),
            routes: RoutesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Network-first timeout for document navigations.
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `HAVEN_`
    /// 2. TOML file from `HAVEN_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("HAVEN_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("HAVEN_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The registration scope, required by the host binary.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no scope is configured.
    pub fn require_registration_scope(&self) -> Result<&str, ConfigError> {
        self.registration_scope.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "registration_scope".into(),
            hint: "Set HAVEN_REGISTRATION_SCOPE environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./haven-cache.sqlite"));
        assert_eq!(config.user_agent, "haven/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.navigation_timeout_ms, 2_000);
        assert_eq!(config.entry_document, "index.html");
        assert_eq!(config.offline_document, "offline.html");
        assert!(config.registration_scope.is_none());
        assert!(config.manifest_path.is_none());
        assert_eq!(config.routes.navigation_denylist.len(), 5);
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.navigation_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_require_registration_scope_missing() {
        let config = AppConfig::default();
        let result = config.require_registration_scope();
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_registration_scope_present() {
        let config =
            AppConfig { registration_scope: Some("https://example.com/app/".into()), ..Default::default() };
        assert_eq!(config.require_registration_scope().unwrap(), "https://example.com/app/");
    }

    #[test]
    fn test_load_layers_env_over_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "haven.toml",
                r#"
                registration_scope = "https://example.com/app/"
                timeout_ms = 5000

                [routes]
                probe_marker = "/__ping__"
                "#,
            )?;
            jail.set_env("HAVEN_CONFIG_FILE", "haven.toml");
            jail.set_env("HAVEN_TIMEOUT_MS", "7000");

            let config = AppConfig::load().expect("config loads");
            assert_eq!(config.registration_scope.as_deref(), Some("https://example.com/app/"));
            assert_eq!(config.timeout_ms, 7000);
            assert_eq!(config.routes.probe_marker, "/__ping__");
            assert_eq!(config.routes.latest_feed_path, "/public/rates/latest.json");
            Ok(())
        });
    }
}
