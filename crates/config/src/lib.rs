use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "portal.toml",
    "config/portal.toml",
    "crates/config/portal.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub ui: UiConfig,
}

/// Connection settings for the hosted auth / functions / REST collaborator.
///
/// ```
/// use portal_config::BackendConfig;
///
/// let backend = BackendConfig::default();
/// assert_eq!(backend.request_timeout_seconds, 30);
/// assert!(backend.anon_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "BackendConfig::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "BackendConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl BackendConfig {
    fn default_base_url() -> String {
        "http://127.0.0.1:54321".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            anon_key: None,
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "portal-session.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Lifetime of memoized profile lookups. Zero re-resolves on every view.
    #[serde(default)]
    pub profile_cache_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default = "UiConfig::default_language")]
    pub default_language: String,
}

impl UiConfig {
    fn default_language() -> String {
        "en".to_string()
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            default_language: Self::default_language(),
        }
    }
}

/// Load the portal configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use portal_config::load;
///
/// std::env::remove_var("PORTAL_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.backend.base_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let timeout = i64::try_from(defaults.backend.request_timeout_seconds).unwrap_or(i64::MAX);
    let cache_ttl = i64::try_from(defaults.auth.profile_cache_ttl_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("backend.base_url", defaults.backend.base_url.clone())?
        .set_default("backend.request_timeout_seconds", timeout)?
        .set_default("storage.path", defaults.storage.path.clone())?
        .set_default("auth.profile_cache_ttl_seconds", cache_ttl)?
        .set_default("ui.default_language", defaults.ui.default_language.clone())?;

    let environment_overrides = config::Environment::with_prefix("PORTAL").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PORTAL_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PORTAL_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.backend.request_timeout_seconds == 0 {
        config.backend.request_timeout_seconds = 1;
    }

    debug!(base_url = %config.backend.base_url, storage = %config.storage.path, "loaded portal configuration");
    Ok(config)
}
