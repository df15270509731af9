//! Configuration.
//!
//! Settings carry built-in defaults and can be layered from an
//! INI-format file, located explicitly or through the
//! `PLAYGROUND_CONFIG_FILE` environment variable.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use configparser::ini::Ini;
use thiserror::Error;

// =============================================================================
// Constants - Default Values
// =============================================================================

const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_SKIP_EXTENSIONS: &str = ".swp,.pyc,.pyo,.svn,.git";
const DEFAULT_HOSTING_API_BASE: &str = "https://api.github.com";
const DEFAULT_HOSTING_NAME_PREFIX: &str = "appengine-";
const DEFAULT_HOSTING_REQUIRED_TOKEN: &str = "python";
const DEFAULT_HOSTING_EXCLUDED_TOKENS: &str = "java,go";
const DEFAULT_TASK_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_TASK_RETRY_BASE_MS: u64 = 250;

const ENV_CONFIG_FILE: &str = "PLAYGROUND_CONFIG_FILE";

/// Collection urls seeded on first boot.
const DEFAULT_COLLECTION_SOURCES: &[&str] =
    &["templates/", "https://github.com/GoogleCloudPlatform"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid integer '{value}' for key '{key}'")]
    InvalidInteger { key: String, value: String },
}

/// Result type for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// Settings
// =============================================================================

/// `[hosting]` section: which external hosting API to read and which
/// repo names qualify for import.
#[derive(Debug, Clone)]
pub struct HostingSettings {
    pub api_base: String,
    pub name_prefix: String,
    pub required_token: String,
    pub excluded_tokens: Vec<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Complete application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// TTL for the read-through listing cache.
    pub cache_ttl: Duration,
    /// Extensions never copied during filesystem population.
    pub skip_extensions: Vec<String>,
    pub hosting: HostingSettings,
    /// Base url of the remote tree service, when one is deployed.
    pub remote_base_url: Option<String>,
    pub task_max_attempts: u32,
    pub task_retry_base: Duration,
    /// Collection urls seeded on first boot.
    pub collection_sources: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            skip_extensions: split_list(DEFAULT_SKIP_EXTENSIONS),
            hosting: HostingSettings {
                api_base: DEFAULT_HOSTING_API_BASE.to_string(),
                name_prefix: DEFAULT_HOSTING_NAME_PREFIX.to_string(),
                required_token: DEFAULT_HOSTING_REQUIRED_TOKEN.to_string(),
                excluded_tokens: split_list(DEFAULT_HOSTING_EXCLUDED_TOKENS),
                client_id: None,
                client_secret: None,
            },
            remote_base_url: None,
            task_max_attempts: DEFAULT_TASK_MAX_ATTEMPTS,
            task_retry_base: Duration::from_millis(DEFAULT_TASK_RETRY_BASE_MS),
            collection_sources: DEFAULT_COLLECTION_SOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Settings {
    /// Load settings from an INI file layered over the defaults.
    ///
    /// With no explicit path, `PLAYGROUND_CONFIG_FILE` is consulted; if
    /// neither names a file, the defaults are returned unchanged.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match env::var(ENV_CONFIG_FILE) {
                Ok(p) => PathBuf::from(p),
                Err(_) => return Ok(Settings::default()),
            },
        };

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::ReadError {
            path: path.clone(),
            source,
        })?;
        Self::from_ini(&raw, &path)
    }

    fn from_ini(raw: &str, path: &Path) -> Result<Settings> {
        let mut ini = Ini::new();
        ini.read(raw.to_string())
            .map_err(|message| ConfigError::ParseError {
                path: path.to_path_buf(),
                message,
            })?;

        let mut settings = Settings::default();

        if let Some(ttl) = get_u64(&ini, "cache", "ttl_secs")? {
            settings.cache_ttl = Duration::from_secs(ttl);
        }
        if let Some(raw) = ini.get("populate", "skip_extensions") {
            settings.skip_extensions = split_list(&raw);
        }

        if let Some(api_base) = ini.get("hosting", "api_base") {
            settings.hosting.api_base = api_base;
        }
        if let Some(prefix) = ini.get("hosting", "name_prefix") {
            settings.hosting.name_prefix = prefix;
        }
        if let Some(token) = ini.get("hosting", "required_token") {
            settings.hosting.required_token = token;
        }
        if let Some(raw) = ini.get("hosting", "excluded_tokens") {
            settings.hosting.excluded_tokens = split_list(&raw);
        }
        settings.hosting.client_id = ini.get("hosting", "client_id");
        settings.hosting.client_secret = ini.get("hosting", "client_secret");

        settings.remote_base_url = ini.get("remote", "base_url");

        if let Some(attempts) = get_u64(&ini, "tasks", "max_attempts")? {
            settings.task_max_attempts = attempts as u32;
        }
        if let Some(base_ms) = get_u64(&ini, "tasks", "retry_base_ms")? {
            settings.task_retry_base = Duration::from_millis(base_ms);
        }

        if let Some(raw) = ini.get("collections", "sources") {
            settings.collection_sources = split_list(&raw);
        }

        Ok(settings)
    }
}

fn get_u64(ini: &Ini, section: &str, key: &str) -> Result<Option<u64>> {
    match ini.get(section, key) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidInteger {
                key: format!("{}.{}", section, key),
                value,
            }),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
