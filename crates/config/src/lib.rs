//! Configuration loading and validation.
//!
//! Configuration is layered with [`figment`], lowest precedence first:
//!
//! 1. Built-in defaults ([`Config::default`]), with paths resolved from the
//!    platform's project directories.
//! 2. A configuration file (TOML, YAML or JSON, picked by extension). Either
//!    the path given explicitly, or `config.toml` in the platform config
//!    directory if it exists.
//! 3. Environment variables prefixed with `REGMIRROR_`, using `__` to nest
//!    (e.g. `REGMIRROR_SYNC__DOWNLOAD_TIMEOUT_SECS=120`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "regmirror";
const ENV_PREFIX: &str = "REGMIRROR_";
const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";
// Large tarballs must not be penalised, but a hung transfer has to fail eventually.
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

fn data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

fn cache_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Location of the configuration file used when none is given explicitly.
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
}

/// Upstream registry the mirror synchronises from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub url: String,
    pub user_agent: String,
}
impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY.to_string(),
            user_agent: format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("catalog.sqlite3") }
    }
}

/// Blob storage for re-hosted tarballs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend name, used for logging only.
    pub name: String,
    /// Absolute directory that tarballs are stored under.
    pub root: PathBuf,
    /// Public URL prefix that stored keys are served from. When unset,
    /// stored tarballs are addressed with `file://` URLs.
    pub base_url: Option<String>,
}
impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            root: data_dir().join("tarballs"),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Absolute directory for temporary tarball downloads.
    pub download_dir: PathBuf,
    pub download_timeout_secs: u64,
    /// Identity recorded as the acting user when none is given.
    pub username: String,
}
impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            download_dir: cache_dir().join("downloads"),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            username: "admin".to_string(),
        }
    }
}
impl SyncConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment.
    ///
    /// An explicitly given `path` must exist; the default config file is only
    /// merged when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// Build the layered [`Figment`] without extracting it, so callers (and
    /// tests) can merge additional providers on top.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = merge_file(figment, path)?;
            },
            None => {
                if let Some(path) = default_config_path()
                    && path.is_file()
                {
                    tracing::debug!(path = %path.display(), "Using default configuration file");
                    figment = merge_file(figment, &path)?;
                }
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract and validate a configuration from a prepared [`Figment`].
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = self.registry.url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            exn::bail!(ErrorKind::Invalid("registry.url"));
        }
        if !self.storage.root.is_absolute() {
            exn::bail!(ErrorKind::Invalid("storage.root"));
        }
        if !self.sync.download_dir.is_absolute() {
            exn::bail!(ErrorKind::Invalid("sync.download_dir"));
        }
        if self.sync.download_timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("sync.download_timeout_secs"));
        }
        if self.sync.username.trim().is_empty() {
            exn::bail!(ErrorKind::Invalid("sync.username"));
        }
        Ok(())
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
