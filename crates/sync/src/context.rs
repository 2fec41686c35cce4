use regmirror_catalog::{CatalogHandle, LogHandle};
use regmirror_registry::RegistryHandle;
use regmirror_storage::BackendHandle;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Derives a blob key from a package name and tarball filename.
pub type KeyFn = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Default blob key: `{name}/-/{filename}`, mirroring the registry's own
/// tarball layout. Unique across packages because package names are.
pub fn tarball_key(name: &str, filename: &str) -> String {
    format!("{name}/-/{filename}")
}

/// Settings for the per-version pipeline.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Directory tarballs are downloaded into before verification.
    pub download_dir: PathBuf,
    /// Upper bound on a single tarball transfer.
    pub download_timeout: Duration,
    pub key: KeyFn,
}

impl PipelineConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            key: Arc::new(tarball_key),
        }
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_key(mut self, key: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        self.key = Arc::new(key);
        self
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("download_dir", &self.download_dir)
            .field("download_timeout", &self.download_timeout)
            .finish_non_exhaustive()
    }
}

/// Everything a sync job talks to.
#[derive(Clone)]
pub struct Context {
    pub registry: RegistryHandle,
    pub catalog: CatalogHandle,
    pub activity: LogHandle,
    pub storage: BackendHandle,
    /// Client used for tarball downloads.
    pub http: reqwest::Client,
    pub config: PipelineConfig,
}
