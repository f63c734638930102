//! Configuration for the ingestion pipeline.
//!
//! Every knob lives in one [`IngestConfig`] struct, built via its
//! [`IngestConfigBuilder`]. One struct means the whole pipeline — gateway,
//! session store, runner, extraction — is configured in a single place and a
//! single config value can be cloned into every background task.

use crate::error::IngestError;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::runner::JobRunner`] and its collaborators.
///
/// Built via [`IngestConfig::builder()`] or [`IngestConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2records::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .workspace_root("/var/lib/pdf2records")
///     .max_concurrent_jobs(8)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory under which per-session workspaces are created.
    /// Default: `<system temp dir>/pdf2records`.
    pub workspace_root: PathBuf,

    /// Lower-case filename extensions accepted by the gateway. Default: `["pdf"]`.
    pub allowed_extensions: Vec<String>,

    /// Maximum number of ingestion jobs running concurrently. Default: 4.
    ///
    /// Each job holds a blocking-pool thread while pdfium works, so this is
    /// the real bound on CPU and memory pressure from uploads. Submissions
    /// beyond the bound queue on the runner's semaphore rather than spawning
    /// unbounded workers.
    pub max_concurrent_jobs: usize,

    /// Release per-page scratch capacity every N pages during extraction.
    /// Default: 8.
    ///
    /// Scratch buffers are reused between pages to avoid per-page
    /// allocation; this knob caps how long a very text-heavy page can pin
    /// that capacity on long documents.
    pub reclaim_every_pages: usize,

    /// A session whose last access is older than this is eligible for the
    /// idle reaper. Default: 300 s.
    pub idle_timeout: Duration,

    /// Interval between idle-reaper sweeps. Default: 60 s.
    pub reap_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("pdf2records"),
            allowed_extensions: vec!["pdf".to_string()],
            max_concurrent_jobs: 4,
            reclaim_every_pages: 8,
            idle_timeout: Duration::from_secs(300),
            reap_interval: Duration::from_secs(60),
        }
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.workspace_root = root.into();
        self
    }

    /// Replace the extension allow-list. Entries are lower-cased.
    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|s| s.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.config.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn reclaim_every_pages(mut self, n: usize) -> Self {
        self.config.reclaim_every_pages = n.max(1);
        self
    }

    pub fn idle_timeout(mut self, d: Duration) -> Self {
        self.config.idle_timeout = d;
        self
    }

    pub fn reap_interval(mut self, d: Duration) -> Self {
        self.config.reap_interval = d;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        let c = &self.config;
        if c.workspace_root.as_os_str().is_empty() {
            return Err(IngestError::InvalidConfig(
                "workspace_root must not be empty".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(IngestError::InvalidConfig(
                "allowed_extensions must contain at least one entry".into(),
            ));
        }
        if c.max_concurrent_jobs == 0 {
            return Err(IngestError::InvalidConfig(
                "max_concurrent_jobs must be ≥ 1".into(),
            ));
        }
        if c.reap_interval.is_zero() {
            return Err(IngestError::InvalidConfig(
                "reap_interval must be non-zero".into(),
            ));
        }
        Ok(self.config)
    }
}
