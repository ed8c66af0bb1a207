use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use pagewatch_core::{ExternalDecl, Options};
use thiserror::Error;
use url::Url;

/// Milliseconds-since-epoch clock, injectable for deterministic tests.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Construction-time configuration for a watcher.
pub struct WatcherConfig {
    /// The page whose resources are watched.
    pub page: Url,
    pub options: Options,
    /// Directory for the durable store (options, stopped marker); `None`
    /// disables persistence.
    pub store_dir: Option<PathBuf>,
    /// Extra resources declared by the host up front.
    pub declared: Option<ExternalDecl>,
    pub clock: Clock,
}

impl WatcherConfig {
    /// Configuration for `page` with defaults: options allow-listed to the
    /// page's own host, no persistence, wall-clock time.
    pub fn new(page: impl AsRef<str>) -> Result<Self, WatcherError> {
        let page = Url::parse(page.as_ref())
            .map_err(|err| WatcherError::InvalidPageUrl(err.to_string()))?;
        let host = page
            .host_str()
            .ok_or_else(|| WatcherError::InvalidPageUrl("page URL has no host".to_string()))?;
        let options = Options::for_host(host);
        Ok(Self {
            page,
            options,
            store_dir: None,
            declared: None,
            clock: Arc::new(|| chrono::Utc::now().timestamp_millis().max(0) as u64),
        })
    }
}

impl fmt::Debug for WatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherConfig")
            .field("page", &self.page)
            .field("options", &self.options)
            .field("store_dir", &self.store_dir)
            .field("declared", &self.declared)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("invalid page url: {0}")]
    InvalidPageUrl(String),
    #[error("http client: {0}")]
    Client(#[from] RequestError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("timeout")]
    Timeout,
    #[error("http status {0}")]
    HttpStatus(u16),
    #[error("network error: {0}")]
    Network(String),
}

/// Happenings surfaced to the host while the watcher runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Started,
    Stopped,
    Tracked { url: String, fingerprint: String },
    ChangeDetected { url: String },
    StylesheetSwapped { href: String },
    ReloadRequested { delay_ms: u64 },
}
