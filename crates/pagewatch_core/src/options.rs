use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HTTP method used for fingerprinting requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
}

impl ProbeMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeMethod::Head => "HEAD",
            ProbeMethod::Get => "GET",
        }
    }
}

/// Watcher configuration record.
///
/// Serialized as JSON when persisted to the durable store, so every field
/// must keep a stable serde representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Poll interval between round-robin ticks, in milliseconds.
    pub interval_ms: u64,
    /// Rediscovery interval for catching resources added after the initial
    /// scan, in milliseconds. Zero disables rediscovery.
    pub rescan_ms: u64,
    /// Watch the document itself for changes.
    pub watch_doc: bool,
    /// Watch stylesheet links.
    pub watch_css: bool,
    /// Watch script sources.
    pub watch_js: bool,
    /// Skip paths containing a `.min.` segment.
    pub ignore_minified: bool,
    /// Host alias map, e.g. `cdn.example.com -> example.com`, so an asset
    /// served from a CDN still matches the owning page's host policy.
    pub host_alias: BTreeMap<String, String>,
    /// Hostname allow-list for discovered assets. Empty disables host
    /// filtering entirely.
    pub watch_hosts: Vec<String>,
    /// Method for the first fingerprinting attempt.
    pub default_method: ProbeMethod,
    /// Fallback method when the default yields no usable fingerprint.
    pub alternate_method: ProbeMethod,
    /// Extra request headers sent on every fingerprinting request.
    pub headers: BTreeMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval_ms: 700,
            rescan_ms: 7_000,
            watch_doc: true,
            watch_css: true,
            watch_js: true,
            ignore_minified: true,
            host_alias: BTreeMap::new(),
            watch_hosts: Vec::new(),
            default_method: ProbeMethod::Head,
            alternate_method: ProbeMethod::Get,
            headers: BTreeMap::from([("X-Requested-With".to_string(), "pagewatch".to_string())]),
        }
    }
}

impl Options {
    /// Default options with the allow-list restricted to `host`, the usual
    /// starting point for watching a page on its own origin.
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            watch_hosts: vec![host.into()],
            ..Self::default()
        }
    }
}

/// Partial update applied onto [`Options`]; unset fields keep their current
/// value. Covers both the single-key and bulk-merge set-option forms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsPatch {
    pub interval_ms: Option<u64>,
    pub rescan_ms: Option<u64>,
    pub watch_doc: Option<bool>,
    pub watch_css: Option<bool>,
    pub watch_js: Option<bool>,
    pub ignore_minified: Option<bool>,
    pub host_alias: Option<BTreeMap<String, String>>,
    pub watch_hosts: Option<Vec<String>>,
    pub default_method: Option<ProbeMethod>,
    pub alternate_method: Option<ProbeMethod>,
    pub headers: Option<BTreeMap<String, String>>,
}

impl OptionsPatch {
    pub fn apply(self, options: &mut Options) {
        if let Some(value) = self.interval_ms {
            options.interval_ms = value;
        }
        if let Some(value) = self.rescan_ms {
            options.rescan_ms = value;
        }
        if let Some(value) = self.watch_doc {
            options.watch_doc = value;
        }
        if let Some(value) = self.watch_css {
            options.watch_css = value;
        }
        if let Some(value) = self.watch_js {
            options.watch_js = value;
        }
        if let Some(value) = self.ignore_minified {
            options.ignore_minified = value;
        }
        if let Some(value) = self.host_alias {
            options.host_alias = value;
        }
        if let Some(value) = self.watch_hosts {
            options.watch_hosts = value;
        }
        if let Some(value) = self.default_method {
            options.default_method = value;
        }
        if let Some(value) = self.alternate_method {
            options.alternate_method = value;
        }
        if let Some(value) = self.headers {
            options.headers = value;
        }
    }
}
