use std::collections::{HashMap, HashSet};

use url::Url;

use crate::options::{Options, ProbeMethod};
use crate::view_model::WatcherView;

/// Tracking state for one URL in the fingerprint table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    /// Explicitly excluded by the host; never acquired, never polled.
    Excluded,
    /// Tracked with a last-known fingerprint.
    Tracked(String),
}

/// The whole watcher: watch list, fingerprint table, method overrides,
/// external set, round-robin cursor and stopped marker.
///
/// Invariants: every URL in the watch list has a `Tracked` entry in the
/// fingerprint table; a URL appears in the list at most once; the cursor is
/// a valid index into the list (or 0 when the list is empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherState {
    options: Options,
    location: Url,
    list: Vec<String>,
    entries: HashMap<String, EntryState>,
    methods: HashMap<String, ProbeMethod>,
    external: HashSet<String>,
    cursor: usize,
    stopped: Option<u64>,
}

impl WatcherState {
    pub fn new(options: Options, location: Url) -> Self {
        Self {
            options,
            location,
            list: Vec::new(),
            entries: HashMap::new(),
            methods: HashMap::new(),
            external: HashSet::new(),
            cursor: 0,
            stopped: None,
        }
    }

    pub fn view(&self) -> WatcherView {
        WatcherView {
            tracked: self.list.clone(),
            cursor: self.cursor,
            stopped: self.stopped.is_some(),
            external: self.external.len(),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// URLs currently polled, in round-robin order.
    pub fn tracked(&self) -> &[String] {
        &self.list
    }

    pub fn is_external(&self, url: &str) -> bool {
        self.external.contains(url)
    }

    /// Whether the fingerprint table has any entry for `url`, tracked or
    /// excluded. Known URLs are never re-acquired.
    pub fn knows(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Last-known fingerprint, or `None` when the URL is excluded or
    /// untracked.
    pub fn fingerprint_of(&self, url: &str) -> Option<&str> {
        match self.entries.get(url) {
            Some(EntryState::Tracked(fingerprint)) => Some(fingerprint),
            _ => None,
        }
    }

    /// Method to use when polling `url`: the recorded override, else the
    /// configured default.
    pub fn method_for(&self, url: &str) -> ProbeMethod {
        self.methods
            .get(url)
            .copied()
            .unwrap_or(self.options.default_method)
    }

    pub(crate) fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    pub(crate) fn replace_options(&mut self, options: Options) {
        self.options = options;
    }

    pub(crate) fn set_stopped(&mut self, at_ms: Option<u64>) {
        self.stopped = at_ms;
    }

    /// Records a fingerprint for `url`, appending it to the watch list if
    /// new. Excluded URLs stay excluded. Returns whether the URL was newly
    /// added.
    pub(crate) fn track(
        &mut self,
        url: &str,
        fingerprint: String,
        method_override: Option<ProbeMethod>,
        external: bool,
    ) -> bool {
        match self.entries.get(url) {
            Some(EntryState::Excluded) => return false,
            Some(EntryState::Tracked(_)) => {
                self.entries
                    .insert(url.to_string(), EntryState::Tracked(fingerprint));
                if let Some(method) = method_override {
                    self.methods.insert(url.to_string(), method);
                }
                return false;
            }
            None => {}
        }
        self.list.push(url.to_string());
        self.entries
            .insert(url.to_string(), EntryState::Tracked(fingerprint));
        if let Some(method) = method_override {
            self.methods.insert(url.to_string(), method);
        }
        if external {
            self.external.insert(url.to_string());
        }
        true
    }

    /// Overwrites the fingerprint of an already-tracked URL; no-op for
    /// excluded or unknown URLs.
    pub(crate) fn set_fingerprint(&mut self, url: &str, fingerprint: String) -> bool {
        match self.entries.get_mut(url) {
            Some(EntryState::Tracked(current)) => {
                *current = fingerprint;
                true
            }
            _ => false,
        }
    }

    /// Marks `url` excluded and drops it from the watch list, keeping the
    /// cursor valid.
    pub(crate) fn exclude(&mut self, url: &str) {
        self.entries
            .insert(url.to_string(), EntryState::Excluded);
        self.methods.remove(url);
        self.external.remove(url);
        if let Some(position) = self.list.iter().position(|u| u == url) {
            self.list.remove(position);
            if self.cursor > position {
                self.cursor -= 1;
            } else if self.cursor >= self.list.len() {
                self.cursor = 0;
            }
        }
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    /// Advances the round-robin cursor; returns true when it wrapped back
    /// to the start of the list.
    pub(crate) fn advance_cursor(&mut self) -> bool {
        self.cursor += 1;
        if self.cursor >= self.list.len() {
            self.cursor = 0;
            true
        } else {
            false
        }
    }

    /// Forgets all tracking state for a fresh session after a reload;
    /// options and the stopped marker survive.
    pub(crate) fn reset_tracking(&mut self) {
        self.list.clear();
        self.entries.clear();
        self.methods.clear();
        self.external.clear();
        self.cursor = 0;
    }
}
